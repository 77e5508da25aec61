//! Re-exports of the types a host integration touches.

pub use crate::coins::{B58Checksum, CoinParams};
pub use crate::error::{SignError, SignResult};
pub use crate::keychain::{DerivedKey, Keychain, MemoryKeychain};
pub use crate::proto::{
    Confirmer, Host, RequestDetails, RequestKind, Serialized, TxAck, TxRequest,
};
pub use crate::signer::{sign_tx, Signer};
pub use crate::types::{
    DerivationPath, InputScriptType, MultisigDescriptor, OutputScriptType, PrevInput, PrevTxMeta,
    ScriptPubkey, ScriptSig, SignTx, TxInput, TxOutput, TxOutputBin,
};

pub use coldsign_core::hashes::{SigHash, Txid};
