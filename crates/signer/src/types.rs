//! The host-facing transaction data model.
//!
//! These records are transient: an input or output lives only for the
//! duration of the request that produced it, and the signer retains nothing
//! beyond the summaries it explicitly accumulates.

use coldsign_core::hashes::Txid;

use crate::{coins::CoinParams, error::SignError};

/// Hardened-derivation marker bit.
pub const BIP32_HARDEN: u32 = 0x8000_0000;

/// The number of trailing path levels a wallet uses for chain and address
/// index.
pub const BIP32_WALLET_DEPTH: usize = 2;

coldsign_core::wrap_prefixed_byte_vector!(
    /// A scriptPubkey, wire-serialized with a compact-size length prefix.
    ScriptPubkey
);

coldsign_core::wrap_prefixed_byte_vector!(
    /// A scriptSig, wire-serialized with a compact-size length prefix.
    ScriptSig
);

/// A BIP-32 derivation path as a list of child indices.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DerivationPath(Vec<u32>);

impl DerivationPath {
    /// Returns `true` if there are no indices in the path.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of derivations in the path.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The raw indices.
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// The path minus the trailing chain and address-index levels. `None`
    /// when the path is too short to have a wallet prefix.
    pub fn wallet_prefix(&self) -> Option<&[u32]> {
        if self.0.len() <= BIP32_WALLET_DEPTH {
            None
        } else {
            Some(&self.0[..self.0.len() - BIP32_WALLET_DEPTH])
        }
    }

    /// The trailing `[chain, index]` levels, if present.
    pub fn wallet_suffix(&self) -> Option<&[u32]> {
        if self.0.len() < BIP32_WALLET_DEPTH {
            None
        } else {
            Some(&self.0[self.0.len() - BIP32_WALLET_DEPTH..])
        }
    }
}

impl From<Vec<u32>> for DerivationPath {
    fn from(v: Vec<u32>) -> Self {
        Self(v)
    }
}

impl From<&[u32]> for DerivationPath {
    fn from(v: &[u32]) -> Self {
        Self(Vec::from(v))
    }
}

/// The longest common BIP-32 prefix of the inputs seen so far, excluding
/// the trailing chain and address-index levels. Narrows monotonically;
/// becomes (and stays) mismatched on the first divergence.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum WalletPath {
    /// No input processed yet.
    #[default]
    Unset,
    /// All inputs so far share this prefix.
    Known(Vec<u32>),
    /// Inputs disagree; no silent change is possible.
    Mismatch,
}

impl WalletPath {
    /// Narrow with the next input's path.
    pub fn extract(&mut self, path: &DerivationPath) {
        match path.wallet_prefix() {
            None => *self = WalletPath::Mismatch, // input path is too short
            Some(prefix) => match self {
                WalletPath::Unset => *self = WalletPath::Known(prefix.to_vec()),
                WalletPath::Known(known) if known.as_slice() == prefix => {}
                WalletPath::Known(_) => *self = WalletPath::Mismatch,
                WalletPath::Mismatch => {}
            },
        }
    }

    /// Phase-2 check: a path that matched during confirmation must still
    /// match while signing. A phase-1 mismatch is ignored here.
    pub fn check(&self, path: &DerivationPath) -> Result<(), SignError> {
        match self {
            WalletPath::Mismatch => Ok(()),
            WalletPath::Known(known) => {
                if path.wallet_prefix() == Some(known.as_slice()) {
                    Ok(())
                } else {
                    Err(SignError::Process("Transaction has changed during signing"))
                }
            }
            WalletPath::Unset => Err(SignError::Firmware("Wallet path checked before phase 1")),
        }
    }

    /// The common prefix, if every input agreed on one.
    pub fn prefix(&self) -> Option<&[u32]> {
        match self {
            WalletPath::Known(p) => Some(p),
            _ => None,
        }
    }
}

/// Spend-script families the signer understands.
#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum InputScriptType {
    /// Legacy pay-to-pubkey-hash.
    P2pkh,
    /// Legacy P2SH multisig.
    Multisig,
    /// P2WPKH nested in P2SH.
    NestedWpkh,
    /// P2WSH multisig nested in P2SH.
    NestedWsh,
    /// Native v0 P2WPKH.
    NativeWpkh,
    /// Native v0 P2WSH multisig.
    NativeWsh,
}

impl InputScriptType {
    /// True for the BIP-141 witness families.
    pub fn is_segwit(self) -> bool {
        matches!(
            self,
            InputScriptType::NestedWpkh
                | InputScriptType::NestedWsh
                | InputScriptType::NativeWpkh
                | InputScriptType::NativeWsh
        )
    }

    /// True for families that require a multisig descriptor.
    pub fn is_multisig(self) -> bool {
        matches!(
            self,
            InputScriptType::Multisig | InputScriptType::NestedWsh | InputScriptType::NativeWsh
        )
    }

    /// Stable tag folded into the structural check digests.
    pub(crate) fn check_tag(self) -> u32 {
        match self {
            InputScriptType::P2pkh => 0,
            InputScriptType::Multisig => 1,
            InputScriptType::NestedWpkh => 2,
            InputScriptType::NestedWsh => 3,
            InputScriptType::NativeWpkh => 4,
            InputScriptType::NativeWsh => 5,
        }
    }
}

/// Destination-script families for outputs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum OutputScriptType {
    /// Pay to an encoded address supplied by the host.
    Address,
    /// Change to our own P2PKH key.
    ChangeP2pkh,
    /// Change to our own native P2WPKH key.
    ChangeP2wpkh,
    /// Change to our own P2WPKH key, nested in P2SH.
    ChangeP2shP2wpkh,
    /// Change to our own legacy P2SH multisig group.
    ChangeMultisig,
    /// Change to our own native P2WSH multisig group.
    ChangeP2wsh,
    /// Change to our own P2WSH multisig group, nested in P2SH.
    ChangeP2shP2wsh,
    /// Provably unspendable data-carrier output.
    OpReturn,
}

impl OutputScriptType {
    /// True for the families that may qualify as silent change.
    pub fn is_change(self) -> bool {
        !matches!(self, OutputScriptType::Address | OutputScriptType::OpReturn)
    }

    /// True for families that require a multisig descriptor.
    pub fn is_multisig(self) -> bool {
        matches!(
            self,
            OutputScriptType::ChangeMultisig
                | OutputScriptType::ChangeP2wsh
                | OutputScriptType::ChangeP2shP2wsh
        )
    }
}

/// A multisig group: the full pubkey set, the signing threshold, and the
/// cosigner signatures collected so far (one slot per pubkey; empty slots
/// for missing signatures).
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MultisigDescriptor {
    /// Compressed (33-byte) public keys, in redeem-script order.
    pub pubkeys: Vec<Vec<u8>>,
    /// Required signature count.
    pub m: u32,
    /// Cosigner signatures, DER without the trailing hash-type byte.
    pub signatures: Vec<Vec<u8>>,
}

impl MultisigDescriptor {
    /// The signature slots padded out to one per pubkey.
    pub fn signature_slots(&self) -> Vec<Vec<u8>> {
        let mut slots = self.signatures.clone();
        slots.resize(self.pubkeys.len(), vec![]);
        slots
    }
}

/// A transaction input as streamed by the host.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TxInput {
    /// BIP-32 path of the key that signs this input.
    pub address_n: DerivationPath,
    /// Id of the transaction that created the spent UTXO, wire byte order.
    pub prev_hash: Txid,
    /// Index of the spent UTXO in its transaction's output vector.
    pub prev_index: u32,
    /// nSequence.
    pub sequence: u32,
    /// Spend-script family.
    pub script_type: InputScriptType,
    /// Value of the spent UTXO. Required for segwit inputs and on coins
    /// that force BIP-143.
    pub amount: Option<u64>,
    /// Multisig descriptor, required for the multisig families.
    pub multisig: Option<MultisigDescriptor>,
    /// Decred outpoint tree.
    pub decred_tree: u8,
}

impl TxInput {
    /// Reject inputs whose fields are inconsistent with their script type.
    pub(crate) fn sanitize(&self) -> Result<(), SignError> {
        if self.script_type.is_multisig() && self.multisig.is_none() {
            return Err(SignError::Data("Multisig input without descriptor"));
        }
        if !self.script_type.is_multisig() && self.multisig.is_some() {
            return Err(SignError::Data("Multisig descriptor on single-sig input"));
        }
        Ok(())
    }
}

/// A transaction output as streamed by the host.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TxOutput {
    /// Destination address; set for `Address` outputs.
    pub address: Option<String>,
    /// BIP-32 path; set for change outputs.
    pub address_n: DerivationPath,
    /// Value in base units.
    pub amount: u64,
    /// Destination-script family.
    pub script_type: OutputScriptType,
    /// Multisig descriptor for multisig change.
    pub multisig: Option<MultisigDescriptor>,
    /// Payload for OP_RETURN outputs.
    pub op_return_data: Option<Vec<u8>>,
    /// Decred script version. Only version 0 outputs can be created.
    pub decred_script_version: Option<u16>,
}

impl TxOutput {
    /// Reject outputs whose fields are inconsistent with their script type.
    pub(crate) fn sanitize(&self) -> Result<(), SignError> {
        match self.script_type {
            OutputScriptType::OpReturn => {
                if self.op_return_data.is_none() {
                    return Err(SignError::Data("OP_RETURN output without data"));
                }
                if self.amount != 0 {
                    return Err(SignError::Data("OP_RETURN output with non-zero amount"));
                }
                if self.address.is_some() || !self.address_n.is_empty() {
                    return Err(SignError::Data("OP_RETURN output with address"));
                }
            }
            OutputScriptType::Address => {
                if self.address.is_none() {
                    return Err(SignError::Data("Output without address"));
                }
            }
            _ => {
                if self.address_n.is_empty() {
                    return Err(SignError::Data("Change output without path"));
                }
                if self.script_type.is_multisig() && self.multisig.is_none() {
                    return Err(SignError::Data("Multisig change output without descriptor"));
                }
            }
        }
        Ok(())
    }
}

/// The derived binary form of an output: what gets hashed and streamed.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TxOutputBin {
    /// Value in base units.
    pub amount: u64,
    /// The derived locking script.
    pub script_pubkey: ScriptPubkey,
    /// Decred script version.
    pub script_version: Option<u16>,
}

/// The transaction header, immutable for a signing session.
///
/// Produced from the host's signing request by [`SignTx::sanitize`]; the
/// input and output counts bound the request loops of both phases.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SignTx {
    /// Transaction version.
    pub version: u32,
    /// Number of inputs the host will stream.
    pub inputs_count: u32,
    /// Number of outputs the host will stream.
    pub outputs_count: u32,
    /// nLockTime. A non-zero value requires explicit confirmation.
    pub lock_time: u32,
    /// Expiry height (Decred, Overwinter/Sapling).
    pub expiry: u32,
    /// Transaction timestamp (timestamped chains only).
    pub timestamp: u32,
    /// Zcash version group id.
    pub version_group_id: Option<u32>,
    /// Zcash consensus branch id for sighash personalization.
    pub branch_id: Option<u32>,
}

impl Default for SignTx {
    fn default() -> Self {
        Self {
            version: 1,
            inputs_count: 0,
            outputs_count: 0,
            lock_time: 0,
            expiry: 0,
            timestamp: 0,
            version_group_id: None,
            branch_id: None,
        }
    }
}

impl SignTx {
    /// Validate the header against the coin's transaction format and fill
    /// defaults.
    pub fn sanitize(mut self, coin: &CoinParams) -> Result<Self, SignError> {
        if self.version == 0 {
            self.version = 1;
        }
        if !(coin.decred || coin.overwintered) && self.expiry != 0 {
            return Err(SignError::Data("Expiry not enabled on this coin"));
        }
        if coin.timestamp {
            if self.timestamp == 0 {
                return Err(SignError::Data("Timestamp must be set on this coin"));
            }
        } else if self.timestamp != 0 {
            return Err(SignError::Data("Timestamp not enabled on this coin"));
        }
        if coin.overwintered {
            if self.version_group_id.is_none() {
                return Err(SignError::Data("Version group id must be set"));
            }
        } else {
            if self.version_group_id.is_some() {
                return Err(SignError::Data("Version group id not enabled on this coin"));
            }
            if self.branch_id.is_some() {
                return Err(SignError::Data("Branch id not enabled on this coin"));
            }
        }
        Ok(self)
    }
}

/// Metadata of a previous transaction being reconstructed for value
/// verification.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PrevTxMeta {
    /// Transaction version.
    pub version: u32,
    /// Number of inputs in the previous transaction.
    pub inputs_count: u32,
    /// Number of outputs in the previous transaction.
    pub outputs_count: u32,
    /// nLockTime.
    pub lock_time: u32,
    /// Expiry height (Decred).
    pub expiry: u32,
    /// Transaction timestamp (timestamped chains only).
    pub timestamp: u32,
    /// Zcash version group id.
    pub version_group_id: Option<u32>,
    /// Byte length of the trailing extra-data region.
    pub extra_data_len: u32,
}

/// An input of a previous transaction, replayed verbatim so the claimed
/// txid can be recomputed.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PrevInput {
    /// Outpoint hash, wire byte order.
    pub prev_hash: Txid,
    /// Outpoint index.
    pub prev_index: u32,
    /// The original scriptSig bytes.
    pub script_sig: ScriptSig,
    /// nSequence.
    pub sequence: u32,
    /// Decred outpoint tree.
    pub decred_tree: u8,
}
