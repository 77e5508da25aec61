//! The transaction-signing engine of a UTXO hardware wallet.
//!
//! The device receives an unsigned transaction from an untrusted host,
//! obtains user confirmation for amounts and destinations, and streams back
//! a fully signed, serialized transaction. Private keys never leave the
//! device and full transactions never fit in memory: the signer is a
//! streaming state machine over a host-mediated data pump.
//!
//! The engine runs in two phases. Phase 1 streams every input and output
//! once, verifies spendable values against their previous transactions,
//! derives destination scripts, and collects user confirmations. Phase 2
//! streams the same data again, checks that nothing the user saw has
//! changed, signs each input, and emits the serialized transaction fragment
//! by fragment. See [`signer::Signer`] for the protocol walkthrough.
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod coins;
pub mod enc;
pub mod error;
pub mod keychain;
pub mod multisig;
pub mod prelude;
pub mod proto;
pub mod scripts;
pub mod sighash;
pub mod signer;
pub mod types;
pub mod weight;
pub mod writers;

pub use error::SignError;
pub use signer::{sign_tx, Signer};
