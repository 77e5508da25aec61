//! Per-variant signature-hash accumulators.
//!
//! The variant is selected once at session start from the coin and the
//! transaction version, then fed prevouts, sequences, and outputs as they
//! stream by during the confirmation phase. The signing phase asks it for
//! per-input preimage digests (or, for Decred, the whole-transaction prefix
//! hash).

mod bip143;
mod decred;
mod zcash;

pub use bip143::{derive_script_code, Bip143};
pub use decred::{DecredPrefix, DECRED_SERIALIZE_NO_WITNESS, DECRED_SERIALIZE_WITNESS_SIGNING};
pub use zcash::{Zip143, Zip243, OVERWINTERED, OVERWINTER_BRANCH_ID, SAPLING_BRANCH_ID};

use coldsign_core::hashes::SigHash;

use crate::{
    coins::CoinParams,
    error::SignError,
    types::{SignTx, TxInput, TxOutputBin},
};

/// The session's sighash accumulator.
///
/// A tagged variant rather than a trait object: the state machine needs to
/// dispatch on it again when it emits the coin-specific trailer.
pub enum SigHasher {
    /// Segwit-era Bitcoin and BIP-143-forced fork coins.
    Bip143(Bip143),
    /// Zcash Overwinter (v3).
    Zip143(Zip143),
    /// Zcash Sapling (v4).
    Zip243(Zip243),
    /// Decred prefix hashing.
    Decred(DecredPrefix),
}

impl SigHasher {
    /// Select the hasher for this session.
    pub fn for_coin(tx: &SignTx, coin: &CoinParams) -> Result<Self, SignError> {
        if coin.decred {
            Ok(SigHasher::Decred(DecredPrefix::new(tx)?))
        } else if coin.overwintered {
            match tx.version {
                3 => Ok(SigHasher::Zip143(Zip143::new(
                    tx.branch_id.unwrap_or(OVERWINTER_BRANCH_ID),
                ))),
                4 => Ok(SigHasher::Zip243(Zip243::new(
                    tx.branch_id.unwrap_or(SAPLING_BRANCH_ID),
                ))),
                _ => Err(SignError::Data(
                    "Unsupported version for overwintered transaction",
                )),
            }
        } else {
            Ok(SigHasher::Bip143(Bip143::default()))
        }
    }

    /// Fold one input's prevout and sequence into the running streams. All
    /// inputs are included, segwit or not.
    pub fn add_input(&mut self, txi: &TxInput) -> Result<(), SignError> {
        match self {
            SigHasher::Bip143(h) => h.add_input(txi)?,
            SigHasher::Zip143(h) => h.add_input(txi)?,
            SigHasher::Zip243(h) => h.add_input(txi)?,
            SigHasher::Decred(h) => h.add_input(txi)?,
        }
        Ok(())
    }

    /// Record the output count. Only Decred's single-stream form needs it.
    pub fn add_output_count(&mut self, tx: &SignTx) -> Result<(), SignError> {
        if let SigHasher::Decred(h) = self {
            h.add_output_count(tx)?;
        }
        Ok(())
    }

    /// Fold one derived output.
    pub fn add_output(&mut self, txo: &TxOutputBin) -> Result<(), SignError> {
        match self {
            SigHasher::Bip143(h) => h.add_output(txo)?,
            SigHasher::Zip143(h) => h.add_output(txo)?,
            SigHasher::Zip243(h) => h.add_output(txo)?,
            SigHasher::Decred(h) => h.add_output(txo)?,
        }
        Ok(())
    }

    /// Close the stream with locktime and expiry. Only Decred's
    /// single-stream form needs it.
    pub fn add_locktime_expiry(&mut self, tx: &SignTx) -> Result<(), SignError> {
        if let SigHasher::Decred(h) = self {
            h.add_locktime_expiry(tx)?;
        }
        Ok(())
    }

    /// The per-input signing digest for the BIP-143-style variants.
    pub fn preimage_hash(
        &self,
        coin: &CoinParams,
        tx: &SignTx,
        txi: &TxInput,
        pubkeyhash: &[u8; 20],
        hash_type: u32,
    ) -> Result<SigHash, SignError> {
        match self {
            SigHasher::Bip143(h) => h.preimage_hash(coin, tx, txi, pubkeyhash, hash_type),
            SigHasher::Zip143(h) => h.preimage_hash(coin, tx, txi, pubkeyhash, hash_type),
            SigHasher::Zip243(h) => h.preimage_hash(coin, tx, txi, pubkeyhash, hash_type),
            SigHasher::Decred(_) => Err(SignError::Firmware(
                "Decred inputs sign against the prefix hash",
            )),
        }
    }
}
