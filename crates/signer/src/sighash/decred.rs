//! Decred prefix hashing.
//!
//! Decred does not use the BIP-143 stream set. Instead a single BLAKE-256
//! sink accumulates the whole transaction without witnesses; the per-input
//! signing digest is assembled by the signing phase from this prefix hash
//! and a per-input witness hash.

use coldsign_core::{
    hashes::{Blake256Writer, DigestWriter},
    ser::{write_compact_int, write_u32_le},
};

use crate::{
    error::SignError,
    types::{SignTx, TxInput, TxOutputBin},
    writers::{write_tx_input_decred, write_tx_output},
};

/// Serialization-type bit: transaction without witness data.
pub const DECRED_SERIALIZE_NO_WITNESS: u32 = 1 << 16;

/// Serialization-type bits: witness region as hashed for signing.
pub const DECRED_SERIALIZE_WITNESS_SIGNING: u32 = 3 << 16;

/// The running prefix stream.
#[derive(Clone)]
pub struct DecredPrefix {
    h_prefix: Blake256Writer,
}

impl DecredPrefix {
    /// Seed the stream with the no-witness header and the input count.
    pub fn new(tx: &SignTx) -> Result<Self, SignError> {
        let mut h_prefix = Blake256Writer::default();
        write_u32_le(&mut h_prefix, tx.version | DECRED_SERIALIZE_NO_WITNESS)?;
        write_compact_int(&mut h_prefix, tx.inputs_count as u64)?;
        Ok(Self { h_prefix })
    }

    /// Fold one input in prefix form (outpoint, tree, sequence).
    pub fn add_input(&mut self, txi: &TxInput) -> Result<(), SignError> {
        write_tx_input_decred(&mut self.h_prefix, txi)?;
        Ok(())
    }

    /// Write the output count ahead of the first output.
    pub fn add_output_count(&mut self, tx: &SignTx) -> Result<(), SignError> {
        write_compact_int(&mut self.h_prefix, tx.outputs_count as u64)?;
        Ok(())
    }

    /// Fold one output (value, script version, pkScript).
    pub fn add_output(&mut self, txo: &TxOutputBin) -> Result<(), SignError> {
        write_tx_output(&mut self.h_prefix, txo)?;
        Ok(())
    }

    /// Close the stream with locktime and expiry.
    pub fn add_locktime_expiry(&mut self, tx: &SignTx) -> Result<(), SignError> {
        write_u32_le(&mut self.h_prefix, tx.lock_time)?;
        write_u32_le(&mut self.h_prefix, tx.expiry)?;
        Ok(())
    }

    /// The prefix hash the signing phase commits to.
    pub fn prefix_hash(&self) -> [u8; 32] {
        self.h_prefix.clone().finish()
    }
}
