//! BIP-143 transaction hashing.
//!
//! Three independent SHA-256 streams collect prevouts, sequences, and
//! outputs while phase 1 runs; every per-input preimage then reuses the
//! finalized digests, so signing stays O(1) in transaction size.

use coldsign_core::{
    hashes::{DigestWriter, SigHash, Sha256Writer},
    ser::{write_bytes, write_bytes_prefixed, write_u32_le, write_u64_le},
};

use crate::{
    coins::CoinParams,
    error::SignError,
    scripts::{output_script_multisig, output_script_p2pkh},
    types::{InputScriptType, SignTx, TxInput, TxOutputBin},
    writers::write_tx_output,
};

/// The BIP-143 precomputed digest streams.
#[derive(Clone, Default)]
pub struct Bip143 {
    h_prevouts: Sha256Writer,
    h_sequence: Sha256Writer,
    h_outputs: Sha256Writer,
}

impl Bip143 {
    /// Fold one input's outpoint and sequence into the running streams.
    pub fn add_input(&mut self, txi: &TxInput) -> Result<(), SignError> {
        write_bytes(&mut self.h_prevouts, txi.prev_hash.as_ref())?;
        write_u32_le(&mut self.h_prevouts, txi.prev_index)?;
        write_u32_le(&mut self.h_sequence, txi.sequence)?;
        Ok(())
    }

    /// Fold one output's full serialization.
    pub fn add_output(&mut self, txo: &TxOutputBin) -> Result<(), SignError> {
        write_tx_output(&mut self.h_outputs, txo)?;
        Ok(())
    }

    /// `hashPrevouts`.
    pub fn prevouts_hash(&self, coin: &CoinParams) -> [u8; 32] {
        self.h_prevouts
            .clone()
            .finish_tx_hash(coin.sign_hash_double, false)
    }

    /// `hashSequence`.
    pub fn sequence_hash(&self, coin: &CoinParams) -> [u8; 32] {
        self.h_sequence
            .clone()
            .finish_tx_hash(coin.sign_hash_double, false)
    }

    /// `hashOutputs`.
    pub fn outputs_hash(&self, coin: &CoinParams) -> [u8; 32] {
        self.h_outputs
            .clone()
            .finish_tx_hash(coin.sign_hash_double, false)
    }

    /// The signing digest for one input.
    pub fn preimage_hash(
        &self,
        coin: &CoinParams,
        tx: &SignTx,
        txi: &TxInput,
        pubkeyhash: &[u8; 20],
        hash_type: u32,
    ) -> Result<SigHash, SignError> {
        let amount = txi
            .amount
            .ok_or(SignError::Data("Expected input with amount"))?;

        let mut h = Sha256Writer::default();
        write_u32_le(&mut h, tx.version)?;
        write_bytes(&mut h, &self.prevouts_hash(coin))?;
        write_bytes(&mut h, &self.sequence_hash(coin))?;
        write_bytes(&mut h, txi.prev_hash.as_ref())?;
        write_u32_le(&mut h, txi.prev_index)?;
        write_bytes_prefixed(&mut h, &derive_script_code(txi, pubkeyhash)?)?;
        write_u64_le(&mut h, amount)?;
        write_u32_le(&mut h, txi.sequence)?;
        write_bytes(&mut h, &self.outputs_hash(coin))?;
        write_u32_le(&mut h, tx.lock_time)?;
        write_u32_le(&mut h, hash_type)?;
        Ok(SigHash(h.finish_tx_hash(coin.sign_hash_double, false)))
    }
}

/// The scriptCode substituted at the signing input's position (BIP-143
/// item 5): a classic P2PKH script for the single-key families, the
/// multisig script for the script-hash families.
pub fn derive_script_code(txi: &TxInput, pubkeyhash: &[u8; 20]) -> Result<Vec<u8>, SignError> {
    if let Some(multisig) = &txi.multisig {
        return output_script_multisig(&multisig.pubkeys, multisig.m);
    }
    match txi.script_type {
        InputScriptType::P2pkh | InputScriptType::NestedWpkh | InputScriptType::NativeWpkh => {
            Ok(output_script_p2pkh(pubkeyhash))
        }
        _ => Err(SignError::Data(
            "Unknown input script type for sighash script code",
        )),
    }
}
