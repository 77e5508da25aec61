//! ZIP-143 (Overwinter) and ZIP-243 (Sapling) transaction hashing.
//!
//! The same precomputed-stream structure as BIP-143, but every stream is a
//! BLAKE2b-256 with its own personalization, the preimage carries the
//! version group id and expiry height, and the shielded sections are
//! present as zeroed digests since this signer only spends transparent
//! funds.

use coldsign_core::{
    hashes::{Blake2b256Writer, DigestWriter, SigHash},
    ser::{write_bytes, write_bytes_prefixed, write_u32_le, write_u64_le},
};

use crate::{
    coins::CoinParams,
    error::SignError,
    sighash::bip143::derive_script_code,
    types::{SignTx, TxInput, TxOutputBin},
    writers::write_tx_output,
};

/// Header bit marking an Overwinter-format transaction.
pub const OVERWINTERED: u32 = 0x8000_0000;

/// Consensus branch id of the Overwinter network upgrade.
pub const OVERWINTER_BRANCH_ID: u32 = 0x5ba8_1b19;

/// Consensus branch id of the Sapling network upgrade.
pub const SAPLING_BRANCH_ID: u32 = 0x76b8_09bb;

const PREVOUTS_PERSONAL: &[u8; 16] = b"ZcashPrevoutHash";
const SEQUENCE_PERSONAL: &[u8; 16] = b"ZcashSequencHash";
const OUTPUTS_PERSONAL: &[u8; 16] = b"ZcashOutputsHash";
const SIGHASH_PERSONAL_PREFIX: &[u8; 12] = b"ZcashSigHash";

fn sighash_personal(branch_id: u32) -> [u8; 16] {
    let mut personal = [0u8; 16];
    personal[..12].copy_from_slice(SIGHASH_PERSONAL_PREFIX);
    personal[12..].copy_from_slice(&branch_id.to_le_bytes());
    personal
}

/// The precomputed streams shared by both Zcash sighash versions.
#[derive(Clone)]
struct ZcashStreams {
    h_prevouts: Blake2b256Writer,
    h_sequence: Blake2b256Writer,
    h_outputs: Blake2b256Writer,
}

impl ZcashStreams {
    fn new() -> Self {
        Self {
            h_prevouts: Blake2b256Writer::personalized(PREVOUTS_PERSONAL),
            h_sequence: Blake2b256Writer::personalized(SEQUENCE_PERSONAL),
            h_outputs: Blake2b256Writer::personalized(OUTPUTS_PERSONAL),
        }
    }

    fn add_input(&mut self, txi: &TxInput) -> Result<(), SignError> {
        write_bytes(&mut self.h_prevouts, txi.prev_hash.as_ref())?;
        write_u32_le(&mut self.h_prevouts, txi.prev_index)?;
        write_u32_le(&mut self.h_sequence, txi.sequence)?;
        Ok(())
    }

    fn add_output(&mut self, txo: &TxOutputBin) -> Result<(), SignError> {
        write_tx_output(&mut self.h_outputs, txo)?;
        Ok(())
    }
}

/// ZIP-143 hashing for Overwinter (version 3) transactions.
#[derive(Clone)]
pub struct Zip143 {
    branch_id: u32,
    streams: ZcashStreams,
}

impl Zip143 {
    /// Instantiate with the consensus branch id that personalizes the
    /// preimage hash.
    pub fn new(branch_id: u32) -> Self {
        Self {
            branch_id,
            streams: ZcashStreams::new(),
        }
    }

    /// Fold one input's outpoint and sequence into the running streams.
    pub fn add_input(&mut self, txi: &TxInput) -> Result<(), SignError> {
        self.streams.add_input(txi)
    }

    /// Fold one output's full serialization.
    pub fn add_output(&mut self, txo: &TxOutputBin) -> Result<(), SignError> {
        self.streams.add_output(txo)
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
        let version_group_id = tx
            .version_group_id
            .ok_or(SignError::Data("Version group id must be set"))?;

        let mut h = Blake2b256Writer::personalized(&sighash_personal(self.branch_id));
        write_u32_le(&mut h, tx.version | OVERWINTERED)?;
        write_u32_le(&mut h, version_group_id)?;
        write_bytes(
            &mut h,
            &self
                .streams
                .h_prevouts
                .clone()
                .finish_tx_hash(coin.sign_hash_double, false),
        )?;
        write_bytes(
            &mut h,
            &self
                .streams
                .h_sequence
                .clone()
                .finish_tx_hash(coin.sign_hash_double, false),
        )?;
        write_bytes(
            &mut h,
            &self
                .streams
                .h_outputs
                .clone()
                .finish_tx_hash(coin.sign_hash_double, false),
        )?;
        write_bytes(&mut h, &[0u8; 32])?; // hashJoinSplits
        write_u32_le(&mut h, tx.lock_time)?;
        write_u32_le(&mut h, tx.expiry)?;
        write_u32_le(&mut h, hash_type)?;
        write_bytes(&mut h, txi.prev_hash.as_ref())?;
        write_u32_le(&mut h, txi.prev_index)?;
        write_bytes_prefixed(&mut h, &derive_script_code(txi, pubkeyhash)?)?;
        write_u64_le(&mut h, amount)?;
        write_u32_le(&mut h, txi.sequence)?;
        Ok(SigHash(h.finish_tx_hash(coin.sign_hash_double, false)))
    }
}

/// ZIP-243 hashing for Sapling (version 4) transactions.
#[derive(Clone)]
pub struct Zip243 {
    branch_id: u32,
    streams: ZcashStreams,
}

impl Zip243 {
    /// Instantiate with the consensus branch id that personalizes the
    /// preimage hash.
    pub fn new(branch_id: u32) -> Self {
        Self {
            branch_id,
            streams: ZcashStreams::new(),
        }
    }

    /// Fold one input's outpoint and sequence into the running streams.
    pub fn add_input(&mut self, txi: &TxInput) -> Result<(), SignError> {
        self.streams.add_input(txi)
    }

    /// Fold one output's full serialization.
    pub fn add_output(&mut self, txo: &TxOutputBin) -> Result<(), SignError> {
        self.streams.add_output(txo)
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
        let version_group_id = tx
            .version_group_id
            .ok_or(SignError::Data("Version group id must be set"))?;

        let mut h = Blake2b256Writer::personalized(&sighash_personal(self.branch_id));
        write_u32_le(&mut h, tx.version | OVERWINTERED)?;
        write_u32_le(&mut h, version_group_id)?;
        write_bytes(
            &mut h,
            &self
                .streams
                .h_prevouts
                .clone()
                .finish_tx_hash(coin.sign_hash_double, false),
        )?;
        write_bytes(
            &mut h,
            &self
                .streams
                .h_sequence
                .clone()
                .finish_tx_hash(coin.sign_hash_double, false),
        )?;
        write_bytes(
            &mut h,
            &self
                .streams
                .h_outputs
                .clone()
                .finish_tx_hash(coin.sign_hash_double, false),
        )?;
        write_bytes(&mut h, &[0u8; 32])?; // hashJoinSplits
        write_bytes(&mut h, &[0u8; 32])?; // hashShieldedSpends
        write_bytes(&mut h, &[0u8; 32])?; // hashShieldedOutputs
        write_u32_le(&mut h, tx.lock_time)?;
        write_u32_le(&mut h, tx.expiry)?;
        write_u64_le(&mut h, 0)?; // valueBalance
        write_u32_le(&mut h, hash_type)?;
        write_bytes(&mut h, txi.prev_hash.as_ref())?;
        write_u32_le(&mut h, txi.prev_index)?;
        write_bytes_prefixed(&mut h, &derive_script_code(txi, pubkeyhash)?)?;
        write_u64_le(&mut h, amount)?;
        write_u32_le(&mut h, txi.sequence)?;
        Ok(SigHash(h.finish_tx_hash(coin.sign_hash_double, false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coldsign_core::hashes::Txid;
    use crate::{
        coins::ZCASH,
        types::{DerivationPath, InputScriptType, ScriptPubkey},
    };
    use blake2b_simd::Params;
    use coldsign_core::ser::write_compact_int;

    fn sample_input() -> TxInput {
        TxInput {
            address_n: DerivationPath::default(),
            prev_hash: Txid([0x42; 32]),
            prev_index: 1,
            sequence: 0xffff_fffe,
            script_type: InputScriptType::P2pkh,
            amount: Some(50_000_000),
            multisig: None,
            decred_tree: 0,
        }
    }

    fn sample_output() -> TxOutputBin {
        TxOutputBin {
            amount: 49_990_000,
            script_pubkey: ScriptPubkey::new(
                hex::decode("76a914111111111111111111111111111111111111111188ac").unwrap(),
            ),
            script_version: None,
        }
    }

    fn blake2b(personal: &[u8; 16], data: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(
            Params::new()
                .hash_length(32)
                .personal(personal)
                .hash(data)
                .as_bytes(),
        );
        out
    }

    #[test]
    fn sapling_preimage_layout_is_exact() {
        // rebuild the ZIP-243 preimage by hand and compare digests
        let tx = SignTx {
            version: 4,
            inputs_count: 1,
            outputs_count: 1,
            lock_time: 0,
            expiry: 500_000,
            version_group_id: Some(0x892f_2085),
            branch_id: Some(SAPLING_BRANCH_ID),
            ..Default::default()
        };
        let txi = sample_input();
        let txo = sample_output();

        let mut hasher = Zip243::new(SAPLING_BRANCH_ID);
        hasher.add_input(&txi).unwrap();
        hasher.add_output(&txo).unwrap();

        let pubkeyhash = [0x11u8; 20];
        let digest = hasher
            .preimage_hash(&ZCASH, &tx, &txi, &pubkeyhash, 0x01)
            .unwrap();

        // manual preimage
        let mut prevouts = vec![];
        prevouts.extend_from_slice(&[0x42; 32]);
        prevouts.extend_from_slice(&1u32.to_le_bytes());
        let mut sequences = vec![];
        sequences.extend_from_slice(&0xffff_fffeu32.to_le_bytes());
        let mut outputs = vec![];
        outputs.extend_from_slice(&49_990_000u64.to_le_bytes());
        write_compact_int(&mut outputs, 25).unwrap();
        outputs.extend_from_slice(txo.script_pubkey.items());

        let mut preimage = vec![];
        preimage.extend_from_slice(&(4u32 | OVERWINTERED).to_le_bytes());
        preimage.extend_from_slice(&0x892f_2085u32.to_le_bytes());
        preimage.extend_from_slice(&blake2b(b"ZcashPrevoutHash", &prevouts));
        preimage.extend_from_slice(&blake2b(b"ZcashSequencHash", &sequences));
        preimage.extend_from_slice(&blake2b(b"ZcashOutputsHash", &outputs));
        preimage.extend_from_slice(&[0u8; 96]);
        preimage.extend_from_slice(&0u32.to_le_bytes());
        preimage.extend_from_slice(&500_000u32.to_le_bytes());
        preimage.extend_from_slice(&0u64.to_le_bytes());
        preimage.extend_from_slice(&1u32.to_le_bytes());
        preimage.extend_from_slice(&[0x42; 32]);
        preimage.extend_from_slice(&1u32.to_le_bytes());
        let script_code = crate::scripts::output_script_p2pkh(&pubkeyhash);
        write_compact_int(&mut preimage, script_code.len() as u64).unwrap();
        preimage.extend_from_slice(&script_code);
        preimage.extend_from_slice(&50_000_000u64.to_le_bytes());
        preimage.extend_from_slice(&0xffff_fffeu32.to_le_bytes());

        let expected = blake2b(&sighash_personal(SAPLING_BRANCH_ID), &preimage);
        assert_eq!(digest.0, expected);
    }

    #[test]
    fn overwinter_and_sapling_preimages_differ() {
        let tx3 = SignTx {
            version: 3,
            inputs_count: 1,
            outputs_count: 1,
            version_group_id: Some(0x03c4_8270),
            branch_id: Some(OVERWINTER_BRANCH_ID),
            ..Default::default()
        };
        let tx4 = SignTx {
            version: 4,
            version_group_id: Some(0x892f_2085),
            branch_id: Some(SAPLING_BRANCH_ID),
            ..tx3.clone()
        };
        let txi = sample_input();
        let pubkeyhash = [0x11u8; 20];

        let mut zip143 = Zip143::new(OVERWINTER_BRANCH_ID);
        zip143.add_input(&txi).unwrap();
        zip143.add_output(&sample_output()).unwrap();
        let mut zip243 = Zip243::new(SAPLING_BRANCH_ID);
        zip243.add_input(&txi).unwrap();
        zip243.add_output(&sample_output()).unwrap();

        let d3 = zip143
            .preimage_hash(&ZCASH, &tx3, &txi, &pubkeyhash, 0x01)
            .unwrap();
        let d4 = zip243
            .preimage_hash(&ZCASH, &tx4, &txi, &pubkeyhash, 0x01)
            .unwrap();
        assert_ne!(d3, d4);
    }
}
