//! Decred-specific halves of the state machine.
//!
//! Decred serializes eagerly: the no-witness header, inputs, and counted
//! outputs stream out during phase 1, alongside the prefix hash. Phase 2
//! signs every input against `SIGHASH_ALL ‖ prefix_hash ‖ witness_hash`
//! and streams the trailing witness region. The last output fragment of
//! phase 1 is only delivered at the head of phase 2, so it is retained and
//! replayed.

use tracing::debug;

use coldsign_core::{
    hashes::{hash160, Blake256Writer, DigestWriter, SigHash, Txid},
    ser::{write_bytes, write_bytes_prefixed, write_compact_int, write_u32_le},
};

use crate::{
    error::SignError,
    keychain::Keychain,
    proto::{Confirmer, Host, Serialized},
    scripts,
    sighash::{SigHasher, DECRED_SERIALIZE_NO_WITNESS, DECRED_SERIALIZE_WITNESS_SIGNING},
    types::{InputScriptType, TxInput, TxOutput, TxOutputBin},
    writers::{
        write_prev_input_decred, write_tx_input_decred, write_tx_input_decred_witness,
        write_tx_output,
    },
};

use super::Signer;

const DECRED_SIGHASH_ALL: u32 = 1;

impl<'a, H, C, K> Signer<'a, H, C, K>
where
    H: Host,
    C: Confirmer,
    K: Keychain,
{
    pub(super) fn decred_serialize_input(&mut self, i: u32, txi: &TxInput) -> Result<(), SignError> {
        let mut w_txi = Vec::with_capacity(8 + 41);
        if i == 0 {
            // serializing first input => prepend headers
            self.write_tx_header(&mut w_txi)?;
        }
        write_tx_input_decred(&mut w_txi, txi)?;
        self.pending = Some(Serialized {
            serialized_tx: w_txi,
            ..Default::default()
        });
        Ok(())
    }

    pub(super) fn decred_serialize_output(
        &mut self,
        i: u32,
        txo: &TxOutput,
        txo_bin: &TxOutputBin,
    ) -> Result<(), SignError> {
        if txo.decred_script_version.unwrap_or(0) != 0 {
            return Err(SignError::ActionCancelled(
                "Cannot send to output with script version != 0",
            ));
        }

        let mut w_txo_bin = Vec::with_capacity(15 + txo_bin.script_pubkey.len());
        if i == 0 {
            // serializing first output => prepend the output count
            write_compact_int(&mut w_txo_bin, self.tx.outputs_count as u64)?;
            self.hash143.add_output_count(&self.tx)?;
        }
        write_tx_output(&mut w_txo_bin, txo_bin)?;
        self.last_output_bytes = w_txo_bin.clone();
        self.pending = Some(Serialized {
            serialized_tx: w_txo_bin,
            ..Default::default()
        });
        Ok(())
    }

    pub(super) fn phase2_decred(&mut self) -> Result<(), SignError> {
        let prefix_hash = match &self.hash143 {
            SigHasher::Decred(prefix) => prefix.prefix_hash(),
            _ => return Err(SignError::Firmware("Decred session without prefix hasher")),
        };

        for i_sign in 0..self.tx.inputs_count {
            let txi_sign = self.request_input(i_sign)?;

            self.wallet_path.check(&txi_sign.address_n)?;
            self.check_multisig_fp(&txi_sign)?;

            let key_sign = self
                .keychain
                .derive(&txi_sign.address_n, self.coin.curve_name)?;
            let pubkey = key_sign.public_key();

            let prev_pkscript = match txi_sign.script_type {
                InputScriptType::Multisig => {
                    let multisig = txi_sign
                        .multisig
                        .as_ref()
                        .ok_or(SignError::Data("Multisig input without descriptor"))?;
                    scripts::output_script_multisig(&multisig.pubkeys, multisig.m)?
                }
                InputScriptType::P2pkh => scripts::output_script_p2pkh(&hash160(&pubkey)),
                _ => return Err(SignError::Data("Unsupported input script type")),
            };

            // witness hash: only the signed input carries its pkScript
            let mut h_witness = Blake256Writer::default();
            write_u32_le(
                &mut h_witness,
                self.tx.version | DECRED_SERIALIZE_WITNESS_SIGNING,
            )?;
            write_compact_int(&mut h_witness, self.tx.inputs_count as u64)?;
            for i in 0..self.tx.inputs_count {
                if i == i_sign {
                    write_bytes_prefixed(&mut h_witness, &prev_pkscript)?;
                } else {
                    write_compact_int(&mut h_witness, 0)?;
                }
            }
            let witness_hash = h_witness.finish_tx_hash(self.coin.sign_hash_double, false);

            let mut h_sign = Blake256Writer::default();
            write_u32_le(&mut h_sign, DECRED_SIGHASH_ALL)?;
            write_bytes(&mut h_sign, &prefix_hash)?;
            write_bytes(&mut h_sign, &witness_hash)?;
            let digest = SigHash(h_sign.finish_tx_hash(self.coin.sign_hash_double, false));

            let signature = key_sign.sign(&digest)?;
            debug!(input = i_sign, "signed decred input");
            let script_sig = self.input_derive_script(&txi_sign, &pubkey, Some(&signature))?;

            let mut w_txi_sign = Vec::with_capacity(
                16 + 4 + script_sig.len() + if i_sign == 0 { 12 + self.last_output_bytes.len() } else { 0 },
            );
            if i_sign == 0 {
                // phase 1 never delivered the last output fragment; replay
                // it ahead of the witness region
                write_bytes(&mut w_txi_sign, &self.last_output_bytes)?;
                write_u32_le(&mut w_txi_sign, self.tx.lock_time)?;
                write_u32_le(&mut w_txi_sign, self.tx.expiry)?;
                write_compact_int(&mut w_txi_sign, self.tx.inputs_count as u64)?;
            }
            write_tx_input_decred_witness(&mut w_txi_sign, &txi_sign, &script_sig)?;
            self.pending = Some(Serialized {
                signature_index: Some(i_sign),
                signature: Some(signature),
                serialized_tx: w_txi_sign,
            });
        }

        self.request_finish()
    }

    pub(super) fn decred_prevtx_output_value(
        &mut self,
        prev_hash: Txid,
        prev_index: u32,
    ) -> Result<u64, SignError> {
        let meta = self.request_prev_meta(prev_hash)?;
        if meta.outputs_count <= prev_index {
            return Err(SignError::Process(
                "Not enough outputs in previous transaction",
            ));
        }

        let mut txh = Blake256Writer::default();
        write_u32_le(&mut txh, meta.version | DECRED_SERIALIZE_NO_WITNESS)?;

        write_compact_int(&mut txh, meta.inputs_count as u64)?;
        for i in 0..meta.inputs_count {
            let txi = self.request_prev_input(i, prev_hash)?;
            write_prev_input_decred(&mut txh, &txi)?;
        }

        write_compact_int(&mut txh, meta.outputs_count as u64)?;
        let mut total_out = 0u64;
        for o in 0..meta.outputs_count {
            let txo_bin = self.request_prev_output(o, prev_hash)?;
            write_tx_output(&mut txh, &txo_bin)?;
            if o == prev_index {
                total_out = txo_bin.amount;
                if txo_bin.script_version.unwrap_or(0) != 0 {
                    return Err(SignError::Process(
                        "Cannot use utxo that has script_version != 0",
                    ));
                }
            }
        }

        write_u32_le(&mut txh, meta.lock_time)?;
        write_u32_le(&mut txh, meta.expiry)?;

        if Txid(txh.finish_tx_hash(self.coin.sign_hash_double, false)) != prev_hash {
            return Err(SignError::Process("Encountered invalid prev hash"));
        }
        Ok(total_out)
    }
}
