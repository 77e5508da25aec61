//! The two-phase signing state machine.
//!
//! Phase 1 streams every input and output once: values are verified (from
//! declared amounts or by reconstructing previous transactions),
//! destination scripts are derived, the user confirms destinations, fee,
//! and locktime, and everything is folded into rolling check digests and
//! the session's sighash accumulator.
//!
//! Phase 2 streams the same data again. Legacy inputs re-hash the whole
//! transaction and compare it against the phase-1 digest before any
//! signature is produced; segwit inputs are bounded by the phase-1 amount
//! sum. The serialized transaction leaves the device piecewise, each
//! fragment riding on the next host request.

mod decred;

use std::io::Write;

use tracing::{debug, warn};

use coldsign_core::{
    hashes::{hash160, sha256, DigestWriter, Sha256Writer, SigHash, Txid},
    ser::{write_bytes, write_compact_int, write_u32_le, write_u64_le, write_u8},
};

use crate::{
    coins::CoinParams,
    enc::{decode_address, DecodedAddress},
    error::SignError,
    keychain::{DerivedKey, Keychain},
    multisig::{multisig_pubkey_index, MultisigFingerprint},
    proto::{Confirmer, Host, RequestDetails, RequestKind, Serialized, TxAck, TxRequest},
    scripts,
    sighash::{SigHasher, OVERWINTERED},
    types::{
        DerivationPath, InputScriptType, OutputScriptType, PrevInput, PrevTxMeta, ScriptPubkey,
        SignTx, TxInput, TxOutput, TxOutputBin, WalletPath, BIP32_HARDEN,
    },
    weight::TxWeightCalculator,
    writers::{write_prev_input, write_tx_input, write_tx_input_check, write_tx_output},
};

// the chain id used for change
const BIP32_CHANGE_CHAIN: u32 = 1;

// the maximum allowed change address index. large enough for normal use,
// small enough that the correct path can be brute-forced quickly
const BIP32_MAX_LAST_ELEMENT: u32 = 1_000_000;

const SIGHASH_ALL: u32 = 0x01;
const SIGHASH_FORKID: u32 = 0x40;

// extra-data chunk size for previous-transaction replay
const EXTRA_DATA_CHUNK: u32 = 1024;

/// Run a complete signing session over the given collaborators.
pub fn sign_tx<H, C, K>(
    tx: SignTx,
    coin: &CoinParams,
    keychain: &K,
    host: &mut H,
    ui: &mut C,
) -> Result<(), SignError>
where
    H: Host,
    C: Confirmer,
    K: Keychain,
{
    Signer::new(tx, coin, keychain, host, ui)?.run()
}

/// One signing session.
///
/// Owns the transaction header and every cross-phase summary: the rolling
/// check digest, the sighash accumulator, the wallet path, the multisig
/// fingerprint, the per-input segwit map, and the value accumulators.
/// Everything else lives only as long as the request that produced it.
pub struct Signer<'a, H, C, K>
where
    H: Host,
    C: Confirmer,
    K: Keychain,
{
    coin: &'a CoinParams,
    tx: SignTx,
    keychain: &'a K,
    host: &'a mut H,
    ui: &'a mut C,

    hash143: SigHasher,
    // binds the phase-1 stream so legacy signing can prove phase 2 saw the
    // same transaction. not a real tx hash
    h_first: Sha256Writer,
    multisig_fp: MultisigFingerprint,
    wallet_path: WalletPath,
    segwit: Vec<bool>,
    bip143_in: u64,
    total_in: u64,
    total_out: u64,
    change_out: u64,

    // stream bytes waiting to ride on the next host request
    pending: Option<Serialized>,
    // Decred replays the last output fragment at the head of phase 2
    last_output_bytes: Vec<u8>,
}

impl<'a, H, C, K> Signer<'a, H, C, K>
where
    H: Host,
    C: Confirmer,
    K: Keychain,
{
    /// Set up a session from a sanitized host request.
    pub fn new(
        tx: SignTx,
        coin: &'a CoinParams,
        keychain: &'a K,
        host: &'a mut H,
        ui: &'a mut C,
    ) -> Result<Self, SignError> {
        let tx = tx.sanitize(coin)?;
        let hash143 = SigHasher::for_coin(&tx, coin)?;
        let inputs = tx.inputs_count as usize;
        Ok(Self {
            coin,
            tx,
            keychain,
            host,
            ui,
            hash143,
            h_first: Sha256Writer::default(),
            multisig_fp: MultisigFingerprint::default(),
            wallet_path: WalletPath::default(),
            segwit: vec![false; inputs],
            bip143_in: 0,
            total_in: 0,
            total_out: 0,
            change_out: 0,
            pending: None,
            last_output_bytes: vec![],
        })
    }

    /// Drive both phases to completion.
    pub fn run(mut self) -> Result<(), SignError> {
        debug!(
            coin = self.coin.coin_name,
            inputs = self.tx.inputs_count,
            outputs = self.tx.outputs_count,
            "starting signing session"
        );
        self.phase1()?;
        self.phase2()?;
        debug!("signing session complete");
        Ok(())
    }

    // Phase 1: check inputs, previous transactions, and outputs; collect
    // confirmations; check the fee.
    fn phase1(&mut self) -> Result<(), SignError> {
        let mut weight = TxWeightCalculator::new(self.tx.inputs_count, self.tx.outputs_count);

        for i in 0..self.tx.inputs_count {
            let txi = self.request_input(i)?;
            weight.add_input(&txi);
            self.phase1_process_input(i, &txi)?;
        }

        for i in 0..self.tx.outputs_count {
            let txo = self.request_output(i)?;
            let txo_bin = self.output_derive_bin(&txo)?;
            weight.add_output(txo_bin.script_pubkey.items());
            self.phase1_confirm_output(i, &txo, &txo_bin)?;
        }

        let fee = self.total_in as i128 - self.total_out as i128;
        if fee < 0 && !self.coin.negative_fee {
            return Err(SignError::NotEnoughFunds);
        }

        // fee > coin.maxfee per kilobyte * tx vsize
        let fee_threshold = (self.coin.maxfee_kb as u128 * weight.get_total() as u128) / 4000;
        if fee > 0 && fee as u128 > fee_threshold {
            warn!(fee = fee as u64, "fee is over threshold");
            if !self.ui.confirm_fee_over_threshold(fee as u64, self.coin)? {
                return Err(SignError::ActionCancelled("Signing cancelled"));
            }
        }

        if self.tx.lock_time > 0 && !self.ui.confirm_nondefault_locktime(self.tx.lock_time)? {
            return Err(SignError::ActionCancelled("Locktime cancelled"));
        }

        let spending = self.total_in.saturating_sub(self.change_out);
        let fee = i64::try_from(fee).map_err(|_| SignError::Data("Value overflow"))?;
        if !self.ui.confirm_total(spending, fee, self.coin)? {
            return Err(SignError::ActionCancelled("Total cancelled"));
        }

        if self.coin.decred {
            self.hash143.add_locktime_expiry(&self.tx)?;
        }
        Ok(())
    }

    fn phase1_process_input(&mut self, i: u32, txi: &TxInput) -> Result<(), SignError> {
        self.wallet_path.extract(&txi.address_n);
        write_tx_input_check(&mut self.h_first, txi)?;
        // all inputs are folded in, non-segwit as well
        self.hash143.add_input(txi)?;

        if !validate_input_path(&txi.address_n, self.coin, txi.script_type)
            && !self.ui.confirm_foreign_path(&txi.address_n)?
        {
            return Err(SignError::ActionCancelled("Signing cancelled"));
        }

        match &txi.multisig {
            Some(multisig) => self.multisig_fp.add(multisig)?,
            None => self.multisig_fp.mark_mismatch(),
        }

        if txi.script_type.is_segwit() {
            if !self.coin.segwit {
                return Err(SignError::Data("Segwit not enabled on this coin"));
            }
            let amount = txi
                .amount
                .ok_or(SignError::Data("Segwit input without amount"))?;
            self.segwit[i as usize] = true;
            self.add_bip143_in(amount)?;
            self.add_total_in(amount)?;
        } else if self.coin.force_bip143 || self.coin.overwintered {
            let amount = txi
                .amount
                .ok_or(SignError::Data("Expected input with amount"))?;
            self.add_bip143_in(amount)?;
            self.add_total_in(amount)?;
        } else {
            let verified = self.get_prevtx_output_value(txi.prev_hash, txi.prev_index)?;
            self.add_total_in(verified)?;
        }

        if self.coin.decred {
            self.decred_serialize_input(i, txi)?;
        }
        Ok(())
    }

    fn phase1_confirm_output(
        &mut self,
        i: u32,
        txo: &TxOutput,
        txo_bin: &TxOutputBin,
    ) -> Result<(), SignError> {
        if self.coin.decred {
            self.decred_serialize_output(i, txo, txo_bin)?;
        }

        if self.change_out == 0 && self.output_is_change(txo)? {
            // output is change and does not need confirmation
            self.change_out = txo.amount;
        } else if !self.ui.confirm_output(txo, self.coin)? {
            return Err(SignError::ActionCancelled("Output cancelled"));
        }

        write_tx_output(&mut self.h_first, txo_bin)?;
        self.hash143.add_output(txo_bin)?;
        self.total_out = self
            .total_out
            .checked_add(txo_bin.amount)
            .ok_or(SignError::Data("Value overflow"))?;
        Ok(())
    }

    // Phase 2: serialize and sign, checking that nothing changed.
    fn phase2(&mut self) -> Result<(), SignError> {
        self.pending = None;
        debug!("phase 2: signing");

        if self.coin.decred {
            return self.phase2_decred();
        }

        // serialize inputs and sign the non-segwit ones
        for i in 0..self.tx.inputs_count {
            if self.segwit[i as usize] {
                self.phase2_serialize_segwit_input(i)?;
            } else if self.coin.force_bip143 || self.coin.overwintered {
                self.phase2_sign_bip143_input(i)?;
            } else {
                self.phase2_sign_legacy_input(i)?;
            }
        }

        // serialize outputs
        for i in 0..self.tx.outputs_count {
            let fragment = self.phase2_serialize_output(i)?;
            self.pending = Some(Serialized {
                serialized_tx: fragment,
                ..Default::default()
            });
        }

        // sign segwit inputs
        let any_segwit = self.segwit.iter().any(|segwit| *segwit);
        for i in 0..self.tx.inputs_count {
            if self.segwit[i as usize] {
                let (witness, signature) = self.phase2_sign_segwit_input(i)?;
                self.pending = Some(Serialized {
                    signature_index: Some(i),
                    signature: Some(signature),
                    serialized_tx: witness,
                });
            } else if any_segwit {
                // empty witness for non-segwit inputs
                let pending = self.pending.get_or_insert_with(Default::default);
                pending.serialized_tx.push(0x00);
                pending.signature_index = None;
                pending.signature = None;
            }
        }

        // locktime and the coin-specific trailer ride on the last fragment
        let tail = self.pending.get_or_insert_with(Default::default);
        write_u32_le(&mut tail.serialized_tx, self.tx.lock_time)?;

        if self.coin.overwintered {
            match self.tx.version {
                3 => {
                    write_u32_le(&mut tail.serialized_tx, self.tx.expiry)?; // expiryHeight
                    write_compact_int(&mut tail.serialized_tx, 0)?; // nJoinSplit
                }
                4 => {
                    write_u32_le(&mut tail.serialized_tx, self.tx.expiry)?; // expiryHeight
                    write_u64_le(&mut tail.serialized_tx, 0)?; // valueBalance
                    write_compact_int(&mut tail.serialized_tx, 0)?; // nShieldedSpend
                    write_compact_int(&mut tail.serialized_tx, 0)?; // nShieldedOutput
                    write_compact_int(&mut tail.serialized_tx, 0)?; // nJoinSplit
                }
                _ => {
                    return Err(SignError::Data(
                        "Unsupported version for overwintered transaction",
                    ))
                }
            }
        }

        self.request_finish()
    }

    fn phase2_serialize_segwit_input(&mut self, i_sign: u32) -> Result<(), SignError> {
        let txi_sign = self.request_input(i_sign)?;

        if !txi_sign.script_type.is_segwit() {
            return Err(SignError::Process("Transaction has changed during signing"));
        }
        self.wallet_path.check(&txi_sign.address_n)?;
        // the multisig fingerprint is not checked here; no signature is
        // produced until the witness pass

        let key_sign = self.keychain.derive(&txi_sign.address_n, self.coin.curve_name)?;
        let script_sig = self.input_derive_script(&txi_sign, &key_sign.public_key(), None)?;

        let mut w_txi = Vec::with_capacity(8 + 36 + script_sig.len() + 4);
        if i_sign == 0 {
            // serializing first input => prepend headers
            self.write_tx_header(&mut w_txi)?;
        }
        write_tx_input(&mut w_txi, &txi_sign, &script_sig)?;
        self.pending = Some(Serialized {
            serialized_tx: w_txi,
            ..Default::default()
        });
        Ok(())
    }

    fn phase2_sign_segwit_input(&mut self, i: u32) -> Result<(Vec<u8>, Vec<u8>), SignError> {
        let txi = self.request_input(i)?;

        self.wallet_path.check(&txi.address_n)?;
        self.check_multisig_fp(&txi)?;

        if !txi.script_type.is_segwit() {
            return Err(SignError::Process("Transaction has changed during signing"));
        }
        let amount = txi
            .amount
            .ok_or(SignError::Process("Transaction has changed during signing"))?;
        if amount > self.bip143_in {
            return Err(SignError::Process("Transaction has changed during signing"));
        }
        self.bip143_in -= amount;

        let key_sign = self.keychain.derive(&txi.address_n, self.coin.curve_name)?;
        let pubkey = key_sign.public_key();
        let digest = self.hash143.preimage_hash(
            self.coin,
            &self.tx,
            &txi,
            &hash160(&pubkey),
            self.hash_type(),
        )?;

        let signature = key_sign.sign(&digest)?;
        debug!(input = i, "produced witness signature");
        let witness = match &txi.multisig {
            Some(multisig) => {
                // our signature's place in the stack comes from the pubkey
                let signature_index = multisig_pubkey_index(multisig, &pubkey)?;
                scripts::witness_p2wsh(multisig, &signature, signature_index, self.sighash_byte())?
            }
            None => scripts::witness_p2wpkh(&signature, &pubkey, self.sighash_byte()),
        };
        Ok((witness, signature))
    }

    fn phase2_sign_bip143_input(&mut self, i_sign: u32) -> Result<(), SignError> {
        let txi_sign = self.request_input(i_sign)?;
        self.wallet_path.check(&txi_sign.address_n)?;
        self.check_multisig_fp(&txi_sign)?;

        if txi_sign.script_type.is_segwit() {
            return Err(SignError::Process("Transaction has changed during signing"));
        }
        let amount = txi_sign
            .amount
            .ok_or(SignError::Process("Transaction has changed during signing"))?;
        if amount > self.bip143_in {
            return Err(SignError::Process("Transaction has changed during signing"));
        }
        self.bip143_in -= amount;

        let key_sign = self.keychain.derive(&txi_sign.address_n, self.coin.curve_name)?;
        let pubkey = key_sign.public_key();
        let digest = self.hash143.preimage_hash(
            self.coin,
            &self.tx,
            &txi_sign,
            &hash160(&pubkey),
            self.hash_type(),
        )?;

        // if multisig, make sure the signing key belongs to the group
        if let Some(multisig) = &txi_sign.multisig {
            multisig_pubkey_index(multisig, &pubkey)?;
        }

        let signature = key_sign.sign(&digest)?;
        debug!(input = i_sign, "signed forced-bip143 input");

        let script_sig = self.input_derive_script(&txi_sign, &pubkey, Some(&signature))?;
        let mut w_txi_sign = Vec::with_capacity(8 + 36 + script_sig.len() + 4);
        if i_sign == 0 {
            self.write_tx_header(&mut w_txi_sign)?;
        }
        write_tx_input(&mut w_txi_sign, &txi_sign, &script_sig)?;
        self.pending = Some(Serialized {
            signature_index: Some(i_sign),
            signature: Some(signature),
            serialized_tx: w_txi_sign,
        });
        Ok(())
    }

    fn phase2_sign_legacy_input(&mut self, i_sign: u32) -> Result<(), SignError> {
        // hash of what this input signs
        let mut h_sign = Sha256Writer::default();
        // rebuilt phase-1 view, compared before the digest is signed
        let mut h_second = Sha256Writer::default();

        write_u32_le(&mut h_sign, self.tx.version)?;
        if self.coin.timestamp {
            write_u32_le(&mut h_sign, self.tx.timestamp)?;
        }
        write_compact_int(&mut h_sign, self.tx.inputs_count as u64)?;

        let mut signing: Option<(TxInput, DerivedKey, Vec<u8>)> = None;
        for i in 0..self.tx.inputs_count {
            let txi = self.request_input(i)?;
            self.wallet_path.check(&txi.address_n)?;
            write_tx_input_check(&mut h_second, &txi)?;
            if i == i_sign {
                self.check_multisig_fp(&txi)?;
                let key_sign = self.keychain.derive(&txi.address_n, self.coin.curve_name)?;
                let pubkey = key_sign.public_key();
                // while hashing, the signed input's scriptSig is the
                // previous output's pkScript (P2PKH) or the redeem script
                // (multisig); all other inputs serialize an empty scriptSig
                let script_sig = match txi.script_type {
                    InputScriptType::Multisig => {
                        let multisig = txi
                            .multisig
                            .as_ref()
                            .ok_or(SignError::Data("Multisig input without descriptor"))?;
                        scripts::output_script_multisig(&multisig.pubkeys, multisig.m)?
                    }
                    InputScriptType::P2pkh => scripts::output_script_p2pkh(&hash160(&pubkey)),
                    _ => return Err(SignError::Process("Unknown transaction type")),
                };
                write_tx_input(&mut h_sign, &txi, &script_sig)?;
                signing = Some((txi, key_sign, pubkey));
            } else {
                write_tx_input(&mut h_sign, &txi, &[])?;
            }
        }

        write_compact_int(&mut h_sign, self.tx.outputs_count as u64)?;
        for i in 0..self.tx.outputs_count {
            let txo = self.request_output(i)?;
            let txo_bin = self.output_derive_bin(&txo)?;
            write_tx_output(&mut h_second, &txo_bin)?;
            write_tx_output(&mut h_sign, &txo_bin)?;
        }

        write_u32_le(&mut h_sign, self.tx.lock_time)?;
        write_u32_le(&mut h_sign, self.hash_type())?;

        // the control digests must agree before anything is signed
        if self.h_first.clone().finish() != h_second.finish() {
            return Err(SignError::Process("Transaction has changed during signing"));
        }

        let (txi_sign, key_sign, pubkey) =
            signing.ok_or(SignError::Firmware("Signing input was not streamed"))?;

        // if multisig, make sure the signing key belongs to the group
        if let Some(multisig) = &txi_sign.multisig {
            multisig_pubkey_index(multisig, &pubkey)?;
        }

        let digest = SigHash(h_sign.finish_tx_hash(self.coin.sign_hash_double, false));
        let signature = key_sign.sign(&digest)?;
        debug!(input = i_sign, "signed legacy input");

        let script_sig = self.input_derive_script(&txi_sign, &pubkey, Some(&signature))?;
        let mut w_txi_sign = Vec::with_capacity(8 + 36 + script_sig.len() + 4);
        if i_sign == 0 {
            self.write_tx_header(&mut w_txi_sign)?;
        }
        write_tx_input(&mut w_txi_sign, &txi_sign, &script_sig)?;
        self.pending = Some(Serialized {
            signature_index: Some(i_sign),
            signature: Some(signature),
            serialized_tx: w_txi_sign,
        });
        Ok(())
    }

    fn phase2_serialize_output(&mut self, i: u32) -> Result<Vec<u8>, SignError> {
        let txo = self.request_output(i)?;
        let txo_bin = self.output_derive_bin(&txo)?;

        let mut w_txo_bin = Vec::with_capacity(13 + txo_bin.script_pubkey.len());
        if i == 0 {
            // serializing first output => prepend the output count
            write_compact_int(&mut w_txo_bin, self.tx.outputs_count as u64)?;
        }
        write_tx_output(&mut w_txo_bin, &txo_bin)?;
        Ok(w_txo_bin)
    }

    // Previous-transaction value verification: rebuild the claimed txid
    // from streamed parts and pick out the spent output's value.
    fn get_prevtx_output_value(&mut self, prev_hash: Txid, prev_index: u32) -> Result<u64, SignError> {
        if self.coin.decred {
            return self.decred_prevtx_output_value(prev_hash, prev_index);
        }

        let meta = self.request_prev_meta(prev_hash)?;
        if meta.outputs_count <= prev_index {
            return Err(SignError::Process(
                "Not enough outputs in previous transaction",
            ));
        }

        let mut txh = Sha256Writer::default();
        if self.coin.overwintered {
            write_u32_le(&mut txh, meta.version | OVERWINTERED)?;
            write_u32_le(
                &mut txh,
                meta.version_group_id
                    .ok_or(SignError::Data("Version group id must be set"))?,
            )?;
        } else {
            write_u32_le(&mut txh, meta.version)?;
            if self.coin.timestamp {
                write_u32_le(&mut txh, meta.timestamp)?;
            }
        }

        write_compact_int(&mut txh, meta.inputs_count as u64)?;
        for i in 0..meta.inputs_count {
            let txi = self.request_prev_input(i, prev_hash)?;
            write_prev_input(&mut txh, &txi)?;
        }

        write_compact_int(&mut txh, meta.outputs_count as u64)?;
        let mut total_out = 0u64;
        for o in 0..meta.outputs_count {
            let txo_bin = self.request_prev_output(o, prev_hash)?;
            write_tx_output(&mut txh, &txo_bin)?;
            if o == prev_index {
                total_out = txo_bin.amount;
            }
        }

        write_u32_le(&mut txh, meta.lock_time)?;

        if self.coin.extra_data {
            let mut offset = 0;
            while offset < meta.extra_data_len {
                let size = EXTRA_DATA_CHUNK.min(meta.extra_data_len - offset);
                let data = self.request_prev_extra_data(offset, size, prev_hash)?;
                write_bytes(&mut txh, &data)?;
                offset += data.len() as u32;
            }
        }

        if Txid(txh.finish_tx_hash(self.coin.sign_hash_double, false)) != prev_hash {
            return Err(SignError::Process("Encountered invalid prev hash"));
        }
        debug!(value = total_out, "previous transaction verified");
        Ok(total_out)
    }

    // TX helpers
    // ===

    fn hash_type(&self) -> u32 {
        let mut hash_type = SIGHASH_ALL;
        if let Some(fork_id) = self.coin.fork_id {
            hash_type |= ((fork_id as u32) << 8) | SIGHASH_FORKID;
        }
        hash_type
    }

    // the byte appended to scriptSig/witness signatures
    fn sighash_byte(&self) -> u8 {
        (self.hash_type() & 0xff) as u8
    }

    fn write_tx_header<W: Write>(&self, w: &mut W) -> Result<(), SignError> {
        if self.coin.overwintered {
            // nVersion | fOverwintered
            write_u32_le(w, self.tx.version | OVERWINTERED)?;
            write_u32_le(
                w,
                self.tx
                    .version_group_id
                    .ok_or(SignError::Data("Version group id must be set"))?,
            )?;
        } else {
            write_u32_le(w, self.tx.version)?;
            if self.coin.timestamp {
                write_u32_le(w, self.tx.timestamp)?;
            }
        }
        if self.segwit.iter().any(|segwit| *segwit) {
            write_u8(w, 0x00)?; // segwit marker
            write_u8(w, 0x01)?; // segwit flag
        }
        write_compact_int(w, self.tx.inputs_count as u64)?;
        Ok(())
    }

    // TX outputs
    // ===

    fn output_derive_bin(&self, txo: &TxOutput) -> Result<TxOutputBin, SignError> {
        let script_pubkey = ScriptPubkey::new(self.output_derive_script(txo)?);
        Ok(TxOutputBin {
            amount: txo.amount,
            script_pubkey,
            script_version: if self.coin.decred {
                Some(txo.decred_script_version.unwrap_or(0))
            } else {
                None
            },
        })
    }

    fn output_derive_script(&self, txo: &TxOutput) -> Result<Vec<u8>, SignError> {
        match txo.script_type {
            OutputScriptType::OpReturn => {
                let data = txo
                    .op_return_data
                    .as_ref()
                    .ok_or(SignError::Data("OP_RETURN output without data"))?;
                Ok(scripts::output_script_op_return(data))
            }
            OutputScriptType::Address => {
                let address = txo
                    .address
                    .as_deref()
                    .ok_or(SignError::Data("Output without address"))?;
                match decode_address(self.coin, address)? {
                    DecodedAddress::P2pkh(hash) => Ok(scripts::output_script_p2pkh(&hash)),
                    DecodedAddress::P2sh(hash) => Ok(scripts::output_script_p2sh(&hash)),
                    DecodedAddress::Witness(program) => {
                        Ok(scripts::output_script_native_segwit(&program))
                    }
                }
            }
            _ => self.change_derive_script(txo),
        }
    }

    // change outputs derive their script from our own key, never from an
    // address round-trip
    fn change_derive_script(&self, txo: &TxOutput) -> Result<Vec<u8>, SignError> {
        if txo.address_n.is_empty() {
            return Err(SignError::Data("Change output without path"));
        }

        if txo.script_type.is_multisig() {
            let multisig = txo
                .multisig
                .as_ref()
                .ok_or(SignError::Data("Multisig change output without descriptor"))?;
            let script = scripts::output_script_multisig(&multisig.pubkeys, multisig.m)?;
            return Ok(match txo.script_type {
                OutputScriptType::ChangeMultisig => {
                    scripts::output_script_p2sh(&hash160(&script))
                }
                OutputScriptType::ChangeP2wsh => {
                    scripts::output_script_native_segwit(&sha256(&script))
                }
                OutputScriptType::ChangeP2shP2wsh => {
                    let redeem = scripts::output_script_native_segwit(&sha256(&script));
                    scripts::output_script_p2sh(&hash160(&redeem))
                }
                _ => unreachable!("is_multisig covers exactly these variants"),
            });
        }

        let key = self.keychain.derive(&txo.address_n, self.coin.curve_name)?;
        let pubkeyhash = hash160(&key.public_key());
        match txo.script_type {
            OutputScriptType::ChangeP2pkh => Ok(scripts::output_script_p2pkh(&pubkeyhash)),
            OutputScriptType::ChangeP2wpkh => {
                if !self.coin.segwit {
                    return Err(SignError::Data("Segwit not enabled on this coin"));
                }
                Ok(scripts::output_script_native_segwit(&pubkeyhash))
            }
            OutputScriptType::ChangeP2shP2wpkh => {
                if !self.coin.segwit {
                    return Err(SignError::Data("Segwit not enabled on this coin"));
                }
                let redeem = scripts::output_script_native_segwit(&pubkeyhash);
                Ok(scripts::output_script_p2sh(&hash160(&redeem)))
            }
            _ => Err(SignError::Firmware("Not a change script type")),
        }
    }

    fn output_is_change(&self, txo: &TxOutput) -> Result<bool, SignError> {
        if !txo.script_type.is_change() {
            return Ok(false);
        }
        if let Some(multisig) = &txo.multisig {
            if !self.multisig_fp.matches(multisig)? {
                return Ok(false);
            }
        }
        let Some(prefix) = self.wallet_path.prefix() else {
            return Ok(false);
        };
        let Some(suffix) = txo.address_n.wallet_suffix() else {
            return Ok(false);
        };
        Ok(txo.address_n.wallet_prefix() == Some(prefix)
            && suffix[0] <= BIP32_CHANGE_CHAIN
            && suffix[1] <= BIP32_MAX_LAST_ELEMENT)
    }

    // TX inputs
    // ===

    fn input_derive_script(
        &self,
        txi: &TxInput,
        pubkey: &[u8],
        signature: Option<&[u8]>,
    ) -> Result<Vec<u8>, SignError> {
        match txi.script_type {
            InputScriptType::P2pkh => {
                let signature =
                    signature.ok_or(SignError::Firmware("Signature required for scriptSig"))?;
                Ok(scripts::input_script_p2pkh(
                    pubkey,
                    signature,
                    self.sighash_byte(),
                ))
            }
            InputScriptType::Multisig => {
                let multisig = txi
                    .multisig
                    .as_ref()
                    .ok_or(SignError::Data("Multisig input without descriptor"))?;
                let signature =
                    signature.ok_or(SignError::Firmware("Signature required for scriptSig"))?;
                let signature_index = multisig_pubkey_index(multisig, pubkey)?;
                scripts::input_script_multisig(
                    multisig,
                    signature,
                    signature_index,
                    self.sighash_byte(),
                )
            }
            InputScriptType::NestedWpkh => {
                Ok(scripts::input_script_p2wpkh_in_p2sh(&hash160(pubkey)))
            }
            InputScriptType::NestedWsh => {
                let multisig = txi
                    .multisig
                    .as_ref()
                    .ok_or(SignError::Data("Multisig input without descriptor"))?;
                let witness_script =
                    scripts::output_script_multisig(&multisig.pubkeys, multisig.m)?;
                Ok(scripts::input_script_p2wsh_in_p2sh(&sha256(&witness_script)))
            }
            InputScriptType::NativeWpkh | InputScriptType::NativeWsh => {
                Ok(scripts::input_script_native_segwit())
            }
        }
    }

    fn check_multisig_fp(&self, txi: &TxInput) -> Result<(), SignError> {
        if self.multisig_fp.mismatch() {
            // there was a mismatch in phase 1, ignore it now
            return Ok(());
        }
        // phase 1 allowed a multisig change output; the input must still
        // belong to the same group
        match &txi.multisig {
            Some(multisig) if self.multisig_fp.matches(multisig)? => Ok(()),
            _ => Err(SignError::Process("Transaction has changed during signing")),
        }
    }

    fn add_total_in(&mut self, amount: u64) -> Result<(), SignError> {
        self.total_in = self
            .total_in
            .checked_add(amount)
            .ok_or(SignError::Data("Value overflow"))?;
        Ok(())
    }

    fn add_bip143_in(&mut self, amount: u64) -> Result<(), SignError> {
        self.bip143_in = self
            .bip143_in
            .checked_add(amount)
            .ok_or(SignError::Data("Value overflow"))?;
        Ok(())
    }

    // Host requests
    // ===

    fn request(&mut self, kind: RequestKind, details: RequestDetails) -> Result<TxAck, SignError> {
        let req = TxRequest {
            kind,
            details,
            serialized: self.pending.take(),
        };
        self.host.request(req)
    }

    fn request_input(&mut self, index: u32) -> Result<TxInput, SignError> {
        let details = RequestDetails {
            request_index: index,
            ..Default::default()
        };
        match self.request(RequestKind::TxInput, details)? {
            TxAck::Input(txi) => {
                txi.sanitize()?;
                Ok(txi)
            }
            _ => Err(SignError::Data("Unexpected response to input request")),
        }
    }

    fn request_output(&mut self, index: u32) -> Result<TxOutput, SignError> {
        let details = RequestDetails {
            request_index: index,
            ..Default::default()
        };
        match self.request(RequestKind::TxOutput, details)? {
            TxAck::Output(txo) => {
                txo.sanitize()?;
                Ok(txo)
            }
            _ => Err(SignError::Data("Unexpected response to output request")),
        }
    }

    fn request_prev_meta(&mut self, tx_hash: Txid) -> Result<PrevTxMeta, SignError> {
        let details = RequestDetails {
            tx_hash: Some(tx_hash),
            ..Default::default()
        };
        match self.request(RequestKind::TxMeta, details)? {
            TxAck::Meta(meta) => Ok(meta),
            _ => Err(SignError::Data("Unexpected response to metadata request")),
        }
    }

    fn request_prev_input(&mut self, index: u32, tx_hash: Txid) -> Result<PrevInput, SignError> {
        let details = RequestDetails {
            request_index: index,
            tx_hash: Some(tx_hash),
            ..Default::default()
        };
        match self.request(RequestKind::TxInput, details)? {
            TxAck::PrevInput(txi) => Ok(txi),
            _ => Err(SignError::Data("Unexpected response to input request")),
        }
    }

    fn request_prev_output(&mut self, index: u32, tx_hash: Txid) -> Result<TxOutputBin, SignError> {
        let details = RequestDetails {
            request_index: index,
            tx_hash: Some(tx_hash),
            ..Default::default()
        };
        match self.request(RequestKind::TxOutput, details)? {
            TxAck::PrevOutput(txo_bin) => Ok(txo_bin),
            _ => Err(SignError::Data("Unexpected response to output request")),
        }
    }

    fn request_prev_extra_data(
        &mut self,
        offset: u32,
        len: u32,
        tx_hash: Txid,
    ) -> Result<Vec<u8>, SignError> {
        let details = RequestDetails {
            tx_hash: Some(tx_hash),
            extra_data_offset: offset,
            extra_data_len: len,
            ..Default::default()
        };
        match self.request(RequestKind::TxExtraData, details)? {
            TxAck::ExtraData(data) if data.len() == len as usize => Ok(data),
            TxAck::ExtraData(_) => Err(SignError::Data("Wrong extra data length")),
            _ => Err(SignError::Data("Unexpected response to extra data request")),
        }
    }

    fn request_finish(&mut self) -> Result<(), SignError> {
        match self.request(RequestKind::TxFinished, RequestDetails::default())? {
            TxAck::Finished => Ok(()),
            _ => Err(SignError::Data("Unexpected response to finish request")),
        }
    }
}

/// Structural check that an input path follows the standard five-level
/// layout for its script type: `purpose' / coin' / account' / chain /
/// index`. Anything else prompts a foreign-path warning.
fn validate_input_path(
    path: &DerivationPath,
    coin: &CoinParams,
    script_type: InputScriptType,
) -> bool {
    let indices = path.as_slice();
    if indices.len() != 5 {
        return false;
    }
    let expected_purpose = match script_type {
        InputScriptType::P2pkh => 44,
        InputScriptType::Multisig => 48,
        InputScriptType::NestedWpkh | InputScriptType::NestedWsh => 49,
        InputScriptType::NativeWpkh | InputScriptType::NativeWsh => 84,
    };
    indices[0] == (expected_purpose | BIP32_HARDEN)
        && indices[1] == (coin.slip44 | BIP32_HARDEN)
        && indices[2] >= BIP32_HARDEN
        && indices[2] <= (20 | BIP32_HARDEN)
        && indices[3] <= BIP32_CHANGE_CHAIN
        && indices[4] <= BIP32_MAX_LAST_ELEMENT
}
