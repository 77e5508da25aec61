//! Scripted host, confirmer, and fixture helpers for driving full signing
//! sessions.
#![allow(dead_code)]

use std::collections::HashMap;

use coldsign::prelude::*;

/// A previous transaction the host can replay on request.
#[derive(Clone, Default)]
pub struct PrevTx {
    pub meta: Option<PrevTxMeta>,
    pub inputs: Vec<PrevInput>,
    pub outputs: Vec<TxOutputBin>,
    pub extra_data: Vec<u8>,
}

/// A host that answers from fixed vectors and records everything the
/// signer streams back.
#[derive(Default)]
pub struct ScriptedHost {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub prev_txs: HashMap<Txid, PrevTx>,
    /// Substituted from the second request of that index onward.
    pub tampered_inputs: HashMap<u32, TxInput>,
    /// Substituted from the second request of that index onward.
    pub tampered_outputs: HashMap<u32, TxOutput>,

    input_requests: HashMap<u32, u32>,
    output_requests: HashMap<u32, u32>,
    pub stream: Vec<u8>,
    pub signatures: Vec<(u32, Vec<u8>)>,
    pub finished: bool,
}

impl ScriptedHost {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Self {
        Self {
            inputs,
            outputs,
            ..Default::default()
        }
    }

    pub fn with_prev_tx(mut self, txid: Txid, prev: PrevTx) -> Self {
        self.prev_txs.insert(txid, prev);
        self
    }

    pub fn tamper_input(mut self, index: u32, txi: TxInput) -> Self {
        self.tampered_inputs.insert(index, txi);
        self
    }

    pub fn tamper_output(mut self, index: u32, txo: TxOutput) -> Self {
        self.tampered_outputs.insert(index, txo);
        self
    }
}

impl Host for ScriptedHost {
    fn request(&mut self, req: TxRequest) -> Result<TxAck, SignError> {
        if let Some(serialized) = req.serialized {
            if let (Some(index), Some(signature)) =
                (serialized.signature_index, serialized.signature)
            {
                self.signatures.push((index, signature));
            }
            self.stream.extend_from_slice(&serialized.serialized_tx);
        }

        let index = req.details.request_index;
        match (req.kind, req.details.tx_hash) {
            (RequestKind::TxInput, None) => {
                let seen = self.input_requests.entry(index).or_insert(0);
                *seen += 1;
                let txi = if *seen > 1 {
                    self.tampered_inputs
                        .get(&index)
                        .cloned()
                        .unwrap_or_else(|| self.inputs[index as usize].clone())
                } else {
                    self.inputs[index as usize].clone()
                };
                Ok(TxAck::Input(txi))
            }
            (RequestKind::TxOutput, None) => {
                let seen = self.output_requests.entry(index).or_insert(0);
                *seen += 1;
                let txo = if *seen > 1 {
                    self.tampered_outputs
                        .get(&index)
                        .cloned()
                        .unwrap_or_else(|| self.outputs[index as usize].clone())
                } else {
                    self.outputs[index as usize].clone()
                };
                Ok(TxAck::Output(txo))
            }
            (RequestKind::TxMeta, Some(hash)) => {
                let prev = self.prev_txs.get(&hash).expect("unknown prev tx");
                Ok(TxAck::Meta(prev.meta.clone().expect("prev tx without meta")))
            }
            (RequestKind::TxInput, Some(hash)) => {
                let prev = self.prev_txs.get(&hash).expect("unknown prev tx");
                Ok(TxAck::PrevInput(prev.inputs[index as usize].clone()))
            }
            (RequestKind::TxOutput, Some(hash)) => {
                let prev = self.prev_txs.get(&hash).expect("unknown prev tx");
                Ok(TxAck::PrevOutput(prev.outputs[index as usize].clone()))
            }
            (RequestKind::TxExtraData, Some(hash)) => {
                let prev = self.prev_txs.get(&hash).expect("unknown prev tx");
                let offset = req.details.extra_data_offset as usize;
                let len = req.details.extra_data_len as usize;
                Ok(TxAck::ExtraData(prev.extra_data[offset..offset + len].to_vec()))
            }
            (RequestKind::TxFinished, _) => {
                self.finished = true;
                Ok(TxAck::Finished)
            }
            _ => Err(SignError::Data("host got an unexpected request")),
        }
    }
}

/// A confirmer with scripted answers that records every prompt.
#[derive(Default)]
pub struct ScriptedConfirmer {
    pub reject_outputs: bool,
    pub reject_fee: bool,
    pub reject_locktime: bool,
    pub reject_total: bool,
    pub reject_foreign: bool,

    pub confirmed_outputs: Vec<u64>,
    pub foreign_prompts: u32,
    pub fee_prompts: Vec<u64>,
    pub locktime_prompts: Vec<u32>,
    pub totals: Vec<(u64, i64)>,
}

impl Confirmer for ScriptedConfirmer {
    fn confirm_output(&mut self, output: &TxOutput, _coin: &CoinParams) -> Result<bool, SignError> {
        self.confirmed_outputs.push(output.amount);
        Ok(!self.reject_outputs)
    }

    fn confirm_foreign_path(&mut self, _path: &DerivationPath) -> Result<bool, SignError> {
        self.foreign_prompts += 1;
        Ok(!self.reject_foreign)
    }

    fn confirm_fee_over_threshold(
        &mut self,
        fee: u64,
        _coin: &CoinParams,
    ) -> Result<bool, SignError> {
        self.fee_prompts.push(fee);
        Ok(!self.reject_fee)
    }

    fn confirm_nondefault_locktime(&mut self, lock_time: u32) -> Result<bool, SignError> {
        self.locktime_prompts.push(lock_time);
        Ok(!self.reject_locktime)
    }

    fn confirm_total(
        &mut self,
        spending: u64,
        fee: i64,
        _coin: &CoinParams,
    ) -> Result<bool, SignError> {
        self.totals.push((spending, fee));
        Ok(!self.reject_total)
    }
}

/// A `Txid` from wire-order hex.
pub fn txid(wire_hex: &str) -> Txid {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hex::decode(wire_hex).unwrap());
    Txid(bytes)
}

pub fn hardened(index: u32) -> u32 {
    index | 0x8000_0000
}

pub fn p2pkh_script(pubkeyhash: &[u8]) -> Vec<u8> {
    let mut script = vec![0x76, 0xa9, 0x14];
    script.extend_from_slice(pubkeyhash);
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

pub fn sha256d(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(Sha256::digest(data)));
    out
}

pub fn blake256(data: &[u8]) -> [u8; 32] {
    use blake_hash::{Blake256, Digest};
    let mut out = [0u8; 32];
    out.copy_from_slice(&Blake256::digest(data));
    out
}

pub fn compact(n: u64) -> Vec<u8> {
    match n {
        0..=0xfc => vec![n as u8],
        0xfd..=0xffff => {
            let mut v = vec![0xfd];
            v.extend_from_slice(&(n as u16).to_le_bytes());
            v
        }
        _ => {
            let mut v = vec![0xfe];
            v.extend_from_slice(&(n as u32).to_le_bytes());
            v
        }
    }
}

/// Serialize a legacy previous transaction by hand and return its host
/// fixture together with the wire txid.
pub fn legacy_prev_tx(
    version: u32,
    timestamp: Option<u32>,
    outputs: &[(u64, Vec<u8>)],
    extra_data: &[u8],
) -> (PrevTx, Txid) {
    let prev_input = PrevInput {
        prev_hash: Txid([0x55; 32]),
        prev_index: 3,
        script_sig: ScriptSig::new(vec![0x51]),
        sequence: 0xffff_ffff,
        decred_tree: 0,
    };

    let mut raw = vec![];
    raw.extend_from_slice(&version.to_le_bytes());
    if let Some(stamp) = timestamp {
        raw.extend_from_slice(&stamp.to_le_bytes());
    }
    raw.extend_from_slice(&compact(1));
    raw.extend_from_slice(&[0x55; 32]);
    raw.extend_from_slice(&3u32.to_le_bytes());
    raw.extend_from_slice(&compact(1));
    raw.push(0x51);
    raw.extend_from_slice(&0xffff_ffffu32.to_le_bytes());
    raw.extend_from_slice(&compact(outputs.len() as u64));
    for (amount, script) in outputs {
        raw.extend_from_slice(&amount.to_le_bytes());
        raw.extend_from_slice(&compact(script.len() as u64));
        raw.extend_from_slice(script);
    }
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(extra_data);

    let prev = PrevTx {
        meta: Some(PrevTxMeta {
            version,
            inputs_count: 1,
            outputs_count: outputs.len() as u32,
            lock_time: 0,
            expiry: 0,
            timestamp: timestamp.unwrap_or(0),
            version_group_id: None,
            extra_data_len: extra_data.len() as u32,
        }),
        inputs: vec![prev_input],
        outputs: outputs
            .iter()
            .map(|(amount, script)| TxOutputBin {
                amount: *amount,
                script_pubkey: ScriptPubkey::new(script.clone()),
                script_version: None,
            })
            .collect(),
        extra_data: extra_data.to_vec(),
    };
    (prev, Txid(sha256d(&raw)))
}
