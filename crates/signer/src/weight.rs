//! Incremental virtual-size estimation.
//!
//! Only used to scale the per-kilobyte fee threshold; the estimate assumes
//! worst-case DER signature lengths, so it slightly overshoots the final
//! weight.

use coldsign_core::ser::prefix_byte_len;

use crate::{scripts::op_push_size, types::{InputScriptType, TxInput}};

// serialized sizes in bytes (weight counts base bytes four times)
const TXSIZE_HEADER: u64 = 4;
const TXSIZE_FOOTER: u64 = 4;
// segwit marker and flag
const TXSIZE_SEGWIT_OVERHEAD: u64 = 2;
// outpoint (36) + sequence (4)
const TXSIZE_INPUT: u64 = 40;
// amount only; the script is counted separately
const TXSIZE_OUTPUT: u64 = 8;
const TXSIZE_PUBKEY: u64 = 33;
// 2 type bytes, 2 len bytes, 33 R, 33 S, sighash byte
const TXSIZE_DER_SIGNATURE: u64 = 72;
// m, n, OP_CHECKMULTISIG
const TXSIZE_MULTISIGSCRIPT: u64 = 3;
// version byte, push, 20-byte hash
const TXSIZE_WITNESSPKHASH: u64 = 22;
// version byte, push, 32-byte hash
const TXSIZE_WITNESSSCRIPT: u64 = 34;

/// Accumulates the BIP-141 weight of the transaction under construction.
pub struct TxWeightCalculator {
    inputs_count: u32,
    segwit_inputs_count: u32,
    counter: u64,
}

impl TxWeightCalculator {
    /// Start a calculation for the declared input and output counts.
    pub fn new(inputs_count: u32, outputs_count: u32) -> Self {
        let counter = 4 * (TXSIZE_HEADER
            + TXSIZE_FOOTER
            + prefix_byte_len(inputs_count as u64) as u64
            + prefix_byte_len(outputs_count as u64) as u64);
        Self {
            inputs_count,
            segwit_inputs_count: 0,
            counter,
        }
    }

    /// Account for one input, dispatching on its script type.
    pub fn add_input(&mut self, txi: &TxInput) {
        let mut input_script_size = match &txi.multisig {
            Some(multisig) => {
                let multisig_script_size =
                    TXSIZE_MULTISIGSCRIPT + multisig.pubkeys.len() as u64 * (1 + TXSIZE_PUBKEY);
                // null byte eaten by CHECKMULTISIG, m signatures, script push
                1 + multisig.m as u64 * (1 + TXSIZE_DER_SIGNATURE)
                    + op_push_size(multisig_script_size)
                    + multisig_script_size
            }
            None => 1 + TXSIZE_DER_SIGNATURE + 1 + TXSIZE_PUBKEY,
        };

        self.counter += 4 * TXSIZE_INPUT;

        if !txi.script_type.is_segwit() {
            input_script_size += prefix_byte_len(input_script_size) as u64;
            self.counter += 4 * input_script_size;
        } else {
            self.segwit_inputs_count += 1;
            match txi.script_type {
                InputScriptType::NestedWpkh => {
                    self.counter += 4 * (2 + TXSIZE_WITNESSPKHASH);
                }
                InputScriptType::NestedWsh => {
                    self.counter += 4 * (2 + TXSIZE_WITNESSSCRIPT);
                }
                // native inputs: one byte for the empty scriptSig
                _ => self.counter += 4,
            }
            // witness: item count plus the stack itself
            self.counter += 1 + prefix_byte_len(input_script_size) as u64 + input_script_size;
        }
    }

    /// Account for one output's locking script.
    pub fn add_output(&mut self, script: &[u8]) {
        let script_size = prefix_byte_len(script.len() as u64) as u64 + script.len() as u64;
        self.counter += 4 * (TXSIZE_OUTPUT + script_size);
    }

    /// The accumulated weight: four times the base size plus witness bytes.
    pub fn get_total(&self) -> u64 {
        let mut total = self.counter;
        if self.segwit_inputs_count > 0 {
            total += TXSIZE_SEGWIT_OVERHEAD;
            // non-segwit positions still carry one empty-witness byte
            total += (self.inputs_count - self.segwit_inputs_count) as u64;
        }
        total
    }
}
