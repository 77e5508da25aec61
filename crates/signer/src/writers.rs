//! Writers for the host transaction records.
//!
//! The same functions produce the final serialized stream, the rolling
//! check digests, and the sighash preimages, so the confirmation and
//! signing phases necessarily serialize identically.

use std::io::Write;

use coldsign_core::ser::{
    write_bytes, write_bytes_prefixed, write_u16_le, write_u32_le, write_u64_le, write_u8,
    SerResult,
};

use crate::types::{PrevInput, TxInput, TxOutputBin};

/// Byte length of a transaction hash.
pub const TX_HASH_SIZE: usize = 32;

// Decred witness fraud-proof placeholders
const DECRED_BLOCK_HEIGHT: u32 = 0;
const DECRED_BLOCK_INDEX: u32 = 0xffff_ffff;

/// Serialize one input with the given scriptSig.
pub fn write_tx_input<W: Write>(w: &mut W, txi: &TxInput, script_sig: &[u8]) -> SerResult<()> {
    write_bytes(w, txi.prev_hash.as_ref())?;
    write_u32_le(w, txi.prev_index)?;
    write_bytes_prefixed(w, script_sig)?;
    write_u32_le(w, txi.sequence)?;
    Ok(())
}

/// Serialize a replayed previous-transaction input verbatim.
pub fn write_prev_input<W: Write>(w: &mut W, txi: &PrevInput) -> SerResult<()> {
    write_bytes(w, txi.prev_hash.as_ref())?;
    write_u32_le(w, txi.prev_index)?;
    write_bytes_prefixed(w, txi.script_sig.items())?;
    write_u32_le(w, txi.sequence)?;
    Ok(())
}

/// Fold an input into a structural check digest: everything the user's
/// confirmation depends on, in a fixed layout that is not valid wire form.
pub fn write_tx_input_check<W: Write>(w: &mut W, txi: &TxInput) -> SerResult<()> {
    write_bytes(w, txi.prev_hash.as_ref())?;
    write_u32_le(w, txi.prev_index)?;
    write_u32_le(w, txi.script_type.check_tag())?;
    write_u32_le(w, txi.address_n.len() as u32)?;
    for index in txi.address_n.as_slice() {
        write_u32_le(w, *index)?;
    }
    write_u32_le(w, txi.sequence)?;
    write_u64_le(w, txi.amount.unwrap_or(0))?;
    Ok(())
}

/// Serialize one output. Decred outputs carry a script version between the
/// amount and the script.
pub fn write_tx_output<W: Write>(w: &mut W, txo: &TxOutputBin) -> SerResult<()> {
    write_u64_le(w, txo.amount)?;
    if let Some(script_version) = txo.script_version {
        write_u16_le(w, script_version)?;
    }
    write_bytes_prefixed(w, txo.script_pubkey.items())?;
    Ok(())
}

/// Serialize one input in Decred prefix form: outpoint, tree, sequence.
pub fn write_tx_input_decred<W: Write>(w: &mut W, txi: &TxInput) -> SerResult<()> {
    write_bytes(w, txi.prev_hash.as_ref())?;
    write_u32_le(w, txi.prev_index)?;
    write_u8(w, txi.decred_tree)?;
    write_u32_le(w, txi.sequence)?;
    Ok(())
}

/// Serialize a replayed previous-transaction input in Decred prefix form.
pub fn write_prev_input_decred<W: Write>(w: &mut W, txi: &PrevInput) -> SerResult<()> {
    write_bytes(w, txi.prev_hash.as_ref())?;
    write_u32_le(w, txi.prev_index)?;
    write_u8(w, txi.decred_tree)?;
    write_u32_le(w, txi.sequence)?;
    Ok(())
}

/// Serialize one input in Decred witness form: amount, fraud-proof
/// placeholders, scriptSig.
pub fn write_tx_input_decred_witness<W: Write>(
    w: &mut W,
    txi: &TxInput,
    script_sig: &[u8],
) -> SerResult<()> {
    write_u64_le(w, txi.amount.unwrap_or(0))?;
    write_u32_le(w, DECRED_BLOCK_HEIGHT)?;
    write_u32_le(w, DECRED_BLOCK_INDEX)?;
    write_bytes_prefixed(w, script_sig)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{DerivationPath, InputScriptType, ScriptPubkey};
    use coldsign_core::hashes::Txid;

    fn sample_input() -> TxInput {
        TxInput {
            address_n: DerivationPath::from(vec![0, 1]),
            prev_hash: Txid::from_be_hex(
                "9f96ade4b41d5433f4eda31e1738ec2b36f6e7d1420d94a6af99801a88f7f7ff",
            )
            .unwrap(),
            prev_index: 0,
            sequence: 0xffff_ffee,
            script_type: InputScriptType::P2pkh,
            amount: None,
            multisig: None,
            decred_tree: 0,
        }
    }

    #[test]
    fn it_serializes_inputs() {
        let mut buf = vec![];
        write_tx_input(&mut buf, &sample_input(), &[]).unwrap();
        assert_eq!(
            hex::encode(buf),
            "fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f0000000000eeffffff"
        );
    }

    #[test]
    fn check_form_commits_to_the_amount_and_path() {
        let txi = sample_input();
        let mut plain = vec![];
        write_tx_input_check(&mut plain, &txi).unwrap();

        let mut with_amount = vec![];
        let mut txi2 = txi.clone();
        txi2.amount = Some(7);
        write_tx_input_check(&mut with_amount, &txi2).unwrap();
        assert_ne!(plain, with_amount);

        let mut other_path = vec![];
        let mut txi3 = txi;
        txi3.address_n = DerivationPath::from(vec![0, 2]);
        write_tx_input_check(&mut other_path, &txi3).unwrap();
        assert_ne!(plain, other_path);
    }

    #[test]
    fn it_serializes_decred_outputs() {
        let txo = TxOutputBin {
            amount: 1000,
            script_pubkey: ScriptPubkey::new(vec![0x6a]),
            script_version: Some(0),
        };
        let mut buf = vec![];
        write_tx_output(&mut buf, &txo).unwrap();
        assert_eq!(hex::encode(buf), "e8030000000000000000016a");
    }
}
