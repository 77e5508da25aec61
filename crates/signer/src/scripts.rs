//! Script builders for the supported address families.
//!
//! Scripts are opaque byte vectors here; there is no assembly, disassembly,
//! or execution, only the fixed shapes the signer emits. Witness stacks use
//! compact-size item lengths, scriptSigs use push opcodes.

use coldsign_core::ser::{write_bytes_prefixed, write_compact_int};

use crate::{error::SignError, types::MultisigDescriptor};

const OP_0: u8 = 0x00;
const OP_RETURN: u8 = 0x6a;
const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_1: u8 = 0x50;

/// `OP_DUP OP_HASH160 <pkh> OP_EQUALVERIFY OP_CHECKSIG`
pub fn output_script_p2pkh(pubkeyhash: &[u8; 20]) -> Vec<u8> {
    let mut s = Vec::with_capacity(25);
    s.extend_from_slice(&[OP_DUP, OP_HASH160, 0x14]);
    s.extend_from_slice(pubkeyhash);
    s.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    s
}

/// `OP_HASH160 <sh> OP_EQUAL`
pub fn output_script_p2sh(scripthash: &[u8; 20]) -> Vec<u8> {
    let mut s = Vec::with_capacity(23);
    s.extend_from_slice(&[OP_HASH160, 0x14]);
    s.extend_from_slice(scripthash);
    s.push(OP_EQUAL);
    s
}

/// `OP_0 <program>` for native v0 P2WPKH (20-byte) and P2WSH (32-byte)
/// programs.
pub fn output_script_native_segwit(witprog: &[u8]) -> Vec<u8> {
    let mut s = Vec::with_capacity(witprog.len() + 2);
    s.push(OP_0);
    s.push(witprog.len() as u8);
    s.extend_from_slice(witprog);
    s
}

/// `OP_RETURN <push>`
pub fn output_script_op_return(data: &[u8]) -> Vec<u8> {
    let mut s = Vec::with_capacity(data.len() + 3);
    s.push(OP_RETURN);
    write_op_push(&mut s, data.len());
    s.extend_from_slice(data);
    s
}

/// `m <pk 1> .. <pk n> n OP_CHECKMULTISIG`. Caller-supplied pubkey ordering
/// is retained; the fingerprint logic takes set identity modulo ordering.
pub fn output_script_multisig(pubkeys: &[Vec<u8>], m: u32) -> Result<Vec<u8>, SignError> {
    let n = pubkeys.len() as u32;
    if m == 0 || m > n || n == 0 || n > 15 {
        return Err(SignError::Data("Invalid multisig parameters"));
    }
    let mut s = Vec::with_capacity(3 + pubkeys.len() * 34);
    s.push(OP_1 + m as u8);
    for pubkey in pubkeys {
        if pubkey.len() != 33 {
            return Err(SignError::Data("Invalid multisig pubkey length"));
        }
        s.push(0x21);
        s.extend_from_slice(pubkey);
    }
    s.push(OP_1 + n as u8);
    s.push(OP_CHECKMULTISIG);
    Ok(s)
}

/// scriptSig spending P2PKH: `<sig> <pubkey>`.
pub fn input_script_p2pkh(pubkey: &[u8], signature: &[u8], sighash_byte: u8) -> Vec<u8> {
    let mut s = Vec::with_capacity(signature.len() + pubkey.len() + 4);
    append_signature(&mut s, signature, sighash_byte);
    append_pubkey(&mut s, pubkey);
    s
}

/// scriptSig spending P2SH multisig: `OP_0 <sig..> <redeem script>`. Empty
/// signature slots are omitted; the leading null feeds the
/// OP_CHECKMULTISIG off-by-one.
pub fn input_script_multisig(
    multisig: &MultisigDescriptor,
    signature: &[u8],
    signature_index: usize,
    sighash_byte: u8,
) -> Result<Vec<u8>, SignError> {
    let mut slots = multisig.signature_slots();
    if slots
        .get(signature_index)
        .map_or(true, |slot| !slot.is_empty())
    {
        return Err(SignError::Data("Invalid multisig parameters"));
    }
    slots[signature_index] = signature.to_vec();

    let mut s = vec![OP_0];
    for slot in slots.iter().filter(|slot| !slot.is_empty()) {
        append_signature(&mut s, slot, sighash_byte);
    }
    let redeem_script = output_script_multisig(&multisig.pubkeys, multisig.m)?;
    write_op_push(&mut s, redeem_script.len());
    s.extend_from_slice(&redeem_script);
    Ok(s)
}

/// scriptSig spending P2WPKH nested in P2SH: a push of the `0014 <pkh>`
/// redeem script.
pub fn input_script_p2wpkh_in_p2sh(pubkeyhash: &[u8; 20]) -> Vec<u8> {
    let mut s = Vec::with_capacity(23);
    s.extend_from_slice(&[0x16, OP_0, 0x14]);
    s.extend_from_slice(pubkeyhash);
    s
}

/// scriptSig spending P2WSH nested in P2SH: a push of the `0020 <sha256>`
/// redeem script.
pub fn input_script_p2wsh_in_p2sh(script_hash: &[u8; 32]) -> Vec<u8> {
    let mut s = Vec::with_capacity(35);
    s.extend_from_slice(&[0x22, OP_0, 0x20]);
    s.extend_from_slice(script_hash);
    s
}

/// Native witness inputs carry an empty scriptSig.
pub fn input_script_native_segwit() -> Vec<u8> {
    Vec::new()
}

/// Two-item witness stack for P2WPKH: `<sig> <pubkey>`.
pub fn witness_p2wpkh(signature: &[u8], pubkey: &[u8], sighash_byte: u8) -> Vec<u8> {
    let mut w = Vec::with_capacity(signature.len() + pubkey.len() + 5);
    w.push(0x02);
    append_signature(&mut w, signature, sighash_byte);
    append_pubkey(&mut w, pubkey);
    w
}

/// Witness stack for P2WSH multisig: a leading null item for the
/// OP_CHECKMULTISIG off-by-one, one slot per cosigner with our partial
/// signature placed at `signature_index` and zero-length items elsewhere,
/// then the witness script.
pub fn witness_p2wsh(
    multisig: &MultisigDescriptor,
    signature: &[u8],
    signature_index: usize,
    sighash_byte: u8,
) -> Result<Vec<u8>, SignError> {
    let mut slots = multisig.signature_slots();
    if slots
        .get(signature_index)
        .map_or(true, |slot| !slot.is_empty())
    {
        return Err(SignError::Data("Invalid multisig parameters"));
    }
    slots[signature_index] = signature.to_vec();

    let witness_script = output_script_multisig(&multisig.pubkeys, multisig.m)?;

    let mut w = Vec::new();
    write_compact_int(&mut w, slots.len() as u64 + 2)?;
    w.push(0x00);
    for slot in &slots {
        if slot.is_empty() {
            w.push(0x00);
        } else {
            append_signature(&mut w, slot, sighash_byte);
        }
    }
    write_bytes_prefixed(&mut w, &witness_script)?;
    Ok(w)
}

fn append_signature(w: &mut Vec<u8>, signature: &[u8], sighash_byte: u8) {
    write_op_push(w, signature.len() + 1);
    w.extend_from_slice(signature);
    w.push(sighash_byte);
}

fn append_pubkey(w: &mut Vec<u8>, pubkey: &[u8]) {
    write_op_push(w, pubkey.len());
    w.extend_from_slice(pubkey);
}

fn write_op_push(w: &mut Vec<u8>, length: usize) {
    if length < 0x4c {
        w.push(length as u8);
    } else if length <= 0xff {
        w.push(0x4c);
        w.push(length as u8);
    } else if length <= 0xffff {
        w.push(0x4d);
        w.extend_from_slice(&(length as u16).to_le_bytes());
    } else {
        w.push(0x4e);
        w.extend_from_slice(&(length as u32).to_le_bytes());
    }
}

/// The compact-size-prefixed serialized length of a witness stack, used by
/// size estimation.
pub(crate) fn op_push_size(length: u64) -> u64 {
    match length {
        0..=0x4b => 1,
        0x4c..=0xff => 2,
        0x100..=0xffff => 3,
        _ => 5,
    }
}

// keep the builders honest against the shapes the chain expects
#[cfg(test)]
mod test {
    use super::*;

    fn dummy_multisig() -> MultisigDescriptor {
        MultisigDescriptor {
            pubkeys: vec![vec![0x02; 33], vec![0x03; 33], vec![0x02; 33]],
            m: 2,
            signatures: vec![],
        }
    }

    #[test]
    fn it_builds_output_scripts() {
        let pkh = [0x11u8; 20];
        assert_eq!(
            hex::encode(output_script_p2pkh(&pkh)),
            "76a914111111111111111111111111111111111111111188ac"
        );
        assert_eq!(
            hex::encode(output_script_p2sh(&pkh)),
            "a914111111111111111111111111111111111111111187"
        );
        assert_eq!(
            hex::encode(output_script_native_segwit(&pkh)),
            "00141111111111111111111111111111111111111111"
        );
    }

    #[test]
    fn it_builds_op_return_scripts() {
        assert_eq!(hex::encode(output_script_op_return(b"ab")), "6a026162");

        let long = vec![0xcc; 80];
        let script = output_script_op_return(&long);
        assert_eq!(&script[..3], &[0x6a, 0x4c, 80]);
        assert_eq!(script.len(), 83);
    }

    #[test]
    fn it_builds_multisig_scripts() {
        let script = output_script_multisig(&dummy_multisig().pubkeys, 2).unwrap();
        assert_eq!(script[0], 0x52);
        assert_eq!(script[script.len() - 2], 0x53);
        assert_eq!(script[script.len() - 1], 0xae);
        assert_eq!(script.len(), 3 + 3 * 34);

        assert!(output_script_multisig(&dummy_multisig().pubkeys, 0).is_err());
        assert!(output_script_multisig(&dummy_multisig().pubkeys, 4).is_err());
    }

    #[test]
    fn it_places_partial_witness_signatures() {
        let witness = witness_p2wsh(&dummy_multisig(), &[0x30; 70], 1, 0x01).unwrap();
        // 5 items: null, three slots, script
        assert_eq!(witness[0], 0x05);
        assert_eq!(witness[1], 0x00);
        // empty slot 0, signature at slot 1 (70 bytes + hash type)
        assert_eq!(witness[2], 0x00);
        assert_eq!(witness[3], 71);
        assert_eq!(witness[4 + 70], 0x01);
        // refuses to overwrite a filled slot
        let mut filled = dummy_multisig();
        filled.signatures = vec![vec![], vec![0x30; 70], vec![]];
        assert!(witness_p2wsh(&filled, &[0x30; 70], 1, 0x01).is_err());
    }

    #[test]
    fn it_builds_nested_input_scripts() {
        let script = input_script_p2wpkh_in_p2sh(&[0x22; 20]);
        assert_eq!(script.len(), 23);
        assert_eq!(&script[..3], &[0x16, 0x00, 0x14]);

        let script = input_script_p2wsh_in_p2sh(&[0x33; 32]);
        assert_eq!(script.len(), 35);
        assert_eq!(&script[..3], &[0x22, 0x00, 0x20]);
    }
}
