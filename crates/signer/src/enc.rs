//! Address decoding for output-script derivation.
//!
//! The codecs themselves come from the ecosystem (`bs58`, `bech32`); this
//! module maps decoded payloads onto the coin's version prefixes and
//! checksum conventions.

use bech32::{FromBase32, Variant};
use std::io::Write;

use coldsign_core::hashes::{DigestWriter, Blake256Writer, Sha256Writer};

use crate::{
    coins::{B58Checksum, CoinParams},
    error::SignError,
};

/// A decoded destination address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodedAddress {
    /// Legacy pay-to-pubkey-hash.
    P2pkh([u8; 20]),
    /// Legacy pay-to-script-hash.
    P2sh([u8; 20]),
    /// Native v0 witness program (20 or 32 bytes).
    Witness(Vec<u8>),
}

/// Decode a destination address according to the coin's conventions.
pub fn decode_address(coin: &CoinParams, addr: &str) -> Result<DecodedAddress, SignError> {
    if let Some(hrp) = coin.bech32_prefix {
        let mut prefix = String::from(hrp);
        prefix.push('1');
        if addr.to_ascii_lowercase().starts_with(&prefix) {
            return decode_bech32(hrp, addr);
        }
    }
    decode_base58check(coin, addr)
}

fn decode_bech32(hrp: &str, addr: &str) -> Result<DecodedAddress, SignError> {
    let (got_hrp, data, variant) =
        bech32::decode(addr).map_err(|_| SignError::Data("Invalid address"))?;
    if got_hrp != hrp || variant != Variant::Bech32 {
        return Err(SignError::Data("Invalid address"));
    }
    let version = data
        .first()
        .ok_or(SignError::Data("Invalid address"))?
        .to_u8();
    if version != 0 {
        return Err(SignError::Data("Unsupported witness version"));
    }
    let program =
        Vec::<u8>::from_base32(&data[1..]).map_err(|_| SignError::Data("Invalid address"))?;
    if program.len() != 20 && program.len() != 32 {
        return Err(SignError::Data("Invalid witness program length"));
    }
    Ok(DecodedAddress::Witness(program))
}

fn decode_base58check(coin: &CoinParams, addr: &str) -> Result<DecodedAddress, SignError> {
    let raw = bs58::decode(addr)
        .into_vec()
        .map_err(|_| SignError::Data("Invalid address"))?;
    if raw.len() < 25 {
        return Err(SignError::Data("Invalid address"));
    }
    let (payload, checksum) = raw.split_at(raw.len() - 4);
    if b58_checksum(coin, payload) != checksum {
        return Err(SignError::Data("Invalid address checksum"));
    }

    let pkh_prefix = CoinParams::version_prefix_bytes(coin.address_type);
    let sh_prefix = CoinParams::version_prefix_bytes(coin.address_type_p2sh);
    if let Some(hash) = strip_prefix(payload, &pkh_prefix) {
        return Ok(DecodedAddress::P2pkh(hash));
    }
    if let Some(hash) = strip_prefix(payload, &sh_prefix) {
        return Ok(DecodedAddress::P2sh(hash));
    }
    Err(SignError::Data("Invalid address type"))
}

fn strip_prefix(payload: &[u8], prefix: &[u8]) -> Option<[u8; 20]> {
    if payload.len() != prefix.len() + 20 || !payload.starts_with(prefix) {
        return None;
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[prefix.len()..]);
    Some(hash)
}

fn b58_checksum(coin: &CoinParams, payload: &[u8]) -> [u8; 4] {
    let digest = match coin.b58_checksum {
        B58Checksum::Sha256d => {
            let mut w = Sha256Writer::default();
            w.write(payload).expect("hash sinks never fail");
            w.finish_tx_hash(true, false)
        }
        B58Checksum::Blake256d => {
            let mut w = Blake256Writer::default();
            w.write(payload).expect("hash sinks never fail");
            w.finish_tx_hash(true, false)
        }
    };
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Encode a Base58Check address for a payload hash; used by hosts and
/// tests to round-trip destinations.
pub fn encode_base58check(coin: &CoinParams, version: u16, hash: &[u8; 20]) -> String {
    let mut payload = CoinParams::version_prefix_bytes(version);
    payload.extend_from_slice(hash);
    let checksum = b58_checksum(coin, &payload);
    payload.extend_from_slice(&checksum);
    bs58::encode(payload).into_string()
}
