//! Per-coin signing parameters.
//!
//! The signer consumes these records; the full coin table is maintained
//! outside this crate. A handful of well-known chains are provided as
//! constants for hosts and tests.

/// Which checksum the coin's Base58Check addresses carry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum B58Checksum {
    /// Double SHA-256 (Bitcoin and most descendants).
    Sha256d,
    /// Double BLAKE-256 (Decred).
    Blake256d,
}

/// Signing-relevant parameters of one chain.
#[derive(Clone, Debug)]
pub struct CoinParams {
    /// Human-readable coin name.
    pub coin_name: &'static str,
    /// Curve the keychain derives on.
    pub curve_name: &'static str,
    /// SLIP-44 coin type, used for input-path validation.
    pub slip44: u32,
    /// Apply a second hash round when finalizing signature and transaction
    /// hashes.
    pub sign_hash_double: bool,
    /// Base58Check version prefix for P2PKH addresses. Values above 0xff
    /// encode a two-byte prefix.
    pub address_type: u16,
    /// Base58Check version prefix for P2SH addresses.
    pub address_type_p2sh: u16,
    /// Fee threshold in satoshis per 1000 vbytes above which an explicit
    /// confirmation is required.
    pub maxfee_kb: u64,
    /// Outputs may exceed inputs (reward transactions on some chains).
    pub negative_fee: bool,
    /// BIP-143 fork id. Forces BIP-143 signing with the forkid hash type.
    pub fork_id: Option<u8>,
    /// Segwit inputs allowed.
    pub segwit: bool,
    /// Sign legacy inputs with the BIP-143 algorithm (fork coins).
    pub force_bip143: bool,
    /// Zcash Overwinter/Sapling transaction format.
    pub overwintered: bool,
    /// Decred transaction format and BLAKE-256 hashing.
    pub decred: bool,
    /// Transactions carry a u32 timestamp after the version.
    pub timestamp: bool,
    /// Transactions carry a trailing extra-data region (Zcash join-splits).
    pub extra_data: bool,
    /// Bech32 HRP for native segwit addresses.
    pub bech32_prefix: Option<&'static str>,
    /// Base58Check checksum hash.
    pub b58_checksum: B58Checksum,
}

/// Bitcoin mainnet.
pub const BITCOIN: CoinParams = CoinParams {
    coin_name: "Bitcoin",
    curve_name: "secp256k1",
    slip44: 0,
    sign_hash_double: true,
    address_type: 0x00,
    address_type_p2sh: 0x05,
    maxfee_kb: 2_000_000,
    negative_fee: false,
    fork_id: None,
    segwit: true,
    force_bip143: false,
    overwintered: false,
    decred: false,
    timestamp: false,
    extra_data: false,
    bech32_prefix: Some("bc"),
    b58_checksum: B58Checksum::Sha256d,
};

/// Bitcoin Cash. No segwit; all inputs sign with BIP-143 and the forkid
/// hash type.
pub const BCASH: CoinParams = CoinParams {
    coin_name: "Bcash",
    curve_name: "secp256k1",
    slip44: 145,
    sign_hash_double: true,
    address_type: 0x00,
    address_type_p2sh: 0x05,
    maxfee_kb: 500_000,
    negative_fee: false,
    fork_id: Some(0),
    segwit: false,
    force_bip143: true,
    overwintered: false,
    decred: false,
    timestamp: false,
    extra_data: false,
    bech32_prefix: None,
    b58_checksum: B58Checksum::Sha256d,
};

/// Zcash transparent signing (Overwinter/Sapling).
pub const ZCASH: CoinParams = CoinParams {
    coin_name: "Zcash",
    curve_name: "secp256k1",
    slip44: 133,
    sign_hash_double: false,
    address_type: 0x1cb8,
    address_type_p2sh: 0x1cbd,
    maxfee_kb: 1_000_000,
    negative_fee: false,
    fork_id: None,
    segwit: false,
    force_bip143: false,
    overwintered: true,
    decred: false,
    timestamp: false,
    extra_data: true,
    bech32_prefix: None,
    b58_checksum: B58Checksum::Sha256d,
};

/// Decred.
pub const DECRED: CoinParams = CoinParams {
    coin_name: "Decred",
    curve_name: "secp256k1-decred",
    slip44: 42,
    sign_hash_double: false,
    address_type: 0x073f,
    address_type_p2sh: 0x071a,
    maxfee_kb: 10_000_000,
    negative_fee: false,
    fork_id: None,
    segwit: false,
    force_bip143: false,
    overwintered: false,
    decred: true,
    timestamp: false,
    extra_data: false,
    bech32_prefix: None,
    b58_checksum: B58Checksum::Blake256d,
};

/// Peercoin, a timestamped chain.
pub const PEERCOIN: CoinParams = CoinParams {
    coin_name: "Peercoin",
    curve_name: "secp256k1",
    slip44: 6,
    sign_hash_double: true,
    address_type: 0x37,
    address_type_p2sh: 0x75,
    maxfee_kb: 2_000_000,
    negative_fee: false,
    fork_id: None,
    segwit: false,
    force_bip143: false,
    overwintered: false,
    decred: false,
    timestamp: true,
    extra_data: false,
    bech32_prefix: None,
    b58_checksum: B58Checksum::Sha256d,
};

impl CoinParams {
    /// The Base58Check version-prefix bytes for a given prefix value.
    pub fn version_prefix_bytes(version: u16) -> Vec<u8> {
        if version <= 0xff {
            vec![version as u8]
        } else {
            version.to_be_bytes().to_vec()
        }
    }
}
