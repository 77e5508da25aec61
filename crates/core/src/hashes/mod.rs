//! Typed digest sinks and marked digest newtypes.
//!
//! We wrap hashes in marked newtypes in order to prevent type-confusion
//! between txids, sighashes, and other digests with the same length. The
//! sinks implement `std::io::Write`, so the serializers in [`crate::ser`]
//! feed them directly.

mod blake256;
mod blake2b;
mod sha256;

pub use blake256::*;
pub use blake2b::*;
pub use sha256::*;

use std::io::Write;

/// A hash sink that accepts serialized bytes through `std::io::Write` and
/// produces a 32-byte digest.
pub trait DigestWriter: Write + Sized {
    /// Consume the sink and produce the raw digest.
    fn finish(self) -> [u8; 32];

    /// Apply one more round of the underlying hash to a finished digest.
    fn rehash(digest: [u8; 32]) -> [u8; 32];

    /// Finalize a transaction-style digest: optionally apply a second hash
    /// round, optionally flip into display (big-endian) order.
    fn finish_tx_hash(self, double: bool, reverse: bool) -> [u8; 32] {
        let mut digest = self.finish();
        if double {
            digest = Self::rehash(digest);
        }
        if reverse {
            digest.reverse();
        }
        digest
    }
}

crate::mark_32_byte_hash!(
    /// A transaction ID, stored in wire (little-endian) byte order. Use
    /// `from_be_hex`/`to_be_hex` for the display order block explorers show.
    Txid
);

crate::mark_32_byte_hash!(
    /// A signature-hash digest, ready to be handed to the curve.
    SigHash
);

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest as _, Sha256};
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// SHA-256 then RIPEMD-160. Bitcoin's HASH-160, used for pubkey and script
/// hashes.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    use ripemd::Ripemd160;
    use sha2::{Digest as _, Sha256};
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(Sha256::digest(data)));
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ser::ByteFormat;

    #[test]
    fn it_flips_marked_digests() {
        let txid = Txid::from_be_hex(
            "9f96ade4b41d5433f4eda31e1738ec2b36f6e7d1420d94a6af99801a88f7f7ff",
        )
        .unwrap();
        assert_eq!(
            txid.serialize_hex(),
            "fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f"
        );
        assert_eq!(
            txid.to_be_hex(),
            "9f96ade4b41d5433f4eda31e1738ec2b36f6e7d1420d94a6af99801a88f7f7ff"
        );
    }

    #[test]
    fn it_computes_hash160() {
        // HASH-160 of the compressed pubkey from the BIP-143 appendix
        let pubkey =
            hex::decode("025476c2e83188368da1ff3e292e7acafcdb3566bb0ad253f62fc70f07aeee6357")
                .unwrap();
        assert_eq!(
            hex::encode(hash160(&pubkey)),
            "1d0f172a0ecb48aee1be1f2687d2963ae33f71a1"
        );
    }
}
