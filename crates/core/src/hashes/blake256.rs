use blake_hash::{Blake256, Digest as BlakeDigest};
use std::io::{Result as IOResult, Write};

use crate::hashes::DigestWriter;

/// A BLAKE-256 sink exposing a `Write` interface.
///
/// This is the 14-round SHA-3 finalist BLAKE, not BLAKE2. Decred hashes its
/// transactions and signature preimages with it.
#[derive(Clone)]
pub struct Blake256Writer {
    internal: Blake256,
}

impl Default for Blake256Writer {
    fn default() -> Blake256Writer {
        Blake256Writer {
            internal: Blake256::new(),
        }
    }
}

impl Write for Blake256Writer {
    fn write(&mut self, buf: &[u8]) -> IOResult<usize> {
        self.internal.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> IOResult<()> {
        Ok(())
    }
}

impl DigestWriter for Blake256Writer {
    fn finish(self) -> [u8; 32] {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&self.internal.finalize());
        digest
    }

    fn rehash(digest: [u8; 32]) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Blake256::digest(&digest));
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn it_hashes_blake256() {
        // empty-input vector from the BLAKE specification
        let w = Blake256Writer::default();
        assert_eq!(
            hex::encode(w.finish()),
            "716f6e863f744b9ac22c97ec7b76ea5f5908bc5b2f67c61510bfc4751384ea7a"
        );
    }
}
