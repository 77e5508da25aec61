use sha2::{Digest as Sha2Digest, Sha256};
use std::io::{Result as IOResult, Write};

use crate::hashes::DigestWriter;

/// A SHA-256 sink exposing a `Write` interface.
///
/// ```
/// # use std::io::{Result, Write};
/// use coldsign_core::hashes::{DigestWriter, Sha256Writer};
///
/// # fn main() -> Result<()> {
/// let mut w = Sha256Writer::default();
/// # let data = [0u8; 32];
///
/// // Writing more than once will update the hasher.
/// w.write(&data)?;
///
/// // Call finish to consume the hasher and produce the digest. Bitcoin's
/// // double-SHA-256 is `finish_tx_hash(true, ..)`.
/// let digest = w.finish();
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct Sha256Writer {
    internal: Sha256,
}

impl Write for Sha256Writer {
    fn write(&mut self, buf: &[u8]) -> IOResult<usize> {
        self.internal.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> IOResult<()> {
        Ok(())
    }
}

impl DigestWriter for Sha256Writer {
    fn finish(self) -> [u8; 32] {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&self.internal.finalize());
        digest
    }

    fn rehash(digest: [u8; 32]) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&Sha256::digest(digest));
        out
    }
}
