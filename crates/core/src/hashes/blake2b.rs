use blake2b_simd::{Params, State};
use std::io::{Result as IOResult, Write};

use crate::hashes::DigestWriter;

/// A BLAKE2b-256 sink exposing a `Write` interface, with an optional 16-byte
/// personalization.
///
/// The Zcash signature-hash algorithms domain-separate every stream with a
/// distinct personalization string, so most users will want
/// [`Blake2b256Writer::personalized`].
#[derive(Clone)]
pub struct Blake2b256Writer {
    internal: State,
}

impl Blake2b256Writer {
    /// Instantiate a sink with the given personalization.
    pub fn personalized(personal: &[u8; 16]) -> Self {
        Self {
            internal: Params::new()
                .hash_length(32)
                .personal(personal)
                .to_state(),
        }
    }
}

impl Default for Blake2b256Writer {
    fn default() -> Blake2b256Writer {
        Blake2b256Writer {
            internal: Params::new().hash_length(32).to_state(),
        }
    }
}

impl Write for Blake2b256Writer {
    fn write(&mut self, buf: &[u8]) -> IOResult<usize> {
        self.internal.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> IOResult<()> {
        Ok(())
    }
}

impl DigestWriter for Blake2b256Writer {
    fn finish(self) -> [u8; 32] {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(self.internal.finalize().as_bytes());
        digest
    }

    fn rehash(digest: [u8; 32]) -> [u8; 32] {
        let mut state = Params::new().hash_length(32).to_state();
        state.update(&digest);
        let mut out = [0u8; 32];
        out.copy_from_slice(state.finalize().as_bytes());
        out
    }
}
