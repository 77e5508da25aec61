//! Chain-agnostic byte serialization and digest plumbing for the coldsign
//! transaction signer.
//!
//! Everything the signer streams — transaction fragments, check digests,
//! sighash preimages — goes through the writer primitives in [`ser`] and the
//! hash sinks in [`hashes`], so any serializer writes equivalently into an
//! output buffer or a rolling digest.
#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod macros;

pub mod hashes;
pub mod ser;

pub use hashes::*;
pub use ser::*;
