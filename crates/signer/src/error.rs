//! Failure surface of the signing protocol.

use coldsign_core::ser::SerError;
use std::io::Error as IOError;
use thiserror::Error;

/// A fatal signing failure.
///
/// Every failure aborts the session: the engine unwinds without emitting
/// further stream bytes, and no partial signatures are ever handed to the
/// host. There is no local recovery; once the data diverges from what the
/// user confirmed, the only safe continuation is abort.
#[derive(Debug, Error)]
pub enum SignError {
    /// Malformed or inconsistent data received from the host.
    #[error("{0}")]
    Data(&'static str),

    /// An internal invariant was violated, e.g. the transaction changed
    /// between the confirmation and signing phases.
    #[error("{0}")]
    Process(&'static str),

    /// Outputs exceed inputs on a coin that does not allow negative fees.
    #[error("Not enough funds")]
    NotEnoughFunds,

    /// The user declined a confirmation, or a cancellable policy fired.
    #[error("{0}")]
    ActionCancelled(&'static str),

    /// A precondition that is reachable only through a bug.
    #[error("{0}")]
    Firmware(&'static str),

    /// Serialization failure.
    #[error(transparent)]
    Ser(#[from] SerError),

    /// IO failure bubbled up from a writer sink.
    #[error(transparent)]
    Io(#[from] IOError),
}

/// Type alias for signing results.
pub type SignResult<T> = Result<T, SignError>;
