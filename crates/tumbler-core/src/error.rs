//! Error types for rekey ceremonies

use thiserror::Error;

/// Result type alias for ceremony operations
pub type Result<T> = std::result::Result<T, CeremonyError>;

/// Result type alias for a single remote call
pub type RemoteResult<T> = std::result::Result<T, RemoteFailure>;

/// Outcome of a failed call against the remote ceremony service.
///
/// Only `Invalidated` is fatal to a ceremony. The other two are retried by
/// the poller and the share submitter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteFailure {
    /// The request never produced a usable response (network, decode)
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered but refused this particular request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The service reported that the ceremony as a whole is unusable
    #[error("ceremony invalidated: {0}")]
    Invalidated(String),
}

impl RemoteFailure {
    /// Whether the failure ends the ceremony rather than the attempt
    pub fn is_fatal(&self) -> bool {
        matches!(self, RemoteFailure::Invalidated(_))
    }
}

/// Errors that terminate a ceremony
#[derive(Debug, Error)]
pub enum CeremonyError {
    /// A rekey was already running when the leader tried to start one
    #[error("a rekey operation is already in progress, please cancel it before starting a new one")]
    CeremonyConflict,

    /// Submitted shares invalidated the ceremony; a fresh one is required
    #[error("the rekey ceremony was invalidated by the remote service ({0}); cancel it and start a new ceremony")]
    CeremonyInvalidated(String),

    /// Rekey request violates its own invariants
    #[error("invalid rekey request: {0}")]
    InvalidRequest(String),

    /// Collection finished but no reconstructed keys came back
    #[error("no keys returned from the remote service")]
    NoKeysReturned,

    /// Recovered key arrays do not line up by participant
    #[error("recovered key arrays are misaligned: {0}")]
    RecordMismatch(String),

    /// Recovered keys could not be written to disk
    #[error("failed to save recovery keys to {path}: {source}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Final verification check failed
    #[error("verification failed: {0}")]
    VerificationFailed(String),

    /// Public key lookup for the participants failed
    #[error("public key lookup failed: {0}")]
    KeyLookup(String),

    /// A remote call that is not retried failed
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteFailure),

    /// Share submission gave up after the configured attempt limit
    #[error("gave up after {0} submission attempts")]
    RetriesExhausted(u32),

    /// Operator input stream ended
    #[error("operator input closed")]
    InputClosed,

    /// The ceremony was cancelled by the operator
    #[error("ceremony cancelled")]
    Cancelled,

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for CeremonyError {
    fn from(e: serde_json::Error) -> Self {
        CeremonyError::Config(e.to_string())
    }
}
