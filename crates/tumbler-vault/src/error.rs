//! Error types for the HTTP adapters

use thiserror::Error;

/// Result type alias for adapter construction and key lookup
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors raised outside the per-call [`tumbler_core::RemoteFailure`] path
#[derive(Debug, Error)]
pub enum VaultError {
    /// Service address is not an absolute http(s) URL
    #[error("Invalid service address: {0}")]
    InvalidAddress(String),

    /// HTTP client could not be built or a request failed outright
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Keybase answered but could not provide a key
    #[error("Keybase error: {0}")]
    Keybase(String),

    /// Armored public key could not be decoded
    #[error("Invalid armored key: {0}")]
    Armor(String),
}
