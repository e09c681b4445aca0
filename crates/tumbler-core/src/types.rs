//! Ceremony data model
//!
//! Status snapshots are owned by the remote service and fetched fresh on
//! every poll. The only locally authored values are the [`RekeyRequest`]
//! built by the leader and the [`RecoveryKeyRecord`]s written after
//! collection completes.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CeremonyError, Result};

/// Error payload the verification endpoint returns once a ceremony has
/// been torn down after completing.
pub const NO_REKEY_CONFIGURATION: &str = "no rekey configuration found";

/// Snapshot of the remote rekey ceremony
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyStatus {
    /// Token required on every share submission
    #[serde(default)]
    pub nonce: String,

    /// Whether a ceremony is running
    #[serde(default)]
    pub started: bool,

    /// New secret threshold
    #[serde(default, rename = "t")]
    pub threshold: u32,

    /// New number of secret shares
    #[serde(default, rename = "n")]
    pub shares: u32,

    /// Shares submitted so far
    #[serde(default)]
    pub progress: u32,

    /// Shares needed to complete collection
    #[serde(default)]
    pub required: u32,

    /// Fingerprints of the PGP keys the new shares are encrypted to
    #[serde(default, deserialize_with = "null_as_default")]
    pub pgp_fingerprints: Vec<String>,

    /// Encrypted new key shares (hex)
    #[serde(default, deserialize_with = "null_as_default")]
    pub keys: Vec<String>,

    /// Encrypted new key shares (base64)
    #[serde(default, deserialize_with = "null_as_default")]
    pub keys_base64: Vec<String>,

    /// Whether the ceremony requires a verification phase
    #[serde(default)]
    pub verification_required: bool,

    /// Non-empty once the verification phase has begun
    #[serde(default)]
    pub verification_nonce: String,

    /// Remote-reported errors, most relevant first
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<String>,
}

impl RekeyStatus {
    pub fn in_progress(&self) -> bool {
        self.started
    }

    /// Shares still missing before collection completes
    pub fn remaining_keys(&self) -> u32 {
        self.required.saturating_sub(self.progress)
    }

    pub fn verification_started(&self) -> bool {
        !self.verification_nonce.is_empty()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

/// Snapshot of the verification phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStatus {
    #[serde(default)]
    pub nonce: String,

    #[serde(default)]
    pub started: bool,

    /// Verification shares needed
    #[serde(default, rename = "t")]
    pub threshold: u32,

    /// Number of new shares issued
    #[serde(default, rename = "n")]
    pub new_shares: u32,

    #[serde(default)]
    pub progress: u32,

    /// Terminal: once set, stays set for the ceremony
    #[serde(default)]
    pub complete: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<String>,
}

impl VerificationStatus {
    /// Whether verification is still collecting shares.
    ///
    /// A completed phase is never in progress. After completion the remote
    /// tears the ceremony down and reports [`NO_REKEY_CONFIGURATION`],
    /// which also counts as finished; any other error means the phase is
    /// still alive.
    pub fn in_progress(&self) -> bool {
        if self.complete {
            return false;
        }
        match self.error_message() {
            Some(message) => message != NO_REKEY_CONFIGURATION,
            None => self.started,
        }
    }

    pub fn completed(&self) -> bool {
        self.complete
    }

    pub fn remaining_keys(&self) -> u32 {
        self.threshold.saturating_sub(self.progress)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

/// Leader-authored parameters for a new ceremony
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RekeyRequest {
    /// Total shares to generate
    pub secret_shares: u32,

    /// Shares required to reconstruct
    pub secret_threshold: u32,

    /// Participant identifiers, one per share, in share order
    pub keybase_users: Vec<String>,
}

impl RekeyRequest {
    /// Build a validated request
    pub fn new(secret_shares: u32, secret_threshold: u32, keybase_users: Vec<String>) -> Result<Self> {
        let request = Self {
            secret_shares,
            secret_threshold,
            keybase_users,
        };
        request.validate()?;
        Ok(request)
    }

    /// Check the share/user-count and threshold invariants
    pub fn validate(&self) -> Result<()> {
        if self.keybase_users.len() != self.secret_shares as usize {
            return Err(CeremonyError::InvalidRequest(format!(
                "number of keybase users ({}) must match secret shares ({})",
                self.keybase_users.len(),
                self.secret_shares
            )));
        }
        if self.secret_threshold == 0 || self.secret_threshold > self.secret_shares {
            return Err(CeremonyError::InvalidRequest(format!(
                "secret threshold must be between 1 and {}, got {}",
                self.secret_shares, self.secret_threshold
            )));
        }
        if self.keybase_users.iter().any(|u| u.is_empty()) {
            return Err(CeremonyError::InvalidRequest(
                "keybase user names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Split a comma-separated user list as typed by the operator
    pub fn parse_users(input: &str) -> Vec<String> {
        input.split(',').map(|u| u.trim().to_string()).collect()
    }
}

/// Request body for starting a ceremony, with public keys resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BeginRequest {
    pub secret_shares: u32,
    pub secret_threshold: u32,
    /// Public key for each participant, index-aligned with the users
    pub pgp_keys: Vec<String>,
    pub require_verification: bool,
}

/// Recovered key material for one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryKeyRecord {
    pub user: String,
    pub pgp_fingerprint: String,
    pub encrypted_key: String,
    pub encrypted_key_base64: String,
}

impl RecoveryKeyRecord {
    /// Zip the participant list with the key arrays of a completed status.
    ///
    /// Index `i` of every array refers to the same participant, so the
    /// lengths must agree exactly.
    pub fn zip(users: &[String], status: &RekeyStatus) -> Result<Vec<Self>> {
        let n = status.keys.len();
        if users.len() != n || status.pgp_fingerprints.len() != n || status.keys_base64.len() != n {
            return Err(CeremonyError::RecordMismatch(format!(
                "users={}, fingerprints={}, keys={}, keys_base64={}",
                users.len(),
                status.pgp_fingerprints.len(),
                n,
                status.keys_base64.len()
            )));
        }

        Ok(users
            .iter()
            .zip(&status.pgp_fingerprints)
            .zip(status.keys.iter().zip(&status.keys_base64))
            .map(|((user, fingerprint), (key, key_base64))| Self {
                user: user.clone(),
                pgp_fingerprint: fingerprint.clone(),
                encrypted_key: key.clone(),
                encrypted_key_base64: key_base64.clone(),
            })
            .collect())
    }
}

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
