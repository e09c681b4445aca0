//! Vault `sys/rekey-recovery-key` client
//!
//! Every call returns a [`RemoteResult`]; this module is the one place
//! where Vault's answers are sorted into transport problems, rejected
//! requests and ceremony-ending failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use tumbler_core::{
    BeginRequest, RekeyStatus, RemoteCeremonyClient, RemoteFailure, RemoteResult,
    VerificationStatus,
};

use crate::error::{Result, VaultError};

pub const REKEY_INIT_PATH: &str = "/v1/sys/rekey-recovery-key/init";
pub const REKEY_UPDATE_PATH: &str = "/v1/sys/rekey-recovery-key/update";
pub const REKEY_VERIFY_PATH: &str = "/v1/sys/rekey-recovery-key/verify";

/// Vault error messages after which the running rekey can never complete.
/// Matched case-insensitively as substrings.
const INVALIDATION_MARKERS: &[&str] = &[
    "recovery key verification failed",
    "failed to compute recovery key",
    "failed to recover master key",
    "failed to recover root key",
];

#[derive(Serialize)]
struct ShareSubmission<'a> {
    key: &'a str,
    nonce: &'a str,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Option<Vec<String>>,
}

/// HTTP client for one Vault server
#[derive(Clone)]
pub struct VaultClient {
    address: String,
    http: reqwest::Client,
}

impl VaultClient {
    /// Create a client for `address` (scheme, host and port, no path)
    pub fn new(address: impl Into<String>, timeout: Duration) -> Result<Self> {
        let address = address.into().trim().trim_end_matches('/').to_string();
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(VaultError::InvalidAddress(format!(
                "{} (expected http:// or https://)",
                address
            )));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { address, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Cancel the running rekey, discarding all submitted shares
    pub async fn cancel_ceremony(&self) -> RemoteResult<()> {
        let context = "failed to cancel rekey";
        let url = self.url(REKEY_INIT_PATH);
        debug!("DELETE {}", url);

        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| RemoteFailure::Transport(format!("{}: {}", context, e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(classify(context, status, &error_message(&body, status)))
    }

    /// Send `request` and decode the body as `T`.
    ///
    /// With `tolerate_errors`, a non-success answer whose body still decodes
    /// as `T` is returned as-is so the caller can inspect its `errors`.
    async fn exchange<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
        tolerate_errors: bool,
    ) -> RemoteResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteFailure::Transport(format!("{}: {}", context, e)))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteFailure::Transport(format!("{}: {}", context, e)))?;

        let decoded = serde_json::from_slice::<T>(&body);
        if status.is_success() {
            return decoded.map_err(|e| {
                RemoteFailure::Transport(format!("{}: failed to decode response: {}", context, e))
            });
        }
        if tolerate_errors {
            if let Ok(value) = decoded {
                debug!("{} answered {}, using its body", context, status);
                return Ok(value);
            }
        }
        Err(classify(context, status, &error_message(&body, status)))
    }
}

/// First message from a Vault error body, or the HTTP status when there is none
fn error_message(body: &[u8], status: StatusCode) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.errors)
        .and_then(|errors| errors.into_iter().find(|e| !e.is_empty()))
        .unwrap_or_else(|| format!("unexpected status code: {}", status))
}

/// Sort a failed answer into the three failure kinds
pub fn classify(context: &str, status: StatusCode, message: &str) -> RemoteFailure {
    let lowered = message.to_lowercase();
    if INVALIDATION_MARKERS.iter().any(|m| lowered.contains(m)) {
        warn!("Vault reported an unrecoverable ceremony failure: {}", message);
        return RemoteFailure::Invalidated(message.to_string());
    }

    let message = format!("{}: {}", context, message);
    if status.is_server_error() {
        RemoteFailure::Transport(message)
    } else {
        RemoteFailure::Rejected(message)
    }
}

#[async_trait]
impl RemoteCeremonyClient for VaultClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn fetch_ceremony_status(&self) -> RemoteResult<RekeyStatus> {
        let url = self.url(REKEY_INIT_PATH);
        debug!("GET {}", url);
        self.exchange(self.http.get(&url), "failed to get rekey status", false)
            .await
    }

    async fn begin_ceremony(&self, request: &BeginRequest) -> RemoteResult<RekeyStatus> {
        let url = self.url(REKEY_INIT_PATH);
        debug!(
            "POST {} ({} shares, threshold {})",
            url, request.secret_shares, request.secret_threshold
        );
        self.exchange(self.http.post(&url).json(request), "failed to start rekey", false)
            .await
    }

    async fn submit_share(&self, share: &str, nonce: &str) -> RemoteResult<RekeyStatus> {
        let url = self.url(REKEY_UPDATE_PATH);
        debug!("POST {}", url);
        let body = ShareSubmission { key: share, nonce };
        self.exchange(self.http.post(&url).json(&body), "failed to submit key", false)
            .await
    }

    async fn fetch_verification_status(&self) -> RemoteResult<VerificationStatus> {
        let url = self.url(REKEY_VERIFY_PATH);
        debug!("GET {}", url);
        // Vault answers 400 once the ceremony is torn down; the body says so
        self.exchange(
            self.http.get(&url),
            "failed to get verification status",
            true,
        )
        .await
    }

    async fn submit_verification_share(
        &self,
        share: &str,
        nonce: &str,
    ) -> RemoteResult<VerificationStatus> {
        let url = self.url(REKEY_VERIFY_PATH);
        debug!("POST {}", url);
        let body = ShareSubmission { key: share, nonce };
        self.exchange(
            self.http.post(&url).json(&body),
            "failed to submit verification key",
            false,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_normalized() {
        let client = VaultClient::new("https://vault.example:8200/ ", Duration::from_secs(1)).unwrap();
        assert_eq!(client.address(), "https://vault.example:8200");
        assert_eq!(
            client.url(REKEY_INIT_PATH),
            "https://vault.example:8200/v1/sys/rekey-recovery-key/init"
        );
    }

    #[test]
    fn test_address_requires_scheme() {
        let result = VaultClient::new("vault.example:8200", Duration::from_secs(1));
        assert!(matches!(result, Err(VaultError::InvalidAddress(_))));
    }

    #[test]
    fn test_classify_invalidation_markers() {
        let failure = classify(
            "failed to submit key",
            StatusCode::BAD_REQUEST,
            "Recovery key verification failed: invalid key",
        );
        assert!(failure.is_fatal());

        let failure = classify(
            "failed to submit key",
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to recover root key: cipher: message authentication failed",
        );
        assert!(matches!(failure, RemoteFailure::Invalidated(_)));
    }

    #[test]
    fn test_classify_ordinary_failures() {
        let failure = classify(
            "failed to submit key",
            StatusCode::BAD_REQUEST,
            "provided nonce does not match the current nonce",
        );
        assert_eq!(
            failure,
            RemoteFailure::Rejected(
                "failed to submit key: provided nonce does not match the current nonce".into()
            )
        );

        let failure = classify("failed to get rekey status", StatusCode::BAD_GATEWAY, "upstream");
        assert!(matches!(failure, RemoteFailure::Transport(_)));
    }

    #[test]
    fn test_error_message_fallback() {
        let message = error_message(b"not json", StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(message, "unexpected status code: 503 Service Unavailable");

        let message = error_message(br#"{"errors":["", "sealed"]}"#, StatusCode::BAD_REQUEST);
        assert_eq!(message, "sealed");

        let message = error_message(br#"{"errors":null}"#, StatusCode::BAD_REQUEST);
        assert_eq!(message, "unexpected status code: 400 Bad Request");
    }
}
