//! Interfaces to the external services a ceremony depends on

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{RemoteResult, Result};
use crate::types::{BeginRequest, RekeyStatus, VerificationStatus};

/// Secret-management service hosting the ceremony state.
///
/// Implementations own the wire format and are the only place where
/// service responses are classified into [`crate::RemoteFailure`] variants.
#[async_trait]
pub trait RemoteCeremonyClient: Send + Sync {
    /// Base address of the service, recorded alongside recovered keys
    fn address(&self) -> &str;

    async fn fetch_ceremony_status(&self) -> RemoteResult<RekeyStatus>;

    async fn begin_ceremony(&self, request: &BeginRequest) -> RemoteResult<RekeyStatus>;

    async fn submit_share(&self, share: &str, nonce: &str) -> RemoteResult<RekeyStatus>;

    async fn fetch_verification_status(&self) -> RemoteResult<VerificationStatus>;

    async fn submit_verification_share(
        &self,
        share: &str,
        nonce: &str,
    ) -> RemoteResult<VerificationStatus>;
}

/// Directory mapping participant identifiers to public key material
#[async_trait]
pub trait PublicKeyResolver: Send + Sync {
    /// Resolve every identifier; the map is keyed by the identifiers given
    async fn resolve_public_keys(&self, users: &[String]) -> Result<HashMap<String, String>>;
}
