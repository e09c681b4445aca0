//! Key share submission with operator retry
//!
//! Each attempt reads a share from the operator, refetches the ceremony
//! status for the current nonce and submits. Transient failures are shown
//! to the operator and the share is asked for again; a ceremony-level
//! invalidation either ends the loop or is retried, depending on the
//! caller's [`OnInvalidated`] policy. A round that other participants
//! finished while the operator was typing ends as [`Submission::Closed`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{CeremonyError, RemoteFailure, RemoteResult, Result};
use crate::operator::Operator;
use crate::remote::RemoteCeremonyClient;
use crate::types::{RekeyStatus, VerificationStatus};

/// One kind of share collected by the ceremony
#[async_trait]
pub trait ShareRound: Send + Sync {
    type Status: Send;

    /// Prompt shown to the operator
    fn label(&self) -> &'static str;

    /// Nonce to submit with, taken from a fresh rekey status
    fn nonce<'s>(&self, status: &'s RekeyStatus) -> Option<&'s str>;

    async fn submit(
        &self,
        client: &dyn RemoteCeremonyClient,
        share: &str,
        nonce: &str,
    ) -> RemoteResult<Self::Status>;

    /// Error payload carried by an otherwise successful response
    fn payload_error(&self, status: &Self::Status) -> Option<String>;

    /// Whether the round finished without this share. Only asked when
    /// `current` carries no nonce for the round.
    async fn closed(
        &self,
        _client: &dyn RemoteCeremonyClient,
        _current: &RekeyStatus,
    ) -> RemoteResult<bool> {
        Ok(false)
    }
}

/// Share of the current root secret, collected to start the rekey
pub struct RekeyRound;

#[async_trait]
impl ShareRound for RekeyRound {
    type Status = RekeyStatus;

    fn label(&self) -> &'static str {
        "Key share"
    }

    fn nonce<'s>(&self, status: &'s RekeyStatus) -> Option<&'s str> {
        Some(status.nonce.as_str()).filter(|n| !n.is_empty())
    }

    async fn submit(
        &self,
        client: &dyn RemoteCeremonyClient,
        share: &str,
        nonce: &str,
    ) -> RemoteResult<RekeyStatus> {
        client.submit_share(share, nonce).await
    }

    fn payload_error(&self, status: &RekeyStatus) -> Option<String> {
        status.error_message().map(str::to_string)
    }
}

/// Newly issued share, collected to prove the new shares work
pub struct VerificationRound;

#[async_trait]
impl ShareRound for VerificationRound {
    type Status = VerificationStatus;

    fn label(&self) -> &'static str {
        "New key share"
    }

    fn nonce<'s>(&self, status: &'s RekeyStatus) -> Option<&'s str> {
        Some(status.verification_nonce.as_str()).filter(|n| !n.is_empty())
    }

    async fn submit(
        &self,
        client: &dyn RemoteCeremonyClient,
        share: &str,
        nonce: &str,
    ) -> RemoteResult<VerificationStatus> {
        client.submit_verification_share(share, nonce).await
    }

    fn payload_error(&self, status: &VerificationStatus) -> Option<String> {
        status.error_message().map(str::to_string)
    }

    /// The service tears the ceremony down once the threshold of new
    /// shares has verified
    async fn closed(
        &self,
        client: &dyn RemoteCeremonyClient,
        current: &RekeyStatus,
    ) -> RemoteResult<bool> {
        if current.in_progress() {
            return Ok(false);
        }
        let verification = client.fetch_verification_status().await?;
        Ok(verification.completed() || !verification.in_progress())
    }
}

/// How a submission loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission<S> {
    /// The share was accepted; carries the service's answer
    Accepted(S),
    /// The round finished without needing this share
    Closed,
}

impl<S> Submission<S> {
    pub fn accepted(self) -> Option<S> {
        match self {
            Submission::Accepted(status) => Some(status),
            Submission::Closed => None,
        }
    }
}

enum Attempt<S> {
    Done(S),
    Closed,
}

/// What to do when the service reports the ceremony invalidated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnInvalidated {
    /// Stop and surface [`CeremonyError::CeremonyInvalidated`]
    Abort,
    /// Treat it like any other failed attempt
    Retry,
}

/// Collects one share from the operator and submits it
pub struct KeyShareSubmitter<'a> {
    client: &'a dyn RemoteCeremonyClient,
    operator: &'a dyn Operator,
    cancel: CancellationToken,
    max_attempts: Option<u32>,
    on_invalidated: OnInvalidated,
    retry_payload_errors: bool,
}

impl<'a> KeyShareSubmitter<'a> {
    pub fn new(
        client: &'a dyn RemoteCeremonyClient,
        operator: &'a dyn Operator,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            operator,
            cancel,
            max_attempts: None,
            on_invalidated: OnInvalidated::Abort,
            retry_payload_errors: true,
        }
    }

    /// Bound the number of attempts (unbounded by default)
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_invalidation_policy(mut self, policy: OnInvalidated) -> Self {
        self.on_invalidated = policy;
        self
    }

    /// Hand back a response carrying an error payload instead of asking
    /// for the share again
    pub fn returning_payload_errors(mut self) -> Self {
        self.retry_payload_errors = false;
        self
    }

    /// Run the prompt/submit loop until a share is accepted or the round
    /// closes
    pub async fn submit<R: ShareRound>(&self, round: &R) -> Result<Submission<R::Status>> {
        let mut attempts: u32 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(CeremonyError::Cancelled);
            }
            if let Some(max) = self.max_attempts {
                if attempts >= max {
                    return Err(CeremonyError::RetriesExhausted(attempts));
                }
            }

            let share = self.operator.prompt_secret(round.label()).await?;
            attempts += 1;
            debug!("Submitting {} (attempt {})", round.label(), attempts);

            match self.attempt(round, &share).await {
                Ok(Attempt::Done(status)) => {
                    info!("{} accepted after {} attempt(s)", round.label(), attempts);
                    return Ok(Submission::Accepted(status));
                }
                Ok(Attempt::Closed) => {
                    info!("{} no longer needed, the round has finished", round.label());
                    return Ok(Submission::Closed);
                }
                Err(RemoteFailure::Invalidated(message))
                    if self.on_invalidated == OnInvalidated::Abort =>
                {
                    warn!("Ceremony invalidated: {}", message);
                    return Err(CeremonyError::CeremonyInvalidated(message));
                }
                Err(failure) => {
                    warn!("{} attempt {} failed: {}", round.label(), attempts, failure);
                    self.operator
                        .say(&format!("Failed to submit key share: {}. Please try again.", failure));
                }
            }
        }
    }

    async fn attempt<R: ShareRound>(
        &self,
        round: &R,
        share: &str,
    ) -> RemoteResult<Attempt<R::Status>> {
        let current = self.client.fetch_ceremony_status().await?;
        if let Some(message) = current.error_message() {
            return Err(RemoteFailure::Rejected(format!("failed to get rekey status: {}", message)));
        }
        let Some(nonce) = round.nonce(&current) else {
            if round.closed(self.client, &current).await? {
                return Ok(Attempt::Closed);
            }
            return Err(RemoteFailure::Rejected(
                "the ceremony is not accepting shares yet".to_string(),
            ));
        };

        let status = round.submit(self.client, share, nonce).await?;
        match round.payload_error(&status) {
            Some(message) if self.retry_payload_errors => Err(RemoteFailure::Rejected(message)),
            _ => Ok(Attempt::Done(status)),
        }
    }
}
