//! Ceremony orchestration
//!
//! A ceremony is run either as the leader, who starts it and submits the
//! final share, or as a follower. Both tracks share the same remote
//! client, poller and submitter; only their phase sequencing differs.

pub mod follower;
pub mod leader;
pub mod waits;

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::CeremonyConfig;
use crate::error::{CeremonyError, Result};
use crate::operator::Operator;
use crate::poller::StatusPoller;
use crate::recorder::RecoveryKeyRecorder;
use crate::remote::{PublicKeyResolver, RemoteCeremonyClient};
use crate::submitter::{KeyShareSubmitter, OnInvalidated};
use crate::types::{BeginRequest, RekeyRequest, RekeyStatus};

pub use follower::{FollowerPhase, FollowerTrack};
pub use leader::{LeaderPhase, LeaderTrack};

/// Which side of the ceremony this process plays
pub enum CeremonyRole<'a> {
    /// Starts the ceremony; needs the public key directory
    Leader { resolver: &'a dyn PublicKeyResolver },
    Follower,
}

/// How a ceremony ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CeremonyOutcome {
    Leader { record: PathBuf, verified: bool },
    Follower { verified: bool },
}

/// Shared context for one ceremony run
pub struct Ceremony<'a> {
    pub(crate) client: &'a dyn RemoteCeremonyClient,
    pub(crate) operator: &'a dyn Operator,
    pub(crate) recorder: RecoveryKeyRecorder,
    config: CeremonyConfig,
    cancel: CancellationToken,
}

impl<'a> Ceremony<'a> {
    pub fn new(
        client: &'a dyn RemoteCeremonyClient,
        operator: &'a dyn Operator,
        config: CeremonyConfig,
    ) -> Self {
        Self {
            client,
            operator,
            recorder: RecoveryKeyRecorder::new(config.output_dir.clone()),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort waits and submissions when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &CeremonyConfig {
        &self.config
    }

    /// Run the track for `role`
    pub async fn run(&self, role: CeremonyRole<'_>) -> Result<CeremonyOutcome> {
        match role {
            CeremonyRole::Leader { resolver } => {
                info!("Running leader ceremony against {}", self.client.address());
                LeaderTrack::new(self, resolver).run().await
            }
            CeremonyRole::Follower => {
                info!("Running follower ceremony against {}", self.client.address());
                FollowerTrack::new(self).run().await
            }
        }
    }

    /// Ask the operator for the new share layout until it validates
    pub async fn prompt_rekey_request(&self) -> Result<RekeyRequest> {
        let operator = self.operator;
        loop {
            let shares = operator.prompt_integer("Number of secret shares").await?;
            let threshold = operator.prompt_integer("Secret threshold").await?;
            if threshold == 0 || threshold > shares {
                operator.say("Secret threshold must be between 1 and the number of secret shares. Please try again.");
                continue;
            }

            loop {
                let users = RekeyRequest::parse_users(&operator.prompt_text("Keybase users").await?);
                match RekeyRequest::new(shares, threshold, users) {
                    Ok(request) => return Ok(request),
                    Err(e) => {
                        debug!("Rejected rekey request: {}", e);
                        operator.say(&format!("{}. Please try again.", e));
                    }
                }
            }
        }
    }

    /// Resolve public keys and start the remote ceremony.
    ///
    /// The request is validated before any remote call is made.
    pub async fn begin_ceremony(
        &self,
        resolver: &dyn PublicKeyResolver,
        request: &RekeyRequest,
    ) -> Result<RekeyStatus> {
        request.validate()?;

        let keys = resolver.resolve_public_keys(&request.keybase_users).await?;
        let pgp_keys = request
            .keybase_users
            .iter()
            .map(|user| {
                keys.get(user)
                    .cloned()
                    .ok_or_else(|| CeremonyError::KeyLookup(format!("no public key found for {}", user)))
            })
            .collect::<Result<Vec<_>>>()?;

        let body = BeginRequest {
            secret_shares: request.secret_shares,
            secret_threshold: request.secret_threshold,
            pgp_keys,
            require_verification: self.config.require_verification,
        };
        let status = self.client.begin_ceremony(&body).await?;
        info!(
            "Rekey started: {} of {} shares, {} required",
            request.secret_threshold, request.secret_shares, status.required
        );
        Ok(status)
    }

    pub(crate) fn poller(&self) -> StatusPoller<'_> {
        StatusPoller::new(self.operator, self.config.poll_schedule(), self.cancel.clone())
    }

    pub(crate) fn submitter(&self, policy: OnInvalidated) -> KeyShareSubmitter<'_> {
        KeyShareSubmitter::new(self.client, self.operator, self.cancel.clone())
            .with_max_attempts(self.config.max_submit_attempts)
            .with_invalidation_policy(policy)
    }
}

/// Run the leader track against `client`
pub async fn run_leader_ceremony(
    client: &dyn RemoteCeremonyClient,
    resolver: &dyn PublicKeyResolver,
    operator: &dyn Operator,
    config: CeremonyConfig,
    cancel: CancellationToken,
) -> Result<CeremonyOutcome> {
    Ceremony::new(client, operator, config)
        .with_cancellation(cancel)
        .run(CeremonyRole::Leader { resolver })
        .await
}

/// Run the follower track against `client`
pub async fn run_follower_ceremony(
    client: &dyn RemoteCeremonyClient,
    operator: &dyn Operator,
    config: CeremonyConfig,
    cancel: CancellationToken,
) -> Result<CeremonyOutcome> {
    Ceremony::new(client, operator, config)
        .with_cancellation(cancel)
        .run(CeremonyRole::Follower)
        .await
}
