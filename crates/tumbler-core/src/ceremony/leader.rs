//! Leader track: start the ceremony, submit the final share, record the
//! recovered keys and close out verification

use std::fmt;
use std::path::PathBuf;

use tracing::info;

use super::waits::{OthersSubmitted, OthersVerified, VerificationFinished};
use super::{Ceremony, CeremonyOutcome};
use crate::error::{CeremonyError, Result};
use crate::remote::PublicKeyResolver;
use crate::submitter::{OnInvalidated, RekeyRound, Submission, VerificationRound};
use crate::types::{RecoveryKeyRecord, RekeyRequest};

/// Leader progress through the ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderPhase {
    Idle,
    Started,
    CollectingShares,
    SharesComplete,
    Recorded,
    VerificationPending,
    VerificationCollecting,
    VerificationComplete,
}

impl fmt::Display for LeaderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LeaderPhase::Idle => "idle",
            LeaderPhase::Started => "started",
            LeaderPhase::CollectingShares => "collecting shares",
            LeaderPhase::SharesComplete => "shares complete",
            LeaderPhase::Recorded => "recorded",
            LeaderPhase::VerificationPending => "verification pending",
            LeaderPhase::VerificationCollecting => "verification collecting",
            LeaderPhase::VerificationComplete => "verification complete",
        };
        f.write_str(name)
    }
}

/// Leader state machine over one ceremony
pub struct LeaderTrack<'c, 'a> {
    ceremony: &'c Ceremony<'a>,
    resolver: &'c dyn PublicKeyResolver,
    phase: LeaderPhase,
}

impl<'c, 'a> LeaderTrack<'c, 'a> {
    pub fn new(ceremony: &'c Ceremony<'a>, resolver: &'c dyn PublicKeyResolver) -> Self {
        Self {
            ceremony,
            resolver,
            phase: LeaderPhase::Idle,
        }
    }

    pub fn phase(&self) -> LeaderPhase {
        self.phase
    }

    fn advance(&mut self, next: LeaderPhase) {
        info!("Leader phase: {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Drive the ceremony to completion
    pub async fn run(&mut self) -> Result<CeremonyOutcome> {
        let request = self.start().await?;
        let record = self.collect_and_record(&request).await?;

        if self.phase == LeaderPhase::VerificationComplete {
            return Ok(CeremonyOutcome::Leader {
                record,
                verified: false,
            });
        }

        self.verify().await?;
        Ok(CeremonyOutcome::Leader {
            record,
            verified: true,
        })
    }

    /// `Idle -> Started -> CollectingShares`
    async fn start(&mut self) -> Result<RekeyRequest> {
        let ceremony = self.ceremony;
        let client = ceremony.client;
        let operator = ceremony.operator;

        let current = ceremony
            .poller()
            .fetch_current(|| client.fetch_ceremony_status())
            .await?;
        if current.in_progress() {
            return Err(CeremonyError::CeremonyConflict);
        }
        self.advance(LeaderPhase::Started);
        operator.say("Starting a new rekey operation.");

        let request = ceremony.prompt_rekey_request().await?;
        let status = ceremony.begin_ceremony(self.resolver, &request).await?;
        operator.say(&format!(
            "Rekey operation started. {} key shares must be provided.",
            status.required
        ));
        self.advance(LeaderPhase::CollectingShares);

        Ok(request)
    }

    /// `CollectingShares -> SharesComplete -> Recorded`
    async fn collect_and_record(&mut self, request: &RekeyRequest) -> Result<PathBuf> {
        let ceremony = self.ceremony;
        let client = ceremony.client;

        ceremony
            .poller()
            .wait_until(
                || client.fetch_ceremony_status(),
                &mut OthersSubmitted::default(),
            )
            .await?;

        let status = match ceremony
            .submitter(OnInvalidated::Abort)
            .submit(&RekeyRound)
            .await?
        {
            Submission::Accepted(status) => status,
            Submission::Closed => return Err(CeremonyError::NoKeysReturned),
        };
        if status.keys.is_empty() {
            return Err(CeremonyError::NoKeysReturned);
        }
        self.advance(LeaderPhase::SharesComplete);

        let records = RecoveryKeyRecord::zip(&request.keybase_users, &status)?;
        let path = ceremony.recorder.record(client.address(), &records)?;
        ceremony
            .operator
            .say(&format!("✍️  New recovery keys saved to: {}", path.display()));
        self.advance(LeaderPhase::Recorded);

        if !status.verification_required && !status.verification_started() {
            ceremony
                .operator
                .say("The service did not start a verification phase.");
            self.advance(LeaderPhase::VerificationComplete);
        }
        Ok(path)
    }

    /// `Recorded -> VerificationPending -> VerificationCollecting -> VerificationComplete`
    async fn verify(&mut self) -> Result<()> {
        let ceremony = self.ceremony;
        let client = ceremony.client;
        let operator = ceremony.operator;

        self.advance(LeaderPhase::VerificationPending);
        operator.say("Verification has begun. Waiting for other participants to verify their new key shares.");

        let mut others = OthersVerified::default();
        let status = ceremony
            .poller()
            .wait_until(|| client.fetch_verification_status(), &mut others)
            .await?;
        if others.finished(&status) {
            info!("Verification finished before the leader's share was needed");
            self.advance(LeaderPhase::VerificationComplete);
            return Ok(());
        }
        self.advance(LeaderPhase::VerificationCollecting);

        let submission = ceremony
            .submitter(OnInvalidated::Abort)
            .returning_payload_errors()
            .submit(&VerificationRound)
            .await?;
        let status = match submission {
            Submission::Accepted(status) => status,
            Submission::Closed => {
                info!("Verification finished while the leader's share was being entered");
                operator.say("🙌 All shares verified.");
                self.advance(LeaderPhase::VerificationComplete);
                return Ok(());
            }
        };
        if let Some(message) = status.error_message() {
            return Err(CeremonyError::VerificationFailed(message.to_string()));
        }
        if !status.completed() {
            return Err(CeremonyError::VerificationFailed(format!(
                "verification incomplete after final share ({}/{} verified)",
                status.progress, status.threshold
            )));
        }
        operator.say("Key verification submitted successfully.");

        ceremony
            .poller()
            .wait_until(|| client.fetch_verification_status(), &mut VerificationFinished)
            .await?;
        self.advance(LeaderPhase::VerificationComplete);
        Ok(())
    }
}
