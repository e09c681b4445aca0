//! Follower track: contribute a share, then verify a new one

use std::fmt;

use tracing::info;

use super::waits::{CollectionComplete, RekeyStarted, VerificationFinished};
use super::{Ceremony, CeremonyOutcome};
use crate::error::{CeremonyError, Result};
use crate::submitter::{OnInvalidated, RekeyRound, Submission, VerificationRound};

/// Follower progress through the ceremony
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerPhase {
    Idle,
    WaitingForStart,
    SubmittedShare,
    WaitingForCompletion,
    WaitingForVerificationStart,
    SubmittedVerification,
    Done,
}

impl fmt::Display for FollowerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FollowerPhase::Idle => "idle",
            FollowerPhase::WaitingForStart => "waiting for start",
            FollowerPhase::SubmittedShare => "submitted share",
            FollowerPhase::WaitingForCompletion => "waiting for completion",
            FollowerPhase::WaitingForVerificationStart => "waiting for verification start",
            FollowerPhase::SubmittedVerification => "submitted verification",
            FollowerPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Follower state machine over one ceremony
pub struct FollowerTrack<'c, 'a> {
    ceremony: &'c Ceremony<'a>,
    phase: FollowerPhase,
}

impl<'c, 'a> FollowerTrack<'c, 'a> {
    pub fn new(ceremony: &'c Ceremony<'a>) -> Self {
        Self {
            ceremony,
            phase: FollowerPhase::Idle,
        }
    }

    pub fn phase(&self) -> FollowerPhase {
        self.phase
    }

    fn advance(&mut self, next: FollowerPhase) {
        info!("Follower phase: {} -> {}", self.phase, next);
        self.phase = next;
    }

    /// Drive the ceremony to completion.
    ///
    /// Followers retry every failed submission, including ones the service
    /// reports as ceremony-level; the leader is the one that acts on those.
    pub async fn run(&mut self) -> Result<CeremonyOutcome> {
        let ceremony = self.ceremony;
        let client = ceremony.client;
        let operator = ceremony.operator;

        let current = ceremony
            .poller()
            .fetch_current(|| client.fetch_ceremony_status())
            .await?;
        if current.in_progress() {
            operator.say("A rekey operation is in-progress. Please enter your key share.");
        } else {
            self.advance(FollowerPhase::WaitingForStart);
            ceremony
                .poller()
                .wait_until(|| client.fetch_ceremony_status(), &mut RekeyStarted)
                .await?;
        }

        let submitted = match ceremony
            .submitter(OnInvalidated::Retry)
            .submit(&RekeyRound)
            .await?
        {
            Submission::Accepted(status) => status,
            Submission::Closed => {
                return Err(CeremonyError::CeremonyInvalidated(
                    "the ceremony closed before our share was accepted".to_string(),
                ))
            }
        };
        self.advance(FollowerPhase::SubmittedShare);
        operator.say("Key submitted successfully. Waiting for other participants to submit their keys.");

        self.advance(FollowerPhase::WaitingForCompletion);
        let mut collection = CollectionComplete::after_submission(&submitted);
        let status = ceremony
            .poller()
            .wait_until(|| client.fetch_ceremony_status(), &mut collection)
            .await?;

        if !status.verification_started() {
            if !collection.verification_required() {
                self.advance(FollowerPhase::Done);
                return Ok(CeremonyOutcome::Follower { verified: false });
            }

            // verification may have opened and finished between two polls
            let verification = ceremony
                .poller()
                .fetch_current(|| client.fetch_verification_status())
                .await?;
            let finished = verification.completed()
                || (collection.final_share_outstanding() && !verification.in_progress());
            if !finished {
                return Err(CeremonyError::CeremonyInvalidated(
                    "the ceremony closed before verification began".to_string(),
                ));
            }
            info!("Verification finished before the follower's share was needed");
            operator.say("🙌 All shares verified.");
            self.advance(FollowerPhase::Done);
            return Ok(CeremonyOutcome::Follower { verified: true });
        }

        self.advance(FollowerPhase::WaitingForVerificationStart);
        operator.say("Verification has begun. Please enter your new key share to verify.");
        let verification = ceremony
            .submitter(OnInvalidated::Retry)
            .submit(&VerificationRound)
            .await?;
        if matches!(verification, Submission::Closed) {
            info!("Verification finished while the follower's share was being entered");
            operator.say("🙌 All shares verified.");
            self.advance(FollowerPhase::Done);
            return Ok(CeremonyOutcome::Follower { verified: true });
        }
        self.advance(FollowerPhase::SubmittedVerification);
        operator.say("Key verification submitted successfully. Waiting for other participants to submit their keys.");

        ceremony
            .poller()
            .wait_until(|| client.fetch_verification_status(), &mut VerificationFinished)
            .await?;
        self.advance(FollowerPhase::Done);
        Ok(CeremonyOutcome::Follower { verified: true })
    }
}
