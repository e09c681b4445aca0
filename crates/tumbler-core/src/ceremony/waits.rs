//! Wait conditions for each ceremony phase
//!
//! Conditions that depend on having seen the ceremony start keep that
//! fact across polls, because the remote clears its state once a phase
//! finishes.

use crate::poller::WaitCondition;
use crate::types::{RekeyStatus, VerificationStatus};

/// Follower: a rekey has been started by the leader
#[derive(Debug, Default)]
pub struct RekeyStarted;

impl WaitCondition<RekeyStatus> for RekeyStarted {
    fn is_met(&mut self, status: &RekeyStatus) -> bool {
        status.in_progress()
    }

    fn pending(&self, _status: &RekeyStatus) -> String {
        "Waiting for rekey operation to start.".to_string()
    }

    fn met(&self, _status: &RekeyStatus) -> String {
        "🙌 Rekey operation started. Please enter your key share.".to_string()
    }
}

/// Leader: every participant but the leader has submitted a share.
///
/// Relies on the service accepting shares in any order, so the leader can
/// hold back its own share and be the one that completes collection.
#[derive(Debug, Default)]
pub struct OthersSubmitted {
    started: bool,
}

impl WaitCondition<RekeyStatus> for OthersSubmitted {
    fn is_met(&mut self, status: &RekeyStatus) -> bool {
        self.started |= status.in_progress();
        self.started && status.remaining_keys() == 1
    }

    fn pending(&self, status: &RekeyStatus) -> String {
        if self.started {
            format!(
                "{}/{} shares provided. You will be prompted for the final share.",
                status.progress, status.required
            )
        } else {
            "Waiting for rekey to start...".to_string()
        }
    }

    fn met(&self, status: &RekeyStatus) -> String {
        format!(
            "🙌 {}/{} shares provided. Please provide the final share.",
            status.progress, status.required
        )
    }
}

/// Follower: share collection finished, either by entering verification
/// or by the ceremony closing
#[derive(Debug, Default)]
pub struct CollectionComplete {
    started: bool,
    required: u32,
    last_remaining: u32,
    verification_required: bool,
}

impl CollectionComplete {
    /// Start waiting after our own share was accepted, so the ceremony is
    /// known to have run even if the next poll already sees it closed
    pub fn after_submission(status: &RekeyStatus) -> Self {
        Self {
            started: true,
            required: status.required,
            last_remaining: status.remaining_keys(),
            verification_required: status.verification_required,
        }
    }

    /// Whether the ceremony announced a verification phase while running
    pub fn verification_required(&self) -> bool {
        self.verification_required
    }

    /// Whether at most the final share was missing when the ceremony was
    /// last seen running, so a teardown may mean it ran to completion
    pub fn final_share_outstanding(&self) -> bool {
        self.last_remaining <= 1
    }
}

impl WaitCondition<RekeyStatus> for CollectionComplete {
    fn is_met(&mut self, status: &RekeyStatus) -> bool {
        if status.in_progress() {
            self.started = true;
            self.required = status.required;
            self.last_remaining = status.remaining_keys();
            self.verification_required |= status.verification_required;
        }
        self.started && (status.verification_started() || !status.in_progress())
    }

    fn pending(&self, status: &RekeyStatus) -> String {
        if self.started {
            format!(
                "{}/{} shares provided. Waiting for other participants to submit their keys.",
                status.progress, status.required
            )
        } else {
            "Waiting for rekey to start...".to_string()
        }
    }

    fn met(&self, _status: &RekeyStatus) -> String {
        if self.required == 0 {
            "🙌 All shares provided.".to_string()
        } else {
            format!("🙌 {}/{} shares provided.", self.required, self.required)
        }
    }
}

/// Leader: every participant but the leader has verified a new share,
/// or verification already finished without the leader
#[derive(Debug, Default)]
pub struct OthersVerified {
    started: bool,
}

impl OthersVerified {
    /// Whether `status` shows verification over rather than waiting on us
    pub fn finished(&self, status: &VerificationStatus) -> bool {
        status.completed() || (self.started && !status.in_progress())
    }
}

impl WaitCondition<VerificationStatus> for OthersVerified {
    fn is_met(&mut self, status: &VerificationStatus) -> bool {
        self.started |= status.in_progress();
        (status.in_progress() && status.remaining_keys() == 1) || self.finished(status)
    }

    fn pending(&self, status: &VerificationStatus) -> String {
        if status.in_progress() {
            format!(
                "{}/{} shares verified. You will be prompted for the final share.",
                status.progress, status.threshold
            )
        } else {
            "Waiting for verification to start...".to_string()
        }
    }

    fn met(&self, status: &VerificationStatus) -> String {
        if self.finished(status) {
            "🙌 All shares verified.".to_string()
        } else {
            format!(
                "🙌 {}/{} shares verified. Please provide the final share.",
                status.progress, status.threshold
            )
        }
    }
}

/// Both roles: verification has finished remotely
#[derive(Debug, Default)]
pub struct VerificationFinished;

impl WaitCondition<VerificationStatus> for VerificationFinished {
    fn is_met(&mut self, status: &VerificationStatus) -> bool {
        !status.in_progress()
    }

    fn pending(&self, status: &VerificationStatus) -> String {
        format!(
            "{}/{} shares verified. Waiting for other participants to verify their keys.",
            status.progress, status.threshold
        )
    }

    fn met(&self, _status: &VerificationStatus) -> String {
        "🙌 All shares verified.".to_string()
    }
}
