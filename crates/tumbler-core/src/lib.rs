//! Tumbler Core - Coordination of multi-party recovery key rekey ceremonies
//!
//! A group of key holders rotates the recovery shares of a Vault together:
//! one leader starts the ceremony and submits the last share, followers
//! contribute theirs, and everyone then verifies a newly issued share. The
//! secret-management service does the cryptography; this crate drives the
//! participants through its phases:
//! - [`StatusPoller`] waits on remotely mutated ceremony state
//! - [`KeyShareSubmitter`] collects and submits operator shares with retry
//! - [`Ceremony`] sequences the leader and follower tracks
//! - [`RecoveryKeyRecorder`] persists the recovered encrypted shares

pub mod ceremony;
pub mod config;
pub mod error;
pub mod operator;
pub mod poller;
pub mod recorder;
pub mod remote;
pub mod submitter;
pub mod types;

pub use ceremony::{
    run_follower_ceremony, run_leader_ceremony, Ceremony, CeremonyOutcome, CeremonyRole,
    FollowerPhase, LeaderPhase,
};
pub use config::{CeremonyConfig, PollSchedule};
pub use error::{CeremonyError, RemoteFailure, RemoteResult, Result};
pub use operator::Operator;
pub use poller::{indicator_for, StatusPoller, WaitCondition};
pub use recorder::RecoveryKeyRecorder;
pub use remote::{PublicKeyResolver, RemoteCeremonyClient};
pub use submitter::{
    KeyShareSubmitter, OnInvalidated, RekeyRound, ShareRound, Submission, VerificationRound,
};
pub use types::{
    BeginRequest, RecoveryKeyRecord, RekeyRequest, RekeyStatus, VerificationStatus,
    NO_REKEY_CONFIGURATION,
};

/// Re-exported so callers can build cancellation handles without a direct
/// `tokio-util` dependency
pub use tokio_util::sync::CancellationToken;
