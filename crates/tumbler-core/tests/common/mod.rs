//! Test doubles for driving ceremonies without a real service or terminal

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use zeroize::Zeroizing;

use tumbler_core::{
    BeginRequest, CeremonyError, Operator, PublicKeyResolver, RemoteCeremonyClient, RemoteFailure,
    RemoteResult, RekeyStatus, Result, VerificationStatus, NO_REKEY_CONFIGURATION,
};

pub const VERIFICATION_NONCE: &str = "verify-nonce";

/// Mutable state of the in-memory ceremony service
#[derive(Debug, Default)]
pub struct VaultState {
    pub rekey: RekeyStatus,
    pub verification: VerificationStatus,

    /// Shares needed under the current configuration
    pub required: u32,

    /// Return no keys when collection completes
    pub withhold_keys: bool,

    /// Nonce installed when the next scripted submit failure fires
    pub rotate_nonce_to: Option<String>,

    pub status_failures: VecDeque<RemoteFailure>,
    pub verification_status_failures: VecDeque<RemoteFailure>,
    pub submit_failures: VecDeque<RemoteFailure>,
    pub verify_failures: VecDeque<RemoteFailure>,
    /// Error payloads returned in otherwise successful verification answers
    pub verify_payload_errors: VecDeque<String>,

    pub status_fetches: u32,
    pub verification_fetches: u32,
    pub begin_calls: u32,
    pub submit_calls: u32,
    pub verify_calls: u32,
    pub begin_requests: Vec<BeginRequest>,
    pub submitted_nonces: Vec<String>,
    pub submitted_shares: Vec<String>,
}

/// In-memory stand-in for the secret-management service
pub struct FakeVault {
    address: String,
    state: Mutex<VaultState>,
}

impl FakeVault {
    pub fn new(required: u32) -> Self {
        Self {
            address: "https://vault.test:8200".to_string(),
            state: Mutex::new(VaultState {
                required,
                ..Default::default()
            }),
        }
    }

    /// Inspect or modify the service state
    pub fn with<T>(&self, f: impl FnOnce(&mut VaultState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    /// Finish collection and open verification with the given threshold
    pub fn open_verification(&self, threshold: u32) {
        self.with(|s| {
            s.rekey.verification_nonce = VERIFICATION_NONCE.into();
            s.verification = VerificationStatus {
                nonce: VERIFICATION_NONCE.into(),
                started: true,
                threshold,
                new_shares: s.rekey.shares,
                ..Default::default()
            };
        });
    }

    /// Other participants reach the verification threshold
    pub fn finish_verification(&self) {
        self.with(tear_down);
    }

    /// Put the service into the middle of a running ceremony
    pub fn start_running(&self, shares: u32, threshold: u32) {
        self.with(|s| {
            s.rekey = RekeyStatus {
                nonce: "rekey-nonce".into(),
                started: true,
                threshold,
                shares,
                required: s.required,
                verification_required: true,
                ..Default::default()
            }
        });
    }
}

/// State after the last verification share: the service forgets the ceremony
fn tear_down(s: &mut VaultState) {
    s.rekey = RekeyStatus::default();
    s.verification = VerificationStatus {
        errors: vec![NO_REKEY_CONFIGURATION.into()],
        ..Default::default()
    };
}

#[async_trait]
impl RemoteCeremonyClient for FakeVault {
    fn address(&self) -> &str {
        &self.address
    }

    async fn fetch_ceremony_status(&self) -> RemoteResult<RekeyStatus> {
        self.with(|s| {
            s.status_fetches += 1;
            match s.status_failures.pop_front() {
                Some(failure) => Err(failure),
                None => Ok(s.rekey.clone()),
            }
        })
    }

    async fn begin_ceremony(&self, request: &BeginRequest) -> RemoteResult<RekeyStatus> {
        self.with(|s| {
            s.begin_calls += 1;
            s.begin_requests.push(request.clone());
            if s.rekey.started {
                return Err(RemoteFailure::Rejected("rekey already in progress".into()));
            }
            s.rekey = RekeyStatus {
                nonce: "rekey-nonce".into(),
                started: true,
                threshold: request.secret_threshold,
                shares: request.secret_shares,
                required: s.required,
                verification_required: request.require_verification,
                ..Default::default()
            };
            Ok(s.rekey.clone())
        })
    }

    async fn submit_share(&self, share: &str, nonce: &str) -> RemoteResult<RekeyStatus> {
        self.with(|s| {
            s.submit_calls += 1;
            s.submitted_nonces.push(nonce.to_string());
            if let Some(failure) = s.submit_failures.pop_front() {
                if let Some(nonce) = s.rotate_nonce_to.take() {
                    s.rekey.nonce = nonce;
                }
                return Err(failure);
            }
            if !s.rekey.started {
                return Err(RemoteFailure::Rejected("no rekey in progress".into()));
            }
            if nonce != s.rekey.nonce {
                return Err(RemoteFailure::Rejected(
                    "provided nonce does not match the current nonce".into(),
                ));
            }
            s.submitted_shares.push(share.to_string());
            s.rekey.progress += 1;
            if s.rekey.progress < s.rekey.required {
                return Ok(s.rekey.clone());
            }

            let n = s.rekey.shares as usize;
            let mut response = s.rekey.clone();
            if !s.withhold_keys {
                response.pgp_fingerprints = (0..n).map(|i| format!("F{}", i)).collect();
                response.keys = (0..n).map(|i| format!("k{}", i)).collect();
                response.keys_base64 = (0..n).map(|i| format!("b{}", i)).collect();
            }

            if s.rekey.verification_required {
                s.rekey.verification_nonce = VERIFICATION_NONCE.into();
                response.verification_nonce = VERIFICATION_NONCE.into();
                s.verification = VerificationStatus {
                    nonce: VERIFICATION_NONCE.into(),
                    started: true,
                    threshold: s.rekey.threshold,
                    new_shares: s.rekey.shares,
                    ..Default::default()
                };
            } else {
                s.rekey = RekeyStatus::default();
            }
            Ok(response)
        })
    }

    async fn fetch_verification_status(&self) -> RemoteResult<VerificationStatus> {
        self.with(|s| {
            s.verification_fetches += 1;
            match s.verification_status_failures.pop_front() {
                Some(failure) => Err(failure),
                None => Ok(s.verification.clone()),
            }
        })
    }

    async fn submit_verification_share(
        &self,
        share: &str,
        nonce: &str,
    ) -> RemoteResult<VerificationStatus> {
        self.with(|s| {
            s.verify_calls += 1;
            s.submitted_nonces.push(nonce.to_string());
            if let Some(failure) = s.verify_failures.pop_front() {
                return Err(failure);
            }
            if !s.verification.started {
                return Err(RemoteFailure::Rejected("no verification in progress".into()));
            }
            if nonce != s.verification.nonce {
                return Err(RemoteFailure::Rejected(
                    "provided nonce does not match the current nonce".into(),
                ));
            }
            if let Some(message) = s.verify_payload_errors.pop_front() {
                return Ok(VerificationStatus {
                    errors: vec![message],
                    ..s.verification.clone()
                });
            }
            s.submitted_shares.push(share.to_string());
            s.verification.progress += 1;
            if s.verification.progress < s.verification.threshold {
                return Ok(s.verification.clone());
            }

            tear_down(s);
            Ok(VerificationStatus {
                nonce: VERIFICATION_NONCE.into(),
                complete: true,
                ..Default::default()
            })
        })
    }
}

/// Operator answering prompts from a fixed script
#[derive(Default)]
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
    pub said: Mutex<Vec<String>>,
    pub progress: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn said_contains(&self, needle: &str) -> bool {
        self.said.lock().unwrap().iter().any(|m| m.contains(needle))
    }

    pub fn remaining_answers(&self) -> usize {
        self.answers.lock().unwrap().len()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn read_line(&self, label: &str) -> Result<Zeroizing<String>> {
        self.prompts.lock().unwrap().push(label.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .map(Zeroizing::new)
            .ok_or(CeremonyError::InputClosed)
    }

    fn say(&self, message: &str) {
        self.said.lock().unwrap().push(message.to_string());
    }

    fn progress(&self, line: &str) {
        self.progress.lock().unwrap().push(line.to_string());
    }

    fn progress_done(&self, line: &str) {
        self.said.lock().unwrap().push(line.to_string());
    }
}

/// Scripted operator that lets the service change once, just before a
/// given prompt is answered
pub struct ActsBeforePrompt<'v> {
    pub inner: ScriptedOperator,
    vault: &'v FakeVault,
    label: &'static str,
    action: fn(&FakeVault),
    fired: AtomicBool,
}

impl<'v> ActsBeforePrompt<'v> {
    pub fn new(
        inner: ScriptedOperator,
        vault: &'v FakeVault,
        label: &'static str,
        action: fn(&FakeVault),
    ) -> Self {
        Self {
            inner,
            vault,
            label,
            action,
            fired: AtomicBool::new(false),
        }
    }

    pub fn prompts_for(&self, label: &str) -> usize {
        self.inner.prompts.lock().unwrap().iter().filter(|p| *p == label).count()
    }
}

#[async_trait]
impl Operator for ActsBeforePrompt<'_> {
    async fn read_line(&self, label: &str) -> Result<Zeroizing<String>> {
        if label == self.label && !self.fired.swap(true, Ordering::SeqCst) {
            (self.action)(self.vault);
        }
        self.inner.read_line(label).await
    }

    fn say(&self, message: &str) {
        self.inner.say(message)
    }

    fn progress(&self, line: &str) {
        self.inner.progress(line)
    }

    fn progress_done(&self, line: &str) {
        self.inner.progress_done(line)
    }
}

/// Key directory that knows a fixed set of users
#[derive(Default)]
pub struct FakeResolver {
    pub missing: Vec<String>,
    pub calls: Mutex<u32>,
}

#[async_trait]
impl PublicKeyResolver for FakeResolver {
    async fn resolve_public_keys(&self, users: &[String]) -> Result<HashMap<String, String>> {
        *self.calls.lock().unwrap() += 1;
        Ok(users
            .iter()
            .filter(|u| !self.missing.contains(u))
            .map(|u| (u.clone(), format!("KEY-{}", u)))
            .collect())
    }
}

/// Other participants acting on the service while a ceremony under test runs
pub struct Participants {
    pub shares: usize,
    pub verifications: usize,
}

impl Participants {
    /// Wait for the ceremony, submit `shares` shares, then `verifications`
    /// verification shares once verification opens
    pub async fn act(self, vault: &FakeVault) {
        loop {
            if vault.fetch_ceremony_status().await.map(|s| s.started).unwrap_or(false) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        for i in 0..self.shares {
            tokio::time::sleep(Duration::from_millis(700)).await;
            let nonce = vault.with(|s| s.rekey.nonce.clone());
            vault
                .submit_share(&format!("participant-share-{}", i), &nonce)
                .await
                .expect("participant share accepted");
        }

        if self.verifications == 0 {
            return;
        }
        loop {
            if vault.with(|s| !s.rekey.verification_nonce.is_empty()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        for i in 0..self.verifications {
            tokio::time::sleep(Duration::from_millis(700)).await;
            vault
                .submit_verification_share(&format!("participant-verify-{}", i), VERIFICATION_NONCE)
                .await
                .expect("participant verification accepted");
        }
    }
}
