//! Fixed-interval status polling
//!
//! Ceremony phases advance when other participants act on the remote
//! service, so each wait repeatedly fetches a fresh status until a
//! phase-specific [`WaitCondition`] holds. Fetch failures are reported and
//! retried on the next tick; only cancellation or a ceremony-level failure
//! ends a wait early.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PollSchedule;
use crate::error::{CeremonyError, RemoteFailure, RemoteResult, Result};
use crate::operator::Operator;

/// Glyphs cycled through while waiting
pub const INDICATOR_GLYPHS: [&str; 5] = ["🤔", "🤨", "🧐", "🤓", "🤩"];

/// Glyph shown on the given tick
pub fn indicator_for(tick: u64) -> &'static str {
    INDICATOR_GLYPHS[(tick % INDICATOR_GLYPHS.len() as u64) as usize]
}

/// Readiness condition and rendering for one wait
pub trait WaitCondition<S> {
    /// Whether the wait is over. May track state across polls.
    fn is_met(&mut self, status: &S) -> bool;

    /// Progress text while still waiting
    fn pending(&self, status: &S) -> String;

    /// Final line once the condition holds
    fn met(&self, status: &S) -> String;
}

/// Blocks until remote state satisfies a condition
pub struct StatusPoller<'a> {
    operator: &'a dyn Operator,
    schedule: PollSchedule,
    cancel: CancellationToken,
}

impl<'a> StatusPoller<'a> {
    pub fn new(operator: &'a dyn Operator, schedule: PollSchedule, cancel: CancellationToken) -> Self {
        Self {
            operator,
            schedule,
            cancel,
        }
    }

    /// Fetch the current status, retrying failed fetches on the poll interval
    pub async fn fetch_current<S, F, Fut>(&self, mut fetch: F) -> Result<S>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<S>>,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Err(CeremonyError::Cancelled);
            }

            match fetch().await {
                Ok(status) => return Ok(status),
                Err(RemoteFailure::Invalidated(message)) => {
                    return Err(CeremonyError::CeremonyInvalidated(message));
                }
                Err(e) => {
                    warn!("Status fetch failed, retrying: {}", e);
                    self.operator.say(&e.to_string());
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(CeremonyError::Cancelled),
                _ = tokio::time::sleep(self.schedule.interval) => {}
            }
        }
    }

    /// Poll `fetch` until `condition` is met and return the satisfying status
    pub async fn wait_until<S, F, Fut, W>(&self, mut fetch: F, condition: &mut W) -> Result<S>
    where
        S: PartialEq,
        F: FnMut() -> Fut,
        Fut: Future<Output = RemoteResult<S>>,
        W: WaitCondition<S> + ?Sized,
    {
        let mut tick: u64 = 0;
        let mut delay = self.schedule.interval;
        let mut last: Option<S> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(CeremonyError::Cancelled);
            }

            match fetch().await {
                Ok(status) => {
                    if condition.is_met(&status) {
                        self.operator.progress_done(&condition.met(&status));
                        return Ok(status);
                    }
                    self.operator
                        .progress(&format!("{} {}", indicator_for(tick), condition.pending(&status)));

                    delay = match &last {
                        Some(previous) if *previous == status => self.schedule.next_after(delay),
                        _ => self.schedule.interval,
                    };
                    last = Some(status);
                }
                Err(RemoteFailure::Invalidated(message)) => {
                    return Err(CeremonyError::CeremonyInvalidated(message));
                }
                Err(e) => {
                    warn!("Status fetch failed, retrying: {}", e);
                    self.operator.say(&e.to_string());
                }
            }

            tick += 1;
            debug!("Next status poll in {:?}", delay);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(CeremonyError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
