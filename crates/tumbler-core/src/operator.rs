//! Operator interaction
//!
//! The ceremony talks to the human at the terminal only through this trait,
//! so the phase logic can be driven by scripted input in tests.

use async_trait::async_trait;
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::Result;

/// Human participant driving one side of the ceremony
#[async_trait]
pub trait Operator: Send + Sync {
    /// Show `label` and read one line of input.
    ///
    /// Returns [`crate::CeremonyError::InputClosed`] when input has ended and
    /// [`crate::CeremonyError::Cancelled`] when the read was aborted.
    async fn read_line(&self, label: &str) -> Result<Zeroizing<String>>;

    /// Print a permanent message
    fn say(&self, message: &str);

    /// Replace the transient progress line
    fn progress(&self, line: &str);

    /// Replace the transient progress line and end it
    fn progress_done(&self, line: &str);

    /// Read a non-empty line, re-prompting on blank input
    async fn prompt_text(&self, label: &str) -> Result<String> {
        Ok(self.prompt_secret(label).await?.to_string())
    }

    /// Read a non-empty line that must not outlive its use
    async fn prompt_secret(&self, label: &str) -> Result<Zeroizing<String>> {
        loop {
            let input = self.read_line(label).await?;
            let trimmed = input.trim();
            if !trimmed.is_empty() {
                return Ok(Zeroizing::new(trimmed.to_string()));
            }
        }
    }

    /// Read an unsigned integer, re-prompting on malformed input
    async fn prompt_integer(&self, label: &str) -> Result<u32> {
        loop {
            let input = self.prompt_text(label).await?;
            match input.parse::<u32>() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!("Rejected integer input for {}: {}", label, e);
                    self.say("Input must be a valid integer. Please try again.");
                }
            }
        }
    }
}
