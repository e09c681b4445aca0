//! Ceremony configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CeremonyError, Result};

/// Tunables for a ceremony run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CeremonyConfig {
    /// Delay between status fetches while waiting (milliseconds)
    pub poll_interval_ms: u64,

    /// Upper bound for the poll delay when backing off (milliseconds)
    pub max_poll_interval_ms: u64,

    /// Factor applied to the delay after each unchanged status
    pub poll_backoff: f64,

    /// Give up on a share after this many attempts (unbounded when unset)
    pub max_submit_attempts: Option<u32>,

    /// Directory receiving recovery key records
    pub output_dir: PathBuf,

    /// Ask the service for a verification phase when starting
    pub require_verification: bool,

    /// Timeout for a single HTTP request (seconds)
    pub request_timeout_secs: u64,

    /// Base URL of the public key directory
    pub keybase_url: String,
}

impl Default for CeremonyConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_poll_interval_ms: 1000,
            poll_backoff: 1.0,
            max_submit_attempts: None,
            output_dir: PathBuf::from("."),
            require_verification: true,
            request_timeout_secs: 30,
            keybase_url: "https://keybase.io".to_string(),
        }
    }
}

impl CeremonyConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CeremonyError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| CeremonyError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(CeremonyError::Config("poll_interval_ms must be positive".into()));
        }
        if self.max_poll_interval_ms < self.poll_interval_ms {
            return Err(CeremonyError::Config(
                "max_poll_interval_ms must not be below poll_interval_ms".into(),
            ));
        }
        if !(self.poll_backoff >= 1.0) {
            return Err(CeremonyError::Config("poll_backoff must be at least 1.0".into()));
        }
        if self.max_submit_attempts == Some(0) {
            return Err(CeremonyError::Config("max_submit_attempts must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_schedule(&self) -> PollSchedule {
        PollSchedule {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_interval: Duration::from_millis(self.max_poll_interval_ms),
            backoff: self.poll_backoff,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Delay policy for status polling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_interval: Duration,
    pub backoff: f64,
}

impl PollSchedule {
    /// Fixed-interval schedule
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff: 1.0,
        }
    }

    /// Delay to use after `current` when the status did not change
    pub fn next_after(&self, current: Duration) -> Duration {
        let next = current.as_secs_f64() * self.backoff;
        Duration::from_secs_f64(next.min(self.max_interval.as_secs_f64()))
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_fixed_one_second() {
        let config = CeremonyConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poll_schedule(), PollSchedule::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"poll_interval_ms": 250, "max_poll_interval_ms": 4000, "poll_backoff": 2.0}"#).unwrap();

        let config = CeremonyConfig::load(&path).unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert!(config.require_verification);
        assert_eq!(config.max_submit_attempts, None);
    }

    #[test]
    fn test_save_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = CeremonyConfig {
            max_submit_attempts: Some(5),
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(CeremonyConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_rejects_shrinking_backoff() {
        let config = CeremonyConfig {
            poll_backoff: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let schedule = PollSchedule {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(5),
            backoff: 2.0,
        };
        let mut delay = schedule.interval;
        delay = schedule.next_after(delay);
        assert_eq!(delay, Duration::from_secs(2));
        delay = schedule.next_after(schedule.next_after(delay));
        assert_eq!(delay, Duration::from_secs(5));
    }
}
