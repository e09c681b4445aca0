//! Durable record of recovered key shares
//!
//! The record is written once per ceremony, before verification starts,
//! because verification consumes the only chance to re-derive the keys.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use tracing::info;

use crate::error::{CeremonyError, Result};
use crate::types::RecoveryKeyRecord;

/// File name prefix for recovery key records
pub const RECORD_PREFIX: &str = "recovery-keys";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Writes recovery key records into a directory
#[derive(Debug, Clone)]
pub struct RecoveryKeyRecorder {
    output_dir: PathBuf,
}

impl RecoveryKeyRecorder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write the record stamped with the current local time
    pub fn record(&self, service_address: &str, records: &[RecoveryKeyRecord]) -> Result<PathBuf> {
        self.record_at(service_address, records, Local::now())
    }

    /// Write the record stamped with `timestamp`.
    ///
    /// An existing file is never replaced; a numeric suffix is appended
    /// until a free name is found.
    pub fn record_at<Tz: TimeZone>(
        &self,
        service_address: &str,
        records: &[RecoveryKeyRecord],
        timestamp: DateTime<Tz>,
    ) -> Result<PathBuf>
    where
        Tz::Offset: std::fmt::Display,
    {
        let contents = render(service_address, records);
        let stem = format!("{}-{}", RECORD_PREFIX, timestamp.format(TIMESTAMP_FORMAT));

        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("{}.txt", stem)
            } else {
                format!("{}-{}.txt", stem, suffix)
            };
            let path = self.output_dir.join(name);

            match write_new(&path, contents.as_bytes()) {
                Ok(()) => {
                    info!("Recovery keys for {} participants saved to {:?}", records.len(), path);
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => suffix += 1,
                Err(source) => {
                    return Err(CeremonyError::Persistence {
                        path: path.display().to_string(),
                        source,
                    })
                }
            }
        }
    }
}

/// Render the record text: a header line, then one block per participant
pub fn render(service_address: &str, records: &[RecoveryKeyRecord]) -> String {
    let mut output = format!("VAULT URL: {}\n\n", service_address);
    for record in records {
        output.push_str(&format!(
            "KEYBASE USER: {}\nFINGERPRINT: {}\nENCRYPTED_KEY: {}\nENCRYPTED_KEY_BASE64: {}\n\n",
            record.user, record.pgp_fingerprint, record.encrypted_key, record.encrypted_key_base64
        ));
    }
    output
}

fn write_new(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
