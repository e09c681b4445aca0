//! Keybase public key lookup
//!
//! Vault wants each PGP key as base64 of the binary key, while Keybase
//! serves ASCII-armored bundles, so bundles are de-armored here.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tracing::{debug, info};

use tumbler_core::{CeremonyError, PublicKeyResolver};

use crate::error::{Result, VaultError};

pub const LOOKUP_PATH: &str = "/_/api/1.0/user/lookup.json";

const ARMOR_BEGIN: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";
const ARMOR_END: &str = "-----END PGP PUBLIC KEY BLOCK-----";

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    status: LookupStatus,
    #[serde(default)]
    them: Vec<Option<LookupUser>>,
}

#[derive(Debug, Default, Deserialize)]
struct LookupStatus {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    desc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupUser {
    #[serde(default)]
    public_keys: Option<PublicKeys>,
}

#[derive(Debug, Deserialize)]
struct PublicKeys {
    #[serde(default)]
    primary: Option<PrimaryKey>,
}

#[derive(Debug, Deserialize)]
struct PrimaryKey {
    #[serde(default)]
    bundle: String,
}

/// Resolves Keybase usernames to their primary public key
pub struct KeybaseResolver {
    base_url: String,
    http: reqwest::Client,
}

impl KeybaseResolver {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(VaultError::InvalidAddress(base_url));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, http })
    }

    /// Fetch and de-armor the keys of `users` in one lookup
    pub async fn lookup(&self, users: &[String]) -> Result<HashMap<String, String>> {
        if users.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}{}", self.base_url, LOOKUP_PATH);
        debug!("Looking up {} Keybase users", users.len());
        let response = self
            .http
            .get(&url)
            .query(&[("usernames", users.join(",")), ("fields", "public_keys".to_string())])
            .send()
            .await?
            .error_for_status()?;
        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| VaultError::Malformed(e.to_string()))?;

        if body.status.code != 0 {
            return Err(VaultError::Keybase(format!(
                "lookup failed with code {}: {}",
                body.status.code,
                body.status.desc.unwrap_or_default()
            )));
        }
        if body.them.len() != users.len() {
            return Err(VaultError::Keybase(format!(
                "asked for {} users, got {}",
                users.len(),
                body.them.len()
            )));
        }

        let mut keys = HashMap::with_capacity(users.len());
        for (user, entry) in users.iter().zip(body.them) {
            let bundle = entry
                .and_then(|u| u.public_keys)
                .and_then(|k| k.primary)
                .map(|p| p.bundle)
                .filter(|b| !b.is_empty())
                .ok_or_else(|| {
                    VaultError::Keybase(format!("unable to find public key for user {}", user))
                })?;
            let key = dearmor(&bundle)?;
            keys.insert(user.clone(), STANDARD.encode(key));
        }
        info!("Resolved public keys for {} Keybase users", keys.len());
        Ok(keys)
    }
}

#[async_trait]
impl PublicKeyResolver for KeybaseResolver {
    async fn resolve_public_keys(
        &self,
        users: &[String],
    ) -> tumbler_core::Result<HashMap<String, String>> {
        self.lookup(users)
            .await
            .map_err(|e| CeremonyError::KeyLookup(e.to_string()))
    }
}

/// Decode an ASCII-armored public key block into its binary packets
pub fn dearmor(armored: &str) -> Result<Vec<u8>> {
    let mut lines = armored.lines().map(str::trim);
    if !lines.any(|line| line == ARMOR_BEGIN) {
        return Err(VaultError::Armor("missing armor header".into()));
    }

    let mut body = String::new();
    let mut in_headers = true;
    let mut terminated = false;
    for line in lines {
        if line == ARMOR_END {
            terminated = true;
            break;
        }
        if in_headers {
            // headers run up to the first blank line
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            if line.contains(": ") {
                continue;
            }
            in_headers = false;
        }
        if line.is_empty() || line.starts_with('=') {
            continue;
        }
        body.push_str(line);
    }

    if !terminated {
        return Err(VaultError::Armor("missing armor footer".into()));
    }
    let decoded = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| VaultError::Armor(e.to_string()))?;
    if decoded.is_empty() {
        return Err(VaultError::Armor("empty key block".into()));
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armor(payload: &[u8], headers: &[&str]) -> String {
        let encoded = STANDARD.encode(payload);
        let mut out = format!("{}\n", ARMOR_BEGIN);
        for header in headers {
            out.push_str(header);
            out.push('\n');
        }
        out.push('\n');
        for chunk in encoded.as_bytes().chunks(64) {
            out.push_str(std::str::from_utf8(chunk).unwrap());
            out.push('\n');
        }
        out.push_str("=AbCd\n");
        out.push_str(ARMOR_END);
        out.push('\n');
        out
    }

    #[test]
    fn test_dearmor_strips_headers_and_checksum() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(300).collect();
        let bundle = armor(&payload, &["Comment: https://keybase.io/download", "Version: Keybase Go"]);
        assert_eq!(dearmor(&bundle).unwrap(), payload);
    }

    #[test]
    fn test_dearmor_without_headers() {
        let bundle = armor(b"key material", &[]);
        assert_eq!(dearmor(&bundle).unwrap(), b"key material");
    }

    #[test]
    fn test_dearmor_rejects_unterminated_block() {
        let bundle = format!("{}\n\nAAAA\n", ARMOR_BEGIN);
        assert!(matches!(dearmor(&bundle), Err(VaultError::Armor(_))));
    }

    #[test]
    fn test_dearmor_rejects_plain_text() {
        assert!(matches!(dearmor("not a key"), Err(VaultError::Armor(_))));
    }

    #[test]
    fn test_dearmor_rejects_bad_base64() {
        let bundle = format!("{}\n\n!!!!\n{}\n", ARMOR_BEGIN, ARMOR_END);
        assert!(matches!(dearmor(&bundle), Err(VaultError::Armor(_))));
    }
}
