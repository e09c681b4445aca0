//! Tumbler Vault - HTTP adapters for rekey ceremonies
//!
//! [`VaultClient`] speaks the Vault `sys/rekey-recovery-key` API and
//! [`KeybaseResolver`] fetches participant public keys from Keybase.

pub mod client;
pub mod error;
pub mod keybase;

pub use client::{classify, VaultClient, REKEY_INIT_PATH, REKEY_UPDATE_PATH, REKEY_VERIFY_PATH};
pub use error::{Result, VaultError};
pub use keybase::{dearmor, KeybaseResolver, LOOKUP_PATH};
