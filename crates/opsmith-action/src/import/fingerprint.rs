//! Statement row fingerprinting.
//!
//! A fingerprint identifies a statement row well enough to catch the same
//! row arriving twice in one batch: SHA-256 over the amount in cents, the
//! ISO date, and a fixed-length prefix of the trimmed description, stored
//! as truncated hex. The version is persisted next to the hash so the
//! recipe can change without old rows matching by accident.

use chrono::NaiveDate;
use opsmith_core::types::Money;
use sha2::{Digest, Sha256};

/// Version of the fingerprint recipe below.
pub const FINGERPRINT_VERSION: i64 = 1;

/// Hex characters kept from the digest (128 bits).
pub const FINGERPRINT_HEX_LEN: usize = 32;

/// Compute the fingerprint for a statement row.
///
/// Only the first `prefix_len` characters of the trimmed description
/// participate, so trailing reference noise does not defeat the match.
pub fn movement_fingerprint(
    amount: Money,
    date: NaiveDate,
    description: &str,
    prefix_len: usize,
) -> String {
    let prefix: String = description.trim().chars().take(prefix_len).collect();
    let input = format!("{}|{}|{}", amount.0, date, prefix);
    let digest = Sha256::digest(input.as_bytes());
    let mut hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex.truncate(FINGERPRINT_HEX_LEN);
    hex
}
