//! Idempotency keys for command-originated events.
//!
//! Commands such as "start checkout" or "restore purchases" have no provider
//! event id to deduplicate on, so callers supply a key. Keys are stored in
//! canonical form (trimmed, lowercase) so a retry with different casing or
//! surrounding whitespace still matches the original.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

/// Minimum accepted key length, after normalization.
pub const MIN_KEY_LEN: usize = 8;

/// Maximum accepted key length, after normalization.
pub const MAX_KEY_LEN: usize = 128;

/// Trims surrounding whitespace and lowercases the key.
pub fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Returns true if `key` satisfies the length bounds and character set
/// `[A-Za-z0-9][A-Za-z0-9:_-]*`.
pub fn is_valid(key: &str) -> bool {
    assert_valid(key).is_ok()
}

/// Checks `key` against the length bounds and character set.
pub fn assert_valid(key: &str) -> Result<(), ValidationError> {
    let len = key.chars().count();
    if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&len) {
        return Err(ValidationError::out_of_range(
            "idempotency_key",
            MIN_KEY_LEN as i64,
            MAX_KEY_LEN as i64,
            len as i64,
        ));
    }

    let mut chars = key.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-'));
    if !first_ok || !rest_ok {
        return Err(ValidationError::invalid_format(
            "idempotency_key",
            "must match [A-Za-z0-9][A-Za-z0-9:_-]*",
        ));
    }

    Ok(())
}

/// Mints the dedupe key for a command-originated event.
///
/// This is the only way to obtain an [`IdempotencyKey`].
pub fn build_command_dedupe_key(raw: &str) -> Result<IdempotencyKey, ValidationError> {
    let normalized = normalize(raw);
    assert_valid(&normalized)?;
    Ok(IdempotencyKey(normalized))
}

/// A validated idempotency key in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        build_command_dedupe_key(&value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
