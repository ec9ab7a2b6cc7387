//! SHA-256 digest newtype for archive verification.
//!
//! Validates that the value is a 64-character hexadecimal string. Input may
//! carry the `sha256:` prefix GitHub uses in release asset digests and may
//! use either hex case; the stored form is always bare lowercase hex.

use super::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Expected length of a hex-encoded SHA-256 digest.
const DIGEST_HEX_LEN: usize = 64;

/// Algorithm prefix accepted in front of the hex digest.
const DIGEST_PREFIX: &str = "sha256:";

/// A validated hex-encoded SHA-256 digest.
///
/// # Examples
///
/// ```
/// use tap_installer::manifest::digest::Sha256Digest;
///
/// let upper = format!("sha256:{}", "AB".repeat(32));
/// let digest = Sha256Digest::try_from(upper.as_str()).expect("valid digest");
/// assert_eq!(digest.as_str(), "ab".repeat(32));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Return the digest as a lowercase hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Compare against another hex digest, ignoring hex case.
    ///
    /// # Examples
    ///
    /// ```
    /// use tap_installer::manifest::digest::Sha256Digest;
    ///
    /// let digest = Sha256Digest::try_from("c".repeat(64).as_str()).expect("valid");
    /// assert!(digest.matches(&"C".repeat(64)));
    /// assert!(!digest.matches(&"d".repeat(64)));
    /// ```
    #[must_use]
    pub fn matches(&self, other_hex: &str) -> bool {
        let other = other_hex.strip_prefix(DIGEST_PREFIX).unwrap_or(other_hex);
        self.0.eq_ignore_ascii_case(other)
    }

    /// Wrap hex produced by the hasher, which is lowercase by construction.
    pub(crate) fn from_hasher_hex(hex: String) -> Self {
        debug_assert_eq!(hex.len(), DIGEST_HEX_LEN);
        Self(hex)
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = ManifestError;

    fn try_from(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let hex = trimmed.strip_prefix(DIGEST_PREFIX).unwrap_or(trimmed);
        validate_sha256(value, hex)?;
        Ok(Self(hex.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl From<Sha256Digest> for String {
    fn from(value: Sha256Digest) -> Self {
        value.0
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate that `hex` is exactly 64 hex characters.
fn validate_sha256(original: &str, hex: &str) -> Result<()> {
    if hex.len() != DIGEST_HEX_LEN {
        return Err(ManifestError::InvalidDigest {
            value: original.to_owned(),
            reason: format!("expected {DIGEST_HEX_LEN} hex characters, got {}", hex.len()),
        });
    }
    if let Some(bad) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(ManifestError::InvalidDigest {
            value: original.to_owned(),
            reason: format!("non-hex character '{bad}'"),
        });
    }
    Ok(())
}
