//! Package identity newtypes.
//!
//! [`PackageName`] and [`PackageVersion`] keep package names and release
//! versions distinct from arbitrary strings. Both are validated on
//! construction because they end up in file names and download URLs.

use super::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated package identifier, e.g. `vault-conductor`.
///
/// Names may contain ASCII letters, digits, `-`, `_` and `.`, must start with
/// a letter or digit, and never contain path separators.
///
/// # Examples
///
/// ```
/// use tap_installer::manifest::package::PackageName;
///
/// let name = PackageName::try_from("exif_renamer").expect("valid name");
/// assert_eq!(name.as_str(), "exif_renamer");
/// assert!(PackageName::try_from("../poof").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for PackageName {
    type Error = ManifestError;

    fn try_from(value: &str) -> Result<Self> {
        let invalid = |reason: &str| ManifestError::InvalidPackageName {
            value: value.to_owned(),
            reason: reason.to_owned(),
        };
        let Some(first) = value.chars().next() else {
            return Err(invalid("name is empty"));
        };
        if !first.is_ascii_alphanumeric() {
            return Err(invalid("name must start with a letter or digit"));
        }
        if let Some(bad) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(invalid(&format!("character '{bad}' is not allowed")));
        }
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for PackageName {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl From<PackageName> for String {
    fn from(value: PackageName) -> Self {
        value.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A release version string such as `0.5.2`.
///
/// A leading `v` (as used in git tags) is stripped. The remainder must start
/// with a digit and contain only characters that appear in semantic versions.
///
/// # Examples
///
/// ```
/// use tap_installer::manifest::package::PackageVersion;
///
/// let version = PackageVersion::try_from("v0.2.1").expect("valid version");
/// assert_eq!(version.as_str(), "0.2.1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageVersion(String);

impl PackageVersion {
    /// Return the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for PackageVersion {
    type Error = ManifestError;

    fn try_from(value: &str) -> Result<Self> {
        let invalid = |reason: &str| ManifestError::InvalidVersion {
            value: value.to_owned(),
            reason: reason.to_owned(),
        };
        let trimmed = value.trim();
        let version = trimmed.strip_prefix('v').unwrap_or(trimmed);
        if !version.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(invalid("version must start with a digit"));
        }
        if let Some(bad) = version
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+')))
        {
            return Err(invalid(&format!("character '{bad}' is not allowed")));
        }
        Ok(Self(version.to_owned()))
    }
}

impl TryFrom<String> for PackageVersion {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl From<PackageVersion> for String {
    fn from(value: PackageVersion) -> Self {
        value.0
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::simple("poof")]
    #[case::hyphenated("vault-conductor")]
    #[case::underscored("exif_renamer")]
    #[case::dotted("tool.rs")]
    fn accepts_tap_package_names(#[case] raw: &str) {
        assert_eq!(PackageName::try_from(raw).expect("valid").as_str(), raw);
    }

    #[rstest]
    #[case::empty("")]
    #[case::traversal("../poof")]
    #[case::separator("bin/poof")]
    #[case::leading_dash("-poof")]
    #[case::whitespace("po of")]
    fn rejects_unsafe_package_names(#[case] raw: &str) {
        assert!(matches!(
            PackageName::try_from(raw),
            Err(ManifestError::InvalidPackageName { .. })
        ));
    }

    #[rstest]
    #[case::plain("0.5.2", "0.5.2")]
    #[case::tag("v0.2.3", "0.2.3")]
    #[case::prerelease("1.0.0-rc.1", "1.0.0-rc.1")]
    #[case::build_metadata("1.0.0+build.5", "1.0.0+build.5")]
    fn normalizes_versions(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(PackageVersion::try_from(raw).expect("valid").as_str(), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::word("latest")]
    #[case::slash("1.0/2")]
    fn rejects_invalid_versions(#[case] raw: &str) {
        assert!(matches!(
            PackageVersion::try_from(raw),
            Err(ManifestError::InvalidVersion { .. })
        ));
    }
}
