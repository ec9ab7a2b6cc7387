//! TOML parsing and serialization for release manifests.
//!
//! The document is first deserialized into [`RawManifest`], a plain mirror of
//! the file layout, and then validated into a [`ReleaseManifest`]. Keeping
//! the raw form public lets `update` rewrite a manifest by editing plain
//! strings and re-validating, instead of mutating a loaded manifest.

use super::digest::Sha256Digest;
use super::error::{ManifestError, Result};
use super::package::{PackageName, PackageVersion};
use super::{
    BinarySpec, DEFAULT_TEST_ARGS, PackageMetadata, PlatformEntry, ReleaseManifest, ReleaseSource,
};
use crate::platform::Platform;
use camino::{Utf8Component, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// URL schemes an entry may download from.
const ALLOWED_SCHEMES: &[&str] = &["https://", "http://", "file://"];

/// The on-disk manifest layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawManifest {
    /// Package identifier.
    pub name: String,
    /// Release version; a leading `v` is accepted.
    pub version: String,
    /// One-line description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Project homepage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// SPDX licence identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Binary location overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<RawBinary>,
    /// Upstream release feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<RawRelease>,
    /// Per-platform archives.
    #[serde(default)]
    pub entries: Vec<RawEntry>,
}

/// The `[binary]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBinary {
    /// Installed binary name; defaults to the package name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Relative path of the binary inside the archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Self-test arguments; defaults to `--version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_args: Option<Vec<String>>,
}

/// The `[release]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRelease {
    /// GitHub repository in `owner/name` form.
    pub github_repo: String,
}

/// One `[[entries]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEntry {
    /// Operating system name or alias.
    pub os: String,
    /// Architecture name or alias.
    pub arch: String,
    /// Archive URL.
    pub url: String,
    /// Expected SHA-256 digest.
    pub sha256: String,
    /// Release asset name pattern used by `update`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
}

/// Parse and validate a TOML manifest.
///
/// `origin` names the document in error messages (a path or URL).
///
/// # Errors
///
/// Returns [`ManifestError::Parse`] for malformed TOML or unknown keys, and
/// [`ManifestError::Invalid`] wrapping the first validation failure.
pub fn parse_manifest(text: &str, origin: &str) -> Result<ReleaseManifest> {
    let raw: RawManifest = toml::from_str(text).map_err(|source| ManifestError::Parse {
        origin: origin.to_owned(),
        source: Box::new(source),
    })?;
    ReleaseManifest::try_from(raw).map_err(|source| ManifestError::Invalid {
        origin: origin.to_owned(),
        source: Box::new(source),
    })
}

/// Render a manifest back to TOML.
///
/// # Errors
///
/// Returns [`ManifestError::Serialize`] if TOML serialization fails.
pub fn to_toml_string(manifest: &ReleaseManifest) -> Result<String> {
    Ok(toml::to_string_pretty(&RawManifest::from(manifest))?)
}

impl TryFrom<RawManifest> for ReleaseManifest {
    type Error = ManifestError;

    fn try_from(raw: RawManifest) -> Result<Self> {
        let name = PackageName::try_from(raw.name)?;
        let version = PackageVersion::try_from(raw.version)?;
        let binary = validate_binary(&name, raw.binary.unwrap_or_default())?;
        let release = raw
            .release
            .map(|release| validate_release(release.github_repo))
            .transpose()?;
        let entries = raw
            .entries
            .into_iter()
            .map(validate_entry)
            .collect::<Result<Vec<_>>>()?;
        let metadata = PackageMetadata {
            description: raw.description,
            homepage: raw.homepage,
            license: raw.license,
        };
        Self::new(name, version, metadata, binary, release, entries)
    }
}

impl From<&ReleaseManifest> for RawManifest {
    fn from(manifest: &ReleaseManifest) -> Self {
        let binary = manifest.binary();
        let default_args = binary.test_args().iter().eq(DEFAULT_TEST_ARGS.iter());
        let raw_binary = RawBinary {
            name: (binary.name() != manifest.name().as_str()).then(|| binary.name().to_owned()),
            path: binary.path().map(ToString::to_string),
            test_args: (!default_args).then(|| binary.test_args().to_vec()),
        };
        let has_binary_table =
            raw_binary.name.is_some() || raw_binary.path.is_some() || raw_binary.test_args.is_some();
        let metadata = manifest.metadata();
        Self {
            name: manifest.name().to_string(),
            version: manifest.version().to_string(),
            description: metadata.description.clone(),
            homepage: metadata.homepage.clone(),
            license: metadata.license.clone(),
            binary: has_binary_table.then_some(raw_binary),
            release: manifest.release().map(|release| RawRelease {
                github_repo: release.github_repo.clone(),
            }),
            entries: manifest.entries().map(RawEntry::from).collect(),
        }
    }
}

impl From<&PlatformEntry> for RawEntry {
    fn from(entry: &PlatformEntry) -> Self {
        Self {
            os: entry.platform().os.to_string(),
            arch: entry.platform().arch.to_string(),
            url: entry.url().to_owned(),
            sha256: entry.checksum().to_string(),
            asset: entry.asset().map(str::to_owned),
        }
    }
}

fn validate_entry(raw: RawEntry) -> Result<PlatformEntry> {
    let platform = Platform::parse(&raw.os, &raw.arch)?;
    validate_url(&raw.url)?;
    let checksum = Sha256Digest::try_from(raw.sha256)?;
    Ok(PlatformEntry::new(platform, raw.url, checksum, raw.asset))
}

fn validate_url(url: &str) -> Result<()> {
    let rest = ALLOWED_SCHEMES
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .ok_or_else(|| ManifestError::InvalidUrl {
            url: url.to_owned(),
            reason: "scheme must be https, http or file".to_owned(),
        })?;
    if rest.is_empty() || rest.chars().any(char::is_whitespace) {
        return Err(ManifestError::InvalidUrl {
            url: url.to_owned(),
            reason: "URL is empty or contains whitespace".to_owned(),
        });
    }
    Ok(())
}

fn validate_binary(package: &PackageName, raw: RawBinary) -> Result<BinarySpec> {
    let name = raw.name.unwrap_or_else(|| package.to_string());
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ManifestError::InvalidBinary {
            value: name,
            reason: "binary name must be a plain file name".to_owned(),
        });
    }
    let path = raw.path.map(validate_binary_path).transpose()?;
    let test_args = raw
        .test_args
        .unwrap_or_else(|| DEFAULT_TEST_ARGS.iter().map(|arg| (*arg).to_owned()).collect());
    Ok(BinarySpec::new(name, path, test_args))
}

fn validate_binary_path(raw: String) -> Result<Utf8PathBuf> {
    let path = Utf8PathBuf::from(raw);
    let mut has_file = false;
    for component in path.components() {
        match component {
            Utf8Component::Normal(_) => has_file = true,
            Utf8Component::CurDir => {}
            _ => {
                return Err(ManifestError::InvalidBinary {
                    value: path.to_string(),
                    reason: "path must be relative and must not contain '..'".to_owned(),
                });
            }
        }
    }
    if !has_file {
        return Err(ManifestError::InvalidBinary {
            value: path.to_string(),
            reason: "path is empty".to_owned(),
        });
    }
    Ok(path)
}

fn validate_release(github_repo: String) -> Result<ReleaseSource> {
    let valid = github_repo
        .split_once('/')
        .is_some_and(|(owner, repo)| !owner.is_empty() && !repo.is_empty() && !repo.contains('/'));
    if !valid {
        return Err(ManifestError::InvalidRepository { value: github_repo });
    }
    Ok(ReleaseSource { github_repo })
}
