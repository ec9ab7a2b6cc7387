//! Refreshing manifests from the latest GitHub release.
//!
//! Each manifest entry may carry an `asset` pattern such as
//! `{NAME}-{VERSION}-x86_64-apple-darwin.tar.gz`. Refreshing fetches the
//! repository's latest release, expands every pattern with the new version,
//! finds the asset of exactly that name and takes its download URL and the
//! `sha256:` digest GitHub publishes for it.

use crate::artefact::download::{ArtefactDownloader, DownloadError};
use crate::manifest::ReleaseManifest;
use crate::manifest::digest::Sha256Digest;
use crate::manifest::error::ManifestError;
use crate::manifest::parser::{RawManifest, to_toml_string};
use crate::platform::Platform;
use camino::Utf8Path;
use log::debug;
use serde::Deserialize;
use std::io::Write;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Base URL of the GitHub REST API.
const GITHUB_API: &str = "https://api.github.com";

/// Prefix GitHub uses for SHA-256 asset digests.
const SHA256_PREFIX: &str = "sha256:";

/// Errors raised while refreshing a manifest.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// Neither the manifest nor the command line names a repository.
    #[error("{package} has no release.github_repo; pass --repo")]
    NoRepository {
        /// The package being refreshed.
        package: String,
    },

    /// The repository is not in `owner/name` form.
    #[error("invalid GitHub repository \"{repo}\"; expected owner/name")]
    InvalidRepository {
        /// The rejected value.
        repo: String,
    },

    /// The release metadata could not be downloaded.
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        /// The API URL.
        url: String,
        /// The download failure.
        #[source]
        source: DownloadError,
    },

    /// The release metadata is not the expected JSON.
    #[error("unexpected response from {url}: {source}")]
    Decode {
        /// The API URL.
        url: String,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// An entry has no asset pattern, so it cannot be refreshed.
    #[error("{platform} entry of {package} has no asset pattern")]
    NoAssetPattern {
        /// The package being refreshed.
        package: String,
        /// The entry's platform.
        platform: Platform,
    },

    /// The release has no asset with the expected name.
    #[error("required asset '{asset}' not found in release {tag}")]
    AssetNotFound {
        /// The expanded asset name.
        asset: String,
        /// The release tag.
        tag: String,
    },

    /// The asset has no digest.
    #[error("no digest found for asset '{asset}'")]
    MissingDigest {
        /// The asset name.
        asset: String,
    },

    /// The asset digest is not a SHA-256 digest.
    #[error("invalid digest '{digest}' for asset '{asset}'")]
    InvalidDigest {
        /// The asset name.
        asset: String,
        /// The digest as published.
        digest: String,
    },

    /// The refreshed manifest failed validation or could not be written.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// The parts of a GitHub release the refresh needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GithubRelease {
    /// The release tag, e.g. `v0.5.2`.
    pub tag_name: String,
    /// Files attached to the release.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

/// One file attached to a GitHub release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    /// The file name.
    pub name: String,
    /// Where the file can be downloaded.
    pub browser_download_url: String,
    /// The digest GitHub computed, e.g. `sha256:4e9c...`.
    #[serde(default)]
    pub digest: Option<String>,
}

impl GithubRelease {
    /// The version the tag names, without any leading `v`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tap_installer::release::GithubRelease;
    ///
    /// let release = GithubRelease { tag_name: "v0.5.2".to_owned(), assets: Vec::new() };
    /// assert_eq!(release.version(), "0.5.2");
    /// ```
    #[must_use]
    pub fn version(&self) -> &str {
        self.tag_name.trim_start_matches('v')
    }

    fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

/// The API URL of `repo`'s latest release.
#[must_use]
pub fn latest_release_url(repo: &str) -> String {
    format!("{GITHUB_API}/repos/{repo}/releases/latest")
}

/// Pick the repository to query: `override_repo`, else the manifest's.
///
/// # Errors
///
/// Returns [`ReleaseError::NoRepository`] when neither is set and
/// [`ReleaseError::InvalidRepository`] when the override is malformed.
pub fn repository_for(
    manifest: &ReleaseManifest,
    override_repo: Option<&str>,
) -> Result<String, ReleaseError> {
    match override_repo {
        Some(repo) => {
            let valid = repo.split_once('/').is_some_and(|(owner, name)| {
                !owner.is_empty() && !name.is_empty() && !name.contains('/')
            });
            if valid {
                Ok(repo.to_owned())
            } else {
                Err(ReleaseError::InvalidRepository {
                    repo: repo.to_owned(),
                })
            }
        }
        None => manifest
            .release()
            .map(|release| release.github_repo.clone())
            .ok_or_else(|| ReleaseError::NoRepository {
                package: manifest.name().to_string(),
            }),
    }
}

/// Fetch the latest release of `repo`.
///
/// # Errors
///
/// Returns [`ReleaseError::Fetch`] or [`ReleaseError::Decode`].
pub fn fetch_latest_release(
    repo: &str,
    downloader: &dyn ArtefactDownloader,
) -> Result<GithubRelease, ReleaseError> {
    let url = latest_release_url(repo);
    debug!(target: "release", "GET {url}");
    let body = downloader
        .download_text(&url)
        .map_err(|source| ReleaseError::Fetch {
            url: url.clone(),
            source,
        })?;
    serde_json::from_str(&body).map_err(|source| ReleaseError::Decode { url, source })
}

/// Expand `{NAME}`, `{VERSION}` and `{TARGET}` in an asset pattern.
///
/// # Examples
///
/// ```
/// use tap_installer::platform::{Arch, Os, Platform};
/// use tap_installer::release::resolve_asset_pattern;
///
/// let platform = Platform::new(Os::Linux, Arch::Aarch64);
/// assert_eq!(
///     resolve_asset_pattern("{NAME}-{VERSION}-{TARGET}.tar.gz", "poof", "0.5.2", platform),
///     "poof-0.5.2-aarch64-unknown-linux-gnu.tar.gz"
/// );
/// ```
#[must_use]
pub fn resolve_asset_pattern(
    pattern: &str,
    name: &str,
    version: &str,
    platform: Platform,
) -> String {
    pattern
        .replace("{NAME}", name)
        .replace("{VERSION}", version)
        .replace("{TARGET}", platform.target_triple())
}

/// Build the manifest describing `release`.
///
/// `{NAME}` expands to the last segment of `repo`. Metadata, binary settings
/// and asset patterns carry over unchanged.
///
/// # Errors
///
/// Returns a [`ReleaseError`] naming the first entry that cannot be
/// refreshed, or [`ReleaseError::Manifest`] if the result is invalid.
pub fn refresh_manifest(
    manifest: &ReleaseManifest,
    repo: &str,
    release: &GithubRelease,
) -> Result<ReleaseManifest, ReleaseError> {
    let project = repo.rsplit('/').next().unwrap_or(repo);
    let version = release.version();
    let mut raw = RawManifest::from(manifest);
    raw.version = version.to_owned();

    for (raw_entry, entry) in raw.entries.iter_mut().zip(manifest.entries()) {
        let pattern = entry.asset().ok_or_else(|| ReleaseError::NoAssetPattern {
            package: manifest.name().to_string(),
            platform: entry.platform(),
        })?;
        let asset_name = resolve_asset_pattern(pattern, project, version, entry.platform());
        let asset = release
            .asset(&asset_name)
            .ok_or_else(|| ReleaseError::AssetNotFound {
                asset: asset_name.clone(),
                tag: release.tag_name.clone(),
            })?;
        let checksum = asset_checksum(asset)?;
        debug!(
            target: "release",
            "found asset {} (sha256: {})",
            asset.name,
            checksum.as_str().get(..16).unwrap_or(checksum.as_str())
        );
        raw_entry.url = asset.browser_download_url.clone();
        raw_entry.sha256 = checksum.into_inner();
    }

    Ok(ReleaseManifest::try_from(raw)?)
}

fn asset_checksum(asset: &ReleaseAsset) -> Result<Sha256Digest, ReleaseError> {
    let digest = asset
        .digest
        .as_deref()
        .ok_or_else(|| ReleaseError::MissingDigest {
            asset: asset.name.clone(),
        })?;
    let invalid = || ReleaseError::InvalidDigest {
        asset: asset.name.clone(),
        digest: digest.to_owned(),
    };
    let hex = digest.strip_prefix(SHA256_PREFIX).ok_or_else(invalid)?;
    Sha256Digest::try_from(hex).map_err(|_| invalid())
}

/// Atomically replace the manifest at `path` with `manifest`.
///
/// # Errors
///
/// Returns [`ManifestError::Serialize`] or [`ManifestError::Io`].
pub fn write_manifest(path: &Utf8Path, manifest: &ReleaseManifest) -> Result<(), ManifestError> {
    let text = to_toml_string(manifest)?;
    let io_error = |source| ManifestError::Io {
        path: path.to_owned(),
        source,
    };
    let dir = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    let mut temp = NamedTempFile::new_in(dir).map_err(io_error)?;
    temp.write_all(text.as_bytes()).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path).map_err(|err| io_error(err.error))?;
    debug!(target: "release", "wrote {path}");
    Ok(())
}

#[cfg(test)]
#[path = "release_tests.rs"]
mod tests;
