//! Release manifests: which archive to install on which platform.
//!
//! A [`ReleaseManifest`] describes one version of one package. It maps each
//! supported [`Platform`] to exactly one [`PlatformEntry`] holding the
//! archive URL and its SHA-256 digest. Manifests are loaded from TOML
//! (see [`parser`]) through a [`source::ManifestSource`], validated once, and
//! never mutated afterwards; producing an updated manifest means building a
//! new one from a [`parser::RawManifest`].

pub mod digest;
pub mod error;
pub mod package;
pub mod parser;
pub mod source;

use crate::platform::Platform;
use camino::{Utf8Path, Utf8PathBuf};
use digest::Sha256Digest;
use error::{ManifestError, Result};
use package::{PackageName, PackageVersion};
use std::collections::BTreeMap;

/// Arguments passed to the installed binary when no others are configured.
pub const DEFAULT_TEST_ARGS: &[&str] = &["--version"];

/// One downloadable archive for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformEntry {
    platform: Platform,
    url: String,
    checksum: Sha256Digest,
    asset: Option<String>,
}

impl PlatformEntry {
    /// Create an entry. URL validation happens in the manifest parser.
    #[must_use]
    pub const fn new(
        platform: Platform,
        url: String,
        checksum: Sha256Digest,
        asset: Option<String>,
    ) -> Self {
        Self {
            platform,
            url,
            checksum,
            asset,
        }
    }

    /// The platform this archive targets.
    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// The archive download URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The expected SHA-256 digest of the archive.
    #[must_use]
    pub const fn checksum(&self) -> &Sha256Digest {
        &self.checksum
    }

    /// The release asset name pattern used by `update`, if any.
    #[must_use]
    pub fn asset(&self) -> Option<&str> {
        self.asset.as_deref()
    }

    /// The archive file name, taken from the last URL path segment.
    ///
    /// # Examples
    ///
    /// ```
    /// use tap_installer::manifest::PlatformEntry;
    /// use tap_installer::manifest::digest::Sha256Digest;
    /// use tap_installer::platform::{Arch, Os, Platform};
    ///
    /// let entry = PlatformEntry::new(
    ///     Platform::new(Os::Linux, Arch::X86_64),
    ///     "https://example.com/dl/poof-0.5.2.tar.gz?raw=1".to_owned(),
    ///     Sha256Digest::try_from("a".repeat(64)).expect("valid"),
    ///     None,
    /// );
    /// assert_eq!(entry.file_name(), "poof-0.5.2.tar.gz");
    /// ```
    #[must_use]
    pub fn file_name(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().unwrap_or_default()
    }
}

/// Where the executable lives inside the archive and how to smoke-test it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinarySpec {
    name: String,
    path: Option<Utf8PathBuf>,
    test_args: Vec<String>,
}

impl BinarySpec {
    /// Create the binary settings.
    #[must_use]
    pub const fn new(name: String, path: Option<Utf8PathBuf>, test_args: Vec<String>) -> Self {
        Self {
            name,
            path,
            test_args,
        }
    }

    /// The installed binary name (without any `.exe` suffix).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The relative location inside the archive, when not found by name.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    /// Arguments for the post-install self-test.
    #[must_use]
    pub fn test_args(&self) -> &[String] {
        &self.test_args
    }
}

/// Descriptive fields shown by `list`. They do not affect installation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageMetadata {
    /// One-line package description.
    pub description: Option<String>,
    /// Project homepage.
    pub homepage: Option<String>,
    /// SPDX licence identifier.
    pub license: Option<String>,
}

/// The upstream release feed a manifest can be refreshed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSource {
    /// GitHub repository in `owner/name` form.
    pub github_repo: String,
}

/// One installable package version with its per-platform archives.
///
/// # Examples
///
/// ```
/// use tap_installer::manifest::parser::parse_manifest;
/// use tap_installer::platform::{Arch, Os, Platform};
///
/// let toml = format!(
///     r#"
/// name = "poof"
/// version = "0.5.2"
///
/// [[entries]]
/// os = "linux"
/// arch = "x86_64"
/// url = "https://example.com/poof.tar.gz"
/// sha256 = "{}"
/// "#,
///     "0".repeat(64)
/// );
/// let manifest = parse_manifest(&toml, "poof.toml").expect("valid manifest");
/// let linux = Platform::new(Os::Linux, Arch::X86_64);
/// assert!(manifest.entry_for(linux).is_some());
/// assert!(manifest.entry_for(Platform::new(Os::Linux, Arch::Aarch64)).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseManifest {
    name: PackageName,
    version: PackageVersion,
    metadata: PackageMetadata,
    binary: BinarySpec,
    release: Option<ReleaseSource>,
    entries: BTreeMap<Platform, PlatformEntry>,
}

impl ReleaseManifest {
    /// Assemble a manifest from validated parts.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::DuplicateEntry`] when two entries share a
    /// platform, or [`ManifestError::NoEntries`] when there are none.
    pub fn new(
        name: PackageName,
        version: PackageVersion,
        metadata: PackageMetadata,
        binary: BinarySpec,
        release: Option<ReleaseSource>,
        entries: Vec<PlatformEntry>,
    ) -> Result<Self> {
        if entries.is_empty() {
            return Err(ManifestError::NoEntries {
                package: name.to_string(),
            });
        }
        let mut by_platform = BTreeMap::new();
        for entry in entries {
            let platform = entry.platform();
            if by_platform.insert(platform, entry).is_some() {
                return Err(ManifestError::DuplicateEntry { platform });
            }
        }
        Ok(Self {
            name,
            version,
            metadata,
            binary,
            release,
            entries: by_platform,
        })
    }

    /// The package identifier.
    #[must_use]
    pub const fn name(&self) -> &PackageName {
        &self.name
    }

    /// The release version.
    #[must_use]
    pub const fn version(&self) -> &PackageVersion {
        &self.version
    }

    /// Descriptive metadata.
    #[must_use]
    pub const fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    /// The binary settings.
    #[must_use]
    pub const fn binary(&self) -> &BinarySpec {
        &self.binary
    }

    /// The upstream release feed, when declared.
    #[must_use]
    pub const fn release(&self) -> Option<&ReleaseSource> {
        self.release.as_ref()
    }

    /// Look up the entry for `platform`. There is no fallback.
    #[must_use]
    pub fn entry_for(&self, platform: Platform) -> Option<&PlatformEntry> {
        self.entries.get(&platform)
    }

    /// Iterate over all entries in platform order.
    pub fn entries(&self) -> impl Iterator<Item = &PlatformEntry> {
        self.entries.values()
    }

    /// The platforms this manifest provides archives for, in sorted order.
    #[must_use]
    pub fn supported_platforms(&self) -> Vec<Platform> {
        self.entries.keys().copied().collect()
    }

    /// The executable file name on `platform`, e.g. `poof` or `poof.exe`.
    #[must_use]
    pub fn binary_file_name(&self, platform: Platform) -> String {
        platform.os.executable_name(self.binary.name())
    }

    /// Check that this manifest provides `requested`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::VersionMismatch`] when the versions differ.
    pub fn ensure_version(&self, requested: &PackageVersion) -> Result<()> {
        if &self.version == requested {
            return Ok(());
        }
        Err(ManifestError::VersionMismatch {
            package: self.name.to_string(),
            requested: requested.to_string(),
            available: self.version.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
