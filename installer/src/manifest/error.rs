//! Error types for manifest loading and validation.
//!
//! Each variant names the offending value and the rule it broke, so a
//! malformed formula fails loudly at load time instead of producing a
//! confusing failure halfway through an install.

use crate::platform::Platform;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors arising from invalid or unreadable release manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The operating system string is not recognized.
    #[error("unknown operating system \"{value}\"; expected macos, linux, or windows")]
    UnknownOs {
        /// The rejected value.
        value: String,
    },

    /// The architecture string is not recognized.
    #[error("unknown architecture \"{value}\"; expected x86_64 or aarch64")]
    UnknownArch {
        /// The rejected value.
        value: String,
    },

    /// A checksum is not a 64-character SHA-256 hex digest.
    #[error("invalid SHA-256 digest \"{value}\": {reason}")]
    InvalidDigest {
        /// The rejected digest string.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The package name is empty or contains forbidden characters.
    #[error("invalid package name \"{value}\": {reason}")]
    InvalidPackageName {
        /// The rejected name.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The version string is not a usable release version.
    #[error("invalid version \"{value}\": {reason}")]
    InvalidVersion {
        /// The rejected version.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The download URL uses an unsupported scheme.
    #[error("invalid download URL \"{url}\": {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// The binary name or in-archive path is unusable.
    #[error("invalid binary location \"{value}\": {reason}")]
    InvalidBinary {
        /// The rejected name or path.
        value: String,
        /// Description of the validation failure.
        reason: String,
    },

    /// Two entries target the same platform.
    #[error("duplicate entry for platform {platform}")]
    DuplicateEntry {
        /// The platform declared more than once.
        platform: Platform,
    },

    /// The manifest declares no platform entries at all.
    #[error("manifest for {package} declares no platform entries")]
    NoEntries {
        /// The package whose manifest is empty.
        package: String,
    },

    /// The TOML document could not be parsed or a field failed validation.
    #[error("failed to parse manifest {origin}: {source}")]
    Parse {
        /// Where the document came from (file path or URL).
        origin: String,
        /// The underlying deserialization error.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// A parsed manifest failed validation.
    #[error("invalid manifest {origin}: {source}")]
    Invalid {
        /// Where the document came from (file path or URL).
        origin: String,
        /// The first validation failure.
        #[source]
        source: Box<ManifestError>,
    },

    /// The release repository is not in `owner/name` form.
    #[error("invalid GitHub repository \"{value}\"; expected owner/name")]
    InvalidRepository {
        /// The rejected value.
        value: String,
    },

    /// The manifest could not be rendered back to TOML.
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The manifest file could not be read or written.
    #[error("failed to access manifest {path}: {source}")]
    Io {
        /// The manifest path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No manifest exists for the requested package.
    #[error("no manifest for package {package} in {source_desc}")]
    NotFound {
        /// The requested package.
        package: String,
        /// Human-readable description of the searched source.
        source_desc: String,
    },

    /// A manifest file declares a different package than the one requested.
    #[error("manifest {origin} describes {found}, not {expected}")]
    NameMismatch {
        /// Where the document came from.
        origin: String,
        /// The requested package.
        expected: String,
        /// The package the manifest actually describes.
        found: String,
    },

    /// The requested version is not the one the manifest describes.
    #[error("{package} {requested} is not available; the manifest provides {available}")]
    VersionMismatch {
        /// The requested package.
        package: String,
        /// The version the caller asked for.
        requested: String,
        /// The version the manifest provides.
        available: String,
    },

    /// A remote manifest could not be fetched.
    #[error("failed to fetch manifest from {url}: {reason}")]
    Fetch {
        /// The manifest URL.
        url: String,
        /// Description of the failure.
        reason: String,
    },

    /// A remote manifest source cannot be written.
    #[error("manifest source {source_desc} is read-only")]
    ReadOnlySource {
        /// Human-readable description of the source.
        source_desc: String,
    },
}

/// Result type alias using [`ManifestError`].
pub type Result<T> = std::result::Result<T, ManifestError>;

impl ManifestError {
    /// Return the innermost validation error, unwrapping [`Self::Invalid`].
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Invalid { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
