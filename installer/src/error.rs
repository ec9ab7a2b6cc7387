//! Error types for the tap installer.
//!
//! Every failure inside an install run maps to one [`InstallerError`] variant
//! that knows which pipeline [`Stage`] it belongs to, so the CLI can prefix
//! its message with the stage (`verify: checksum mismatch for ...`).

use crate::artefact::download::DownloadError;
use crate::artefact::extraction::ExtractionError;
use crate::artefact::verification::VerificationError;
use crate::manifest::digest::Sha256Digest;
use crate::manifest::error::ManifestError;
use crate::pipeline::Stage;
use crate::release::ReleaseError;
use crate::selftest::SelfTestError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during the installation process.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The manifest has no entry for the requested platform.
    #[error("{package} has no release for {platform}; supported: {supported}")]
    UnsupportedPlatform {
        /// The package being installed.
        package: String,
        /// The requested platform.
        platform: String,
        /// Comma-separated list of platforms the manifest provides.
        supported: String,
    },

    /// The host OS or architecture has no prebuilt release support.
    #[error("unsupported host platform {os}/{arch}; pass --os and --arch explicitly")]
    UnknownHostPlatform {
        /// The host operating system.
        os: &'static str,
        /// The host architecture.
        arch: &'static str,
    },

    /// The archive could not be downloaded.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The scratch directory for the run could not be created.
    #[error("failed to create scratch directory: {source}")]
    Scratch {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The downloaded archive does not match the manifest digest.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        /// The rejected archive (already deleted).
        path: PathBuf,
        /// The digest recorded in the manifest.
        expected: Sha256Digest,
        /// The digest of the downloaded bytes.
        actual: Sha256Digest,
    },

    /// The downloaded archive could not be read for verification.
    #[error("failed to read {} for verification: {source}", path.display())]
    ArchiveUnreadable {
        /// The archive path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The archive could not be unpacked or the binary was not found in it.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The target directory or binary could not be created, written or
    /// made executable.
    #[error("cannot write {}: {source}", path.display())]
    Permission {
        /// The path being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The per-binary install lock could not be acquired.
    #[error("failed to lock {}: {source}", path.display())]
    Lock {
        /// The lock file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The installed binary failed its smoke test.
    #[error(transparent)]
    SelfTest(#[from] SelfTestError),

    /// A manifest could not be loaded or failed validation.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The latest upstream release could not be resolved.
    #[error(transparent)]
    Release(#[from] ReleaseError),

    /// No default binary directory could be determined.
    #[error("cannot determine a binary directory; pass --target-dir")]
    NoBinDir,

    /// Some of several installs failed; each failure was reported already.
    #[error("{failed} of {total} installs failed")]
    InstallsFailed {
        /// How many runs failed.
        failed: usize,
        /// How many runs there were.
        total: usize,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An install run panicked after reaching `stage`.
    #[error("install run panicked")]
    Panicked {
        /// The stage the run was in when it panicked.
        stage: Stage,
    },

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },
}

impl InstallerError {
    /// The pipeline stage this error belongs to, if it arose inside a run.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::UnsupportedPlatform { .. } | Self::UnknownHostPlatform { .. } => {
                Some(Stage::Resolve)
            }
            Self::Download(_) | Self::Scratch { .. } => Some(Stage::Fetch),
            Self::ChecksumMismatch { .. } | Self::ArchiveUnreadable { .. } => Some(Stage::Verify),
            Self::Extraction(_) => Some(Stage::Extract),
            Self::Permission { .. } | Self::Lock { .. } => Some(Stage::Install),
            Self::SelfTest(_) => Some(Stage::SelfTest),
            Self::Panicked { stage } => Some(*stage),
            Self::Manifest(_)
            | Self::Release(_)
            | Self::NoBinDir
            | Self::InstallsFailed { .. }
            | Self::Io(_)
            | Self::WriteFailed { .. } => None,
        }
    }

    /// The message prefixed with the failing stage, e.g.
    /// `verify: checksum mismatch for ...`.
    #[must_use]
    pub fn tagged_message(&self) -> String {
        match self.stage() {
            Some(stage) => format!("{stage}: {self}"),
            None => self.to_string(),
        }
    }
}

impl From<VerificationError> for InstallerError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::Mismatch {
                path,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                path,
                expected,
                actual,
            },
            VerificationError::Io { path, source } => Self::ArchiveUnreadable { path, source },
        }
    }
}

/// Result type alias for installer operations.
pub type Result<T> = std::result::Result<T, InstallerError>;
