//! Platform directory lookup.
//!
//! The installer needs two well-known locations: the directory binaries are
//! installed into and the download cache. Both come from a [`BaseDirs`]
//! implementation so tests can substitute their own.

use crate::error::{InstallerError, Result};
use camino::Utf8PathBuf;
use std::path::PathBuf;

/// Subdirectory of the user's cache directory owned by the installer.
const CACHE_SUBDIR: &str = "tap-installer";

/// Source of platform directories.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// The user's home directory.
    fn home_dir(&self) -> Option<PathBuf>;

    /// The directory user-installed executables live in.
    fn bin_dir(&self) -> Option<PathBuf>;

    /// The user's cache directory.
    fn cache_dir(&self) -> Option<PathBuf>;
}

/// [`BaseDirs`] backed by the operating system's conventions.
#[derive(Debug, Clone)]
pub struct SystemBaseDirs {
    inner: directories_next::BaseDirs,
}

impl SystemBaseDirs {
    /// Look up the current user's directories.
    ///
    /// Returns `None` when no home directory can be found.
    #[must_use]
    pub fn new() -> Option<Self> {
        directories_next::BaseDirs::new().map(|inner| Self { inner })
    }
}

impl BaseDirs for SystemBaseDirs {
    fn home_dir(&self) -> Option<PathBuf> {
        Some(self.inner.home_dir().to_path_buf())
    }

    fn bin_dir(&self) -> Option<PathBuf> {
        self.inner
            .executable_dir()
            .map(PathBuf::from)
            .or_else(|| self.home_dir().map(|home| home.join(".local").join("bin")))
    }

    fn cache_dir(&self) -> Option<PathBuf> {
        Some(self.inner.cache_dir().to_path_buf())
    }
}

/// The default install directory, `~/.local/bin` on most systems.
///
/// # Errors
///
/// Returns [`InstallerError::NoBinDir`] when no directory is known or it is
/// not valid UTF-8.
pub fn default_bin_dir(dirs: &dyn BaseDirs) -> Result<Utf8PathBuf> {
    let dir = dirs.bin_dir().ok_or(InstallerError::NoBinDir)?;
    Utf8PathBuf::from_path_buf(dir).map_err(|_| InstallerError::NoBinDir)
}

/// The download cache directory, `<cache>/tap-installer/downloads`.
#[must_use]
pub fn default_cache_dir(dirs: &dyn BaseDirs) -> Option<PathBuf> {
    dirs.cache_dir()
        .map(|cache| cache.join(CACHE_SUBDIR).join("downloads"))
}
