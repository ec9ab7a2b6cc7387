//! Atomic placement of the extracted binary in the target directory.
//!
//! The binary is copied into a temporary file next to its final location,
//! made executable and synced, then renamed over the destination. Readers
//! therefore see either the previous binary or the complete new one, never
//! a truncated or non-executable file. Installs of the same binary are
//! serialised through an advisory lock file.

use crate::error::{InstallerError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use tempfile::NamedTempFile;

/// Mode given to installed binaries on Unix.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Handles installation of binaries into the target directory.
pub struct Stager {
    target_dir: Utf8PathBuf,
}

impl Stager {
    /// Create a new stager for `target_dir`.
    #[must_use]
    pub const fn new(target_dir: Utf8PathBuf) -> Self {
        Self { target_dir }
    }

    /// Return the target directory.
    #[must_use]
    pub fn target_dir(&self) -> &Utf8Path {
        &self.target_dir
    }

    /// Return the final path of the binary called `file_name`.
    #[must_use]
    pub fn destination(&self, file_name: &str) -> Utf8PathBuf {
        self.target_dir.join(file_name)
    }

    /// Ensure the target directory exists and is writable.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Permission`] if the directory cannot be
    /// created or a file cannot be created inside it.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.target_dir)
            .map_err(|source| permission(&self.target_dir, source))?;
        NamedTempFile::new_in(&self.target_dir)
            .map(drop)
            .map_err(|source| permission(&self.target_dir, source))
    }

    /// Take the exclusive install lock for `file_name`, blocking until free.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Lock`] if the lock file cannot be opened or
    /// locked.
    pub fn lock(&self, file_name: &str) -> Result<InstallLock> {
        let path = self.target_dir.join(format!(".{file_name}.lock"));
        let lock_error = |source| InstallerError::Lock {
            path: path.clone().into_std_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(lock_error)?;
        file.lock_exclusive().map_err(lock_error)?;
        debug!(target: "install", "locked {path}");
        Ok(InstallLock { file, path })
    }

    /// Atomically install `extracted` as `<target_dir>/<file_name>`.
    ///
    /// With `keep_backup`, a copy of any binary being replaced is retained
    /// so [`InstalledBinary::rollback`] can restore it.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Permission`] if any step of the copy,
    /// chmod, sync or rename fails. The destination is untouched then.
    pub fn install(
        &self,
        extracted: &Path,
        file_name: &str,
        keep_backup: bool,
    ) -> Result<InstalledBinary> {
        let dest = self.destination(file_name);
        let backup = if keep_backup && dest.is_file() {
            Some(self.backup(&dest)?)
        } else {
            None
        };

        let mut temp = NamedTempFile::new_in(&self.target_dir)
            .map_err(|source| permission(&self.target_dir, source))?;
        let mut source = File::open(extracted).map_err(|err| permission(extracted, err))?;
        io::copy(&mut source, temp.as_file_mut()).map_err(|err| permission(temp.path(), err))?;
        make_executable(temp.as_file()).map_err(|err| permission(temp.path(), err))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| permission(temp.path(), err))?;
        temp.persist(&dest)
            .map_err(|err| permission(&dest, err.error))?;

        debug!(target: "install", "installed {dest}");
        Ok(InstalledBinary { path: dest, backup })
    }

    fn backup(&self, dest: &Utf8Path) -> Result<NamedTempFile> {
        let backup = NamedTempFile::new_in(&self.target_dir)
            .map_err(|source| permission(&self.target_dir, source))?;
        fs::copy(dest, backup.path()).map_err(|source| permission(backup.path(), source))?;
        Ok(backup)
    }
}

/// An exclusive advisory lock on one binary name, released on drop.
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: Utf8PathBuf,
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(target: "install", "failed to unlock {}: {err}", self.path);
        }
    }
}

/// A binary that has been placed at its final path.
#[derive(Debug)]
pub struct InstalledBinary {
    path: Utf8PathBuf,
    backup: Option<NamedTempFile>,
}

impl InstalledBinary {
    /// The installed binary's path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Whether a previous binary was saved for rollback.
    #[must_use]
    pub const fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// Keep the new binary and discard any backup.
    pub fn commit(self) {
        debug!(target: "install", "committed {}", self.path);
    }

    /// Undo the install: restore the previous binary, or remove the new one
    /// when nothing was replaced.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Permission`] if the restore or removal fails.
    pub fn rollback(self) -> Result<()> {
        match self.backup {
            Some(backup) => {
                backup
                    .persist(&self.path)
                    .map_err(|err| permission(&self.path, err.error))?;
                debug!(target: "install", "restored previous {}", self.path);
            }
            None => {
                fs::remove_file(&self.path).map_err(|source| permission(&self.path, source))?;
                debug!(target: "install", "removed {}", self.path);
            }
        }
        Ok(())
    }
}

fn permission(path: impl AsRef<Path>, source: io::Error) -> InstallerError {
    InstallerError::Permission {
        path: path.as_ref().to_path_buf(),
        source,
    }
}

#[cfg(unix)]
fn make_executable(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(EXECUTABLE_MODE))
}

#[cfg(not(unix))]
fn make_executable(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "stager_tests.rs"]
mod tests;
