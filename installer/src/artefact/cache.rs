//! Verified-download cache keyed by archive checksum.
//!
//! Archives land here only after they passed verification, stored under
//! their SHA-256 digest. A hit is still re-verified by the pipeline before
//! use; a corrupt entry is evicted and the archive fetched again.

use crate::manifest::digest::Sha256Digest;
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A directory of verified archives named by digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadCache {
    root: PathBuf,
}

impl DownloadCache {
    /// Use `root` as the cache directory. It is created on first store.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The cache directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The path an archive with `digest` is stored at.
    #[must_use]
    pub fn entry_path(&self, digest: &Sha256Digest) -> PathBuf {
        self.root.join(digest.as_str())
    }

    /// Copy a cached archive to `dest`, returning whether there was a hit.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a present entry cannot be copied.
    pub fn restore(&self, digest: &Sha256Digest, dest: &Path) -> io::Result<bool> {
        let cached = self.entry_path(digest);
        if !cached.is_file() {
            return Ok(false);
        }
        fs::copy(&cached, dest)?;
        debug!(target: "cache", "cache hit for {digest}");
        Ok(true)
    }

    /// Store a verified archive under `digest`.
    ///
    /// The copy goes through a temporary file in the cache directory and is
    /// renamed into place, so concurrent readers never see a partial entry.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the cache directory or entry cannot be written.
    pub fn store(&self, digest: &Sha256Digest, archive: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let mut temp = NamedTempFile::new_in(&self.root)?;
        io::copy(&mut fs::File::open(archive)?, temp.as_file_mut())?;
        temp.as_file().sync_all()?;
        let path = self.entry_path(digest);
        temp.persist(&path).map_err(|err| err.error)?;
        debug!(target: "cache", "cached {digest} at {}", path.display());
        Ok(path)
    }

    /// Remove the entry for `digest`, if any.
    ///
    /// # Errors
    ///
    /// Returns an I/O error other than "not found".
    pub fn evict(&self, digest: &Sha256Digest) -> io::Result<()> {
        match fs::remove_file(self.entry_path(digest)) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn digest() -> Sha256Digest {
        Sha256Digest::try_from("f".repeat(64)).expect("valid digest")
    }

    #[test]
    fn store_then_restore_round_trips_bytes() {
        let dir = TempDir::new().expect("temp dir");
        let cache = DownloadCache::new(dir.path().join("cache"));
        let archive = dir.path().join("a.tar.gz");
        fs::write(&archive, b"archive").expect("write archive");

        cache.store(&digest(), &archive).expect("store");
        let dest = dir.path().join("restored");
        assert!(cache.restore(&digest(), &dest).expect("restore"));
        assert_eq!(fs::read(dest).expect("read"), b"archive");
    }

    #[test]
    fn miss_leaves_destination_untouched() {
        let dir = TempDir::new().expect("temp dir");
        let cache = DownloadCache::new(dir.path());
        let dest = dir.path().join("restored");
        assert!(!cache.restore(&digest(), &dest).expect("miss"));
        assert!(!dest.exists());
    }

    #[test]
    fn evict_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let cache = DownloadCache::new(dir.path());
        fs::write(cache.entry_path(&digest()), b"stale").expect("seed entry");
        cache.evict(&digest()).expect("first evict");
        cache.evict(&digest()).expect("second evict");
        assert!(!cache.entry_path(&digest()).exists());
    }
}
