//! Checksum verification for downloaded archives.
//!
//! An archive is only handed to extraction after its SHA-256 digest matches
//! the manifest. A mismatching file is deleted immediately so nothing later
//! in the run (or a later run reusing the scratch directory) can pick it up.

use crate::manifest::digest::Sha256Digest;
use log::debug;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Errors arising from archive verification.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// The archive digest differs from the manifest.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    Mismatch {
        /// The rejected archive (already deleted).
        path: PathBuf,
        /// The digest recorded in the manifest.
        expected: Sha256Digest,
        /// The digest of the downloaded bytes.
        actual: Sha256Digest,
    },

    /// The archive could not be read.
    #[error("failed to read {} for verification: {source}", path.display())]
    Io {
        /// The archive path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Compute the SHA-256 digest of a file.
///
/// Reads the file at `path` in chunks and returns the lowercase hex
/// digest as a validated [`Sha256Digest`].
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn compute_sha256(path: &Path) -> std::io::Result<Sha256Digest> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(buffer.get(..bytes_read).unwrap_or_default());
    }
    Ok(Sha256Digest::from_hasher_hex(format!(
        "{:x}",
        hasher.finalize()
    )))
}

/// Verify the archive at `path` against `expected`.
///
/// The comparison ignores hex case. On mismatch the file is removed before
/// the error is returned.
///
/// # Errors
///
/// Returns [`VerificationError::Mismatch`] when the digests differ, or
/// [`VerificationError::Io`] when the file cannot be read.
pub fn verify_archive(path: &Path, expected: &Sha256Digest) -> Result<(), VerificationError> {
    let actual = compute_sha256(path).map_err(|source| VerificationError::Io {
        path: path.to_owned(),
        source,
    })?;
    if expected.matches(actual.as_str()) {
        debug!(target: "verify", "{} matches {expected}", path.display());
        return Ok(());
    }
    if let Err(err) = fs::remove_file(path) {
        debug!(target: "verify", "could not remove {}: {err}", path.display());
    }
    Err(VerificationError::Mismatch {
        path: path.to_owned(),
        expected: expected.clone(),
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    /// SHA-256 of the bytes `hello world`.
    const HELLO_SHA: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[fixture]
    fn archive() -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("poof.tar.gz");
        fs::write(&path, b"hello world").expect("write archive");
        (dir, path)
    }

    #[rstest]
    fn computes_known_digest(archive: (TempDir, PathBuf)) {
        let (_dir, path) = archive;
        assert_eq!(compute_sha256(&path).expect("digest").as_str(), HELLO_SHA);
    }

    #[rstest]
    #[case::lowercase(HELLO_SHA.to_owned())]
    #[case::uppercase(HELLO_SHA.to_ascii_uppercase())]
    fn accepts_matching_digest_in_any_case(archive: (TempDir, PathBuf), #[case] hex: String) {
        let (_dir, path) = archive;
        let expected = Sha256Digest::try_from(hex).expect("valid digest");
        verify_archive(&path, &expected).expect("digest matches");
        assert!(path.exists());
    }

    #[rstest]
    fn rejects_single_flipped_character_and_deletes_file(archive: (TempDir, PathBuf)) {
        let (_dir, path) = archive;
        let mut flipped = HELLO_SHA.to_owned();
        flipped.pop();
        flipped.push('8');
        let expected = Sha256Digest::try_from(flipped).expect("valid digest");

        let err = verify_archive(&path, &expected).expect_err("mismatch");

        assert!(matches!(err, VerificationError::Mismatch { .. }));
        assert!(!path.exists(), "mismatching archive must be deleted");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = TempDir::new().expect("temp dir");
        let expected = Sha256Digest::try_from(HELLO_SHA).expect("valid digest");
        let result = verify_archive(&dir.path().join("absent"), &expected);
        assert!(matches!(result, Err(VerificationError::Io { .. })));
    }
}
