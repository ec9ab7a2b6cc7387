//! Archive fetching into a run's scratch directory.
//!
//! Each attempt streams into a fresh [`NamedTempFile`]; only a complete
//! transfer is persisted under the archive's file name. Failed, cancelled or
//! abandoned attempts drop their temp file, so nothing partial survives.

use super::download::{ArtefactDownloader, CancelFlag, DownloadError};
use super::retry::RetryPolicy;
use crate::manifest::PlatformEntry;
use log::debug;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Fallback file name for URLs without a usable last segment.
const DEFAULT_ARCHIVE_NAME: &str = "archive";

/// Download the archive for `entry` into `scratch`.
///
/// Transient failures are retried according to `retry`.
///
/// # Errors
///
/// Returns the download error that ended the fetch; no file is left behind.
pub fn fetch_archive(
    entry: &PlatformEntry,
    scratch: &Path,
    downloader: &dyn ArtefactDownloader,
    retry: &RetryPolicy,
    cancel: &CancelFlag,
) -> Result<PathBuf, DownloadError> {
    let url = entry.url();
    let dest = archive_path(entry, scratch);
    retry.run(url, cancel, |attempt| {
        debug!(target: "fetch", "GET {url} (attempt {attempt})");
        let temp = NamedTempFile::new_in(scratch)?;
        let bytes = downloader.download_file(url, temp.path(), cancel)?;
        temp.persist(&dest).map_err(|err| DownloadError::Io(err.error))?;
        debug!(target: "fetch", "fetched {bytes} bytes into {}", dest.display());
        Ok(dest.clone())
    })
}

/// The scratch location for `entry`'s archive.
#[must_use]
pub fn archive_path(entry: &PlatformEntry, scratch: &Path) -> PathBuf {
    let name = entry.file_name();
    let safe = if name.is_empty() || name == "." || name == ".." {
        DEFAULT_ARCHIVE_NAME
    } else {
        name
    };
    scratch.join(safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artefact::download::MockArtefactDownloader;
    use crate::manifest::digest::Sha256Digest;
    use crate::platform::{Arch, Os, Platform};
    use mockall::Sequence;
    use tempfile::TempDir;

    const URL: &str = "https://example.test/dl/poof-0.5.2-x86_64-unknown-linux-gnu.tar.gz";

    fn entry() -> PlatformEntry {
        PlatformEntry::new(
            Platform::new(Os::Linux, Arch::X86_64),
            URL.to_owned(),
            Sha256Digest::try_from("a".repeat(64)).expect("valid digest"),
            None,
        )
    }

    fn transient() -> DownloadError {
        DownloadError::Transient {
            url: URL.to_owned(),
            reason: "HTTP status 503".to_owned(),
        }
    }

    fn scratch_files(dir: &TempDir) -> Vec<PathBuf> {
        std::fs::read_dir(dir.path())
            .expect("read scratch")
            .map(|entry| entry.expect("dir entry").path())
            .collect()
    }

    #[test]
    fn retries_transient_failure_then_persists_archive() {
        let scratch = TempDir::new().expect("scratch");
        let mut downloader = MockArtefactDownloader::new();
        let mut seq = Sequence::new();
        downloader
            .expect_download_file()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(transient()));
        downloader
            .expect_download_file()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, dest, _| {
                std::fs::write(dest, b"payload")?;
                Ok(7)
            });

        let path = fetch_archive(
            &entry(),
            scratch.path(),
            &downloader,
            &RetryPolicy::immediate(3),
            &CancelFlag::new(),
        )
        .expect("second attempt succeeds");

        assert_eq!(path, scratch.path().join("poof-0.5.2-x86_64-unknown-linux-gnu.tar.gz"));
        assert_eq!(std::fs::read(&path).expect("read archive"), b"payload");
        assert_eq!(scratch_files(&scratch), vec![path]);
    }

    #[test]
    fn permanent_failure_leaves_no_files() {
        let scratch = TempDir::new().expect("scratch");
        let mut downloader = MockArtefactDownloader::new();
        downloader
            .expect_download_file()
            .times(1)
            .returning(|url, dest, _| {
                std::fs::write(dest, b"partial")?;
                Err(DownloadError::Status {
                    url: url.to_owned(),
                    status: 403,
                })
            });

        let result = fetch_archive(
            &entry(),
            scratch.path(),
            &downloader,
            &RetryPolicy::immediate(3),
            &CancelFlag::new(),
        );

        assert!(matches!(result, Err(DownloadError::Status { status: 403, .. })));
        assert!(scratch_files(&scratch).is_empty());
    }

    #[test]
    fn cancelled_fetch_leaves_no_files() {
        let scratch = TempDir::new().expect("scratch");
        let mut downloader = MockArtefactDownloader::new();
        downloader
            .expect_download_file()
            .times(1)
            .returning(|url, dest, cancel| {
                std::fs::write(dest, b"half")?;
                cancel.cancel();
                Err(DownloadError::Cancelled {
                    url: url.to_owned(),
                })
            });

        let result = fetch_archive(
            &entry(),
            scratch.path(),
            &downloader,
            &RetryPolicy::immediate(3),
            &CancelFlag::new(),
        );

        assert!(matches!(result, Err(DownloadError::Cancelled { .. })));
        assert!(scratch_files(&scratch).is_empty());
    }
}
