//! Release archive and manifest downloads.
//!
//! Provides a trait-based abstraction over HTTP(S) and `file://` transfers so
//! tests can script download behaviour without network access. Errors are
//! classified as transient or permanent here; the retry loop in
//! [`super::retry`] only re-attempts the transient ones.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Overall timeout for a single request, including the body transfer.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for establishing a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Size of each body chunk handed from the reader thread.
const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the reader thread and the file writer.
const CHUNK_QUEUE_DEPTH: usize = 4;

/// How often a blocked transfer re-checks the cancel flag.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A transfer that delivers no bytes for this long is abandoned as transient.
const STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// URL prefix for local files.
const FILE_SCHEME: &str = "file://";

/// A shared flag that aborts in-flight downloads when set.
///
/// Cloning yields a handle to the same flag; the CLI hands one clone to the
/// Ctrl-C handler and another to the install pipeline.
///
/// # Examples
///
/// ```
/// use tap_installer::artefact::download::CancelFlag;
///
/// let flag = CancelFlag::new();
/// let handle = flag.clone();
/// handle.cancel();
/// assert!(flag.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a flag in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Return whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Trait for downloading manifests and archives.
///
/// Abstractions allow tests to mock HTTP behaviour without network access.
///
/// # Examples
///
/// ```
/// use tap_installer::artefact::download::HttpDownloader;
///
/// let downloader = HttpDownloader;
/// // Use downloader.download_file(url, dest, &cancel) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactDownloader {
    /// Download a small text document, such as a manifest or API response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is not UTF-8.
    fn download_text(&self, url: &str) -> Result<String, DownloadError>;

    /// Stream `url` into the file at `dest`, returning the bytes written.
    ///
    /// `cancel` is honoured even while the server is stalled mid-body.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Cancelled`] when cancelled mid-transfer, and
    /// transport, status or I/O errors otherwise.
    fn download_file(&self, url: &str, dest: &Path, cancel: &CancelFlag)
    -> Result<u64, DownloadError>;
}

/// Errors arising from download operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// A failure worth retrying: connection trouble, timeouts, 408, 429 or 5xx.
    #[error("download failed for {url}: {reason}")]
    Transient {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested resource does not exist (HTTP 404 or missing file).
    #[error("not found: {url}")]
    NotFound {
        /// The URL that was requested.
        url: String,
    },

    /// The server answered with a status that will not change on retry.
    #[error("download failed for {url}: HTTP status {status}")]
    Status {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The request could not be issued at all (malformed URL and similar).
    #[error("invalid request for {url}: {reason}")]
    Request {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The URL scheme is neither HTTP(S) nor `file://`.
    #[error("unsupported URL scheme: {url}")]
    UnsupportedScheme {
        /// The rejected URL.
        url: String,
    },

    /// The transfer was cancelled.
    #[error("download of {url} cancelled")]
    Cancelled {
        /// The URL being downloaded.
        url: String,
    },

    /// Every retry attempt failed with a transient error.
    #[error("giving up on {url} after {attempts} attempts: {source}")]
    GaveUp {
        /// The URL being downloaded.
        url: String,
        /// How many attempts were made.
        attempts: u32,
        /// The last transient failure.
        #[source]
        source: Box<DownloadError>,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Return whether a retry could plausibly succeed.
    ///
    /// # Examples
    ///
    /// ```
    /// use tap_installer::artefact::download::DownloadError;
    ///
    /// let busy = DownloadError::Status { url: "u".to_owned(), status: 403 };
    /// assert!(!busy.is_transient());
    /// ```
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Downloader using `ureq` for HTTP(S) and the filesystem for `file://`.
pub struct HttpDownloader;

impl ArtefactDownloader for HttpDownloader {
    fn download_text(&self, url: &str) -> Result<String, DownloadError> {
        if let Some(path) = local_path(url) {
            return std::fs::read_to_string(&path).map_err(|err| map_local_error(url, err));
        }
        ensure_http(url)?;
        let response = http_agent()
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        response
            .into_body()
            .read_to_string()
            .map_err(|e| map_ureq_error(url, &e))
    }

    fn download_file(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancelFlag,
    ) -> Result<u64, DownloadError> {
        if let Some(path) = local_path(url) {
            let source = File::open(&path).map_err(|err| map_local_error(url, err))?;
            return copy_with_cancel(url, source, dest, cancel, STALL_TIMEOUT);
        }
        ensure_http(url)?;
        let response = http_agent()
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        let body = response.into_body().into_reader();
        copy_with_cancel(url, body, dest, cancel, STALL_TIMEOUT)
    }
}

/// Copy `reader` into `dest`.
///
/// Reads happen on a helper thread so that neither a cancel request nor a
/// stalled peer has to wait for a blocked `read` to return. A helper left
/// blocked on a dead connection exits once its next read completes.
fn copy_with_cancel<R: Read + Send + 'static>(
    url: &str,
    reader: R,
    dest: &Path,
    cancel: &CancelFlag,
    stall_timeout: Duration,
) -> Result<u64, DownloadError> {
    let mut file = File::create(dest)?;
    let chunks = read_in_background(reader);
    let transient = |reason: String| DownloadError::Transient {
        url: url.to_owned(),
        reason,
    };
    let mut written = 0u64;
    let mut last_progress = Instant::now();
    loop {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled {
                url: url.to_owned(),
            });
        }
        match chunks.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(Ok(chunk)) if chunk.is_empty() => break,
            Ok(Ok(chunk)) => {
                file.write_all(&chunk)?;
                written += chunk.len() as u64;
                last_progress = Instant::now();
            }
            Ok(Err(err)) => return Err(transient(err.to_string())),
            Err(RecvTimeoutError::Timeout) if last_progress.elapsed() >= stall_timeout => {
                return Err(transient(format!(
                    "no data received for {stall_timeout:?}"
                )));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(transient("body reader stopped unexpectedly".to_owned()));
            }
        }
    }
    file.sync_all()?;
    Ok(written)
}

/// Stream `reader` as chunks over a bounded channel; an empty chunk marks
/// the end of the body.
fn read_in_background<R: Read + Send + 'static>(
    mut reader: R,
) -> Receiver<std::io::Result<Vec<u8>>> {
    let (sender, receiver) = mpsc::sync_channel(CHUNK_QUEUE_DEPTH);
    std::thread::spawn(move || {
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            let message = match reader.read(&mut buffer) {
                Ok(read) => Ok(buffer.get(..read).unwrap_or_default().to_vec()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => Err(err),
            };
            let more = matches!(&message, Ok(chunk) if !chunk.is_empty());
            if sender.send(message).is_err() || !more {
                break;
            }
        }
    });
    receiver
}

/// Shared `ureq` agent with request timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

fn ensure_http(url: &str) -> Result<(), DownloadError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(DownloadError::UnsupportedScheme {
            url: url.to_owned(),
        })
    }
}

fn local_path(url: &str) -> Option<PathBuf> {
    url.strip_prefix(FILE_SCHEME).map(PathBuf::from)
}

fn map_local_error(url: &str, err: std::io::Error) -> DownloadError {
    if err.kind() == ErrorKind::NotFound {
        DownloadError::NotFound {
            url: url.to_owned(),
        }
    } else {
        DownloadError::Io(err)
    }
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        ureq::Error::StatusCode(status) if is_transient_status(*status) => {
            DownloadError::Transient {
                url: url.to_owned(),
                reason: format!("HTTP status {status}"),
            }
        }
        ureq::Error::StatusCode(status) => DownloadError::Status {
            url: url.to_owned(),
            status: *status,
        },
        ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::HostNotFound
        | ureq::Error::ConnectionFailed => DownloadError::Transient {
            url: url.to_owned(),
            reason: err.to_string(),
        },
        other => DownloadError::Request {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

const fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::net::TcpListener;

    #[test]
    fn map_ureq_error_maps_404_to_not_found() {
        let err = ureq::Error::StatusCode(404);
        let mapped = map_ureq_error("https://example.test/archive", &err);
        assert!(matches!(mapped, DownloadError::NotFound { .. }));
    }

    #[rstest]
    #[case::request_timeout(408)]
    #[case::too_many_requests(429)]
    #[case::server_error(500)]
    #[case::bad_gateway(502)]
    #[case::unavailable(503)]
    fn retryable_statuses_are_transient(#[case] status: u16) {
        let mapped = map_ureq_error("https://example.test/a", &ureq::Error::StatusCode(status));
        assert!(mapped.is_transient(), "status {status} should be transient");
    }

    #[rstest]
    #[case::forbidden(403)]
    #[case::gone(410)]
    #[case::bad_request(400)]
    fn client_errors_are_permanent(#[case] status: u16) {
        let mapped = map_ureq_error("https://example.test/a", &ureq::Error::StatusCode(status));
        assert!(matches!(mapped, DownloadError::Status { status: s, .. } if s == status));
        assert!(!mapped.is_transient());
    }

    #[test]
    fn connection_failures_are_transient() {
        let mapped = map_ureq_error("https://example.test/a", &ureq::Error::ConnectionFailed);
        assert!(mapped.is_transient());
    }

    #[test]
    fn file_urls_are_copied() {
        let dir = tempfile::tempdir().expect("temp dir");
        let source = dir.path().join("source.bin");
        std::fs::write(&source, b"archive bytes").expect("write source");
        let dest = dir.path().join("dest.bin");
        let url = format!("file://{}", source.display());

        let written = HttpDownloader
            .download_file(&url, &dest, &CancelFlag::new())
            .expect("local copy");

        assert_eq!(written, 13);
        assert_eq!(std::fs::read(&dest).expect("read dest"), b"archive bytes");
    }

    #[test]
    fn missing_file_urls_are_not_found() {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("file://{}", dir.path().join("absent").display());
        let result = HttpDownloader.download_text(&url);
        assert!(matches!(result, Err(DownloadError::NotFound { .. })));
    }

    #[test]
    fn cancelled_copy_stops_before_reading() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = dir.path().join("dest.bin");
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = copy_with_cancel(
            "file:///x",
            std::io::Cursor::new(b"never read".to_vec()),
            &dest,
            &cancel,
            STALL_TIMEOUT,
        );

        assert!(matches!(result, Err(DownloadError::Cancelled { .. })));
    }

    /// A reader that blocks far longer than any test waits.
    struct Stalled;

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(Duration::from_secs(10));
            Ok(0)
        }
    }

    #[test]
    fn stalled_transfer_is_abandoned_as_transient() {
        let dir = tempfile::tempdir().expect("temp dir");
        let started = Instant::now();

        let result = copy_with_cancel(
            "https://example.test/a",
            Stalled,
            &dir.path().join("dest.bin"),
            &CancelFlag::new(),
            Duration::from_millis(200),
        );

        let err = result.expect_err("stalled");
        assert!(err.is_transient(), "{err}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn cancel_interrupts_a_stalled_http_body() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind listener");
        let addr = listener.local_addr().expect("listener address");
        std::thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut request = [0u8; 1024];
            let _read = stream.read(&mut request);
            let _written = stream.write_all(
                b"HTTP/1.1 200 OK\r\nContent-Length: 1000000\r\n\r\npartial",
            );
            std::thread::sleep(Duration::from_secs(10));
        });
        let dir = tempfile::tempdir().expect("temp dir");
        let cancel = CancelFlag::new();
        let trigger = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            trigger.cancel();
        });
        let started = Instant::now();

        let result = HttpDownloader.download_file(
            &format!("http://{addr}/poof.tar.gz"),
            &dir.path().join("poof.tar.gz"),
            &cancel,
        );

        assert!(matches!(result, Err(DownloadError::Cancelled { .. })), "{result:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let result = HttpDownloader.download_text("ftp://example.test/a");
        assert!(matches!(result, Err(DownloadError::UnsupportedScheme { .. })));
    }
}
