//! Shared test utilities for the installer crate.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! integration tests under `tests/`.

use crate::artefact::download::{ArtefactDownloader, CancelFlag, DownloadError};
use crate::artefact::extraction::ArchiveFormat;
use crate::platform::Platform;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Mode given to every file packed by [`build_archive`].
const ENTRY_MODE: u32 = 0o755;

/// Build an in-memory archive of `format` holding `files`.
///
/// Every entry is a regular file with mode `0o755`.
///
/// # Errors
///
/// Returns any error raised by the encoders.
pub fn build_archive(format: ArchiveFormat, files: &[(&str, &[u8])]) -> io::Result<Vec<u8>> {
    match format {
        ArchiveFormat::Tar => build_tar(Vec::new(), files),
        ArchiveFormat::TarGz => {
            let encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            build_tar(encoder, files)?.finish()
        }
        ArchiveFormat::TarZst => build_tar(zstd::Encoder::new(Vec::new(), 0)?, files)?.finish(),
        ArchiveFormat::Zip => build_zip(files),
    }
}

fn build_tar<W: Write>(writer: W, files: &[(&str, &[u8])]) -> io::Result<W> {
    let mut builder = tar::Builder::new(writer);
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(ENTRY_MODE);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append_data(&mut header, name, *contents)?;
    }
    builder.into_inner()
}

fn build_zip(files: &[(&str, &[u8])]) -> io::Result<Vec<u8>> {
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(ENTRY_MODE);
    for (name, contents) in files {
        writer.start_file(*name, options).map_err(io::Error::other)?;
        writer.write_all(contents)?;
    }
    let cursor = writer.finish().map_err(io::Error::other)?;
    Ok(cursor.into_inner())
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Write an executable script called `name` into `dir`.
///
/// The file handle is closed before returning so the script can be run
/// straight away.
///
/// # Errors
///
/// Returns any I/O error from writing or changing permissions.
pub fn write_script(dir: &Path, name: &str, script: &str) -> io::Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, script)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(ENTRY_MODE))?;
    }
    Ok(path)
}

/// A shell script that prints `banner` and exits successfully.
#[must_use]
pub fn fake_tool_script(banner: &str) -> String {
    format!("#!/bin/sh\necho '{banner}'\n")
}

/// A shell script that writes `message` to stderr and exits with status 1.
#[must_use]
pub fn failing_tool_script(message: &str) -> String {
    format!("#!/bin/sh\necho '{message}' >&2\nexit 1\n")
}

/// One `[[entries]]` row for [`manifest_toml`].
#[derive(Debug, Clone)]
pub struct EntrySpec {
    /// The platform the entry serves.
    pub platform: Platform,
    /// The archive URL.
    pub url: String,
    /// The archive digest, as lowercase hex.
    pub sha256: String,
}

impl EntrySpec {
    /// Describe an entry for `platform` at `url` whose archive is `archive`.
    #[must_use]
    pub fn for_archive(platform: Platform, url: impl Into<String>, archive: &[u8]) -> Self {
        Self {
            platform,
            url: url.into(),
            sha256: sha256_hex(archive),
        }
    }
}

/// Render a minimal manifest for `name` at `version` with `entries`.
#[must_use]
pub fn manifest_toml(name: &str, version: &str, entries: &[EntrySpec]) -> String {
    let mut toml = format!("name = \"{name}\"\nversion = \"{version}\"\n");
    for entry in entries {
        toml.push_str(&format!(
            "\n[[entries]]\nos = \"{}\"\narch = \"{}\"\nurl = \"{}\"\nsha256 = \"{}\"\n",
            entry.platform.os, entry.platform.arch, entry.url, entry.sha256
        ));
    }
    toml
}

/// A scripted response for [`ScriptedDownloader`].
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Serve these bytes.
    Bytes(Vec<u8>),
    /// Fail with a retryable error.
    Transient,
    /// Fail with HTTP 404.
    NotFound,
    /// Fail with the given HTTP status.
    Status(u16),
}

/// A thread-safe [`ArtefactDownloader`] that replays scripted responses.
///
/// Each URL has a queue of responses; the last one repeats once the queue
/// is down to a single item. Unknown URLs answer 404. Every request is
/// recorded so tests can assert on network activity.
#[derive(Debug, Default)]
pub struct ScriptedDownloader {
    responses: Mutex<HashMap<String, Vec<ScriptedResponse>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedDownloader {
    /// Create a downloader with no scripted URLs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` for every request to `url`.
    #[must_use]
    pub fn serving(self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.respond(url, ScriptedResponse::Bytes(bytes.into()))
    }

    /// Queue `response` for the next request to `url`.
    #[must_use]
    pub fn respond(self, url: impl Into<String>, response: ScriptedResponse) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.entry(url.into()).or_default().push(response);
        }
        self
    }

    /// Every URL requested so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// How many requests were made.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests().len()
    }

    fn next(&self, url: &str) -> ScriptedResponse {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_owned());
        }
        let Ok(mut responses) = self.responses.lock() else {
            return ScriptedResponse::NotFound;
        };
        match responses.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) => queue.first().cloned().unwrap_or(ScriptedResponse::NotFound),
            None => ScriptedResponse::NotFound,
        }
    }

    fn bytes_for(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        match self.next(url) {
            ScriptedResponse::Bytes(bytes) => Ok(bytes),
            ScriptedResponse::Transient => Err(DownloadError::Transient {
                url: url.to_owned(),
                reason: "connection reset".to_owned(),
            }),
            ScriptedResponse::NotFound => Err(DownloadError::NotFound {
                url: url.to_owned(),
            }),
            ScriptedResponse::Status(status) => Err(DownloadError::Status {
                url: url.to_owned(),
                status,
            }),
        }
    }
}

impl ArtefactDownloader for ScriptedDownloader {
    fn download_text(&self, url: &str) -> Result<String, DownloadError> {
        let bytes = self.bytes_for(url)?;
        String::from_utf8(bytes).map_err(|err| DownloadError::Request {
            url: url.to_owned(),
            reason: err.to_string(),
        })
    }

    fn download_file(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancelFlag,
    ) -> Result<u64, DownloadError> {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled {
                url: url.to_owned(),
            });
        }
        let bytes = self.bytes_for(url)?;
        fs::write(dest, &bytes)?;
        Ok(bytes.len() as u64)
    }
}
