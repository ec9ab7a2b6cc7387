//! The install run: resolve, fetch, verify, extract, install, self-test.
//!
//! A run is strictly sequential and moves through [`RunState`]s:
//!
//! ```text
//! Idle -> Resolved -> Fetched -> Verified -> Extracted -> Installed -> Tested -> Done
//! ```
//!
//! Any stage may end the run in [`RunState::Failed`]. Only the fetch stage
//! retries. Every run gets a fresh scratch directory, removed when the run
//! ends however it ends, and installs of the same binary name are serialised
//! by the stager's lock, so independent runs may execute concurrently (see
//! [`install_all`]).

use crate::artefact::cache::DownloadCache;
use crate::artefact::download::{ArtefactDownloader, CancelFlag, HttpDownloader};
use crate::artefact::extraction::{
    ArchiveExtractor, ArchiveFormat, DefaultExtractor, ExtractionError, locate_binary,
};
use crate::artefact::fetch::{archive_path, fetch_archive};
use crate::artefact::retry::RetryPolicy;
use crate::artefact::verification::verify_archive;
use crate::error::{InstallerError, Result};
use crate::manifest::{PlatformEntry, ReleaseManifest};
use crate::output::write_stderr_line;
use crate::platform::Platform;
use crate::resolution::resolve;
use crate::selftest::{SELF_TEST_TIMEOUT, self_test};
use crate::stager::{InstalledBinary, Stager};
use camino::Utf8PathBuf;
use log::{debug, warn};
use std::fmt;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

/// A step of the install run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Select the manifest entry for the platform.
    Resolve,
    /// Download the archive.
    Fetch,
    /// Check the archive digest.
    Verify,
    /// Unpack the archive and locate the binary.
    Extract,
    /// Place the binary in the target directory.
    Install,
    /// Run the installed binary's smoke test.
    SelfTest,
}

impl Stage {
    /// Return the lowercase stage name used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Extract => "extract",
            Self::Install => "install",
            Self::SelfTest => "self-test",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The states an install run passes through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Nothing has happened yet.
    Idle,
    /// An entry matched the platform.
    Resolved,
    /// The archive is in the scratch directory.
    Fetched,
    /// The archive digest matched.
    Verified,
    /// The binary was found in the unpacked archive.
    Extracted,
    /// The binary is at its final path.
    Installed,
    /// The installed binary passed its smoke test.
    Tested,
    /// The run completed successfully.
    Done,
    /// The run stopped; terminal.
    Failed {
        /// The stage that failed.
        stage: Stage,
        /// The failure message.
        reason: String,
    },
}

impl RunState {
    /// Whether the run cannot progress further.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Resolved => f.write_str("resolved"),
            Self::Fetched => f.write_str("fetched"),
            Self::Verified => f.write_str("verified"),
            Self::Extracted => f.write_str("extracted"),
            Self::Installed => f.write_str("installed"),
            Self::Tested => f.write_str("tested"),
            Self::Done => f.write_str("done"),
            Self::Failed { stage, reason } => write!(f, "failed ({stage}: {reason})"),
        }
    }
}

/// Tunables for install runs.
#[derive(Debug, Clone)]
pub struct InstallConfig {
    /// Directory the binary is installed into.
    pub target_dir: Utf8PathBuf,
    /// Verified-download cache directory; `None` disables caching.
    pub cache_dir: Option<PathBuf>,
    /// Retry policy for the fetch stage.
    pub retry: RetryPolicy,
    /// How long the self-test may run.
    pub self_test_timeout: Duration,
    /// Restore the previous binary (or remove the new one) when the
    /// self-test fails.
    pub rollback: bool,
    /// Suppress progress output.
    pub quiet: bool,
}

impl InstallConfig {
    /// Default configuration installing into `target_dir`, without a cache.
    #[must_use]
    pub fn new(target_dir: Utf8PathBuf) -> Self {
        Self {
            target_dir,
            cache_dir: None,
            retry: RetryPolicy::default(),
            self_test_timeout: SELF_TEST_TIMEOUT,
            rollback: false,
            quiet: false,
        }
    }
}

/// One package to install.
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    /// The package manifest.
    pub manifest: &'a ReleaseManifest,
    /// The platform to install for.
    pub platform: Platform,
}

/// Injected collaborators for a run.
pub struct InstallContext<'a> {
    /// Performs downloads.
    pub downloader: &'a dyn ArtefactDownloader,
    /// Unpacks archives.
    pub extractor: &'a dyn ArchiveExtractor,
    /// Aborts the fetch stage when set.
    pub cancel: &'a CancelFlag,
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    /// The installed binary.
    pub path: Utf8PathBuf,
    /// The first line the self-test printed, when it ran.
    pub banner: Option<String>,
    /// Whether the archive came from the download cache.
    pub from_cache: bool,
}

/// The record of one run: every state visited and the outcome.
#[derive(Debug)]
pub struct InstallReport {
    /// The package name.
    pub package: String,
    /// The package version.
    pub version: String,
    /// The platform installed for.
    pub platform: Platform,
    /// States in the order they were entered, starting with `Idle`.
    pub states: Vec<RunState>,
    /// The result of the run.
    pub outcome: Result<InstallOutcome>,
}

impl InstallReport {
    /// The last state entered.
    #[must_use]
    pub fn final_state(&self) -> &RunState {
        self.states.last().unwrap_or(&RunState::Idle)
    }

    /// Whether the run reached `Done`.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.final_state(), RunState::Done)
    }

    /// Convert into the run's result.
    ///
    /// # Errors
    ///
    /// Returns the error that failed the run.
    pub fn into_result(self) -> Result<InstallOutcome> {
        self.outcome
    }
}

/// Run one install with the production downloader and extractor.
pub fn run_install(
    request: &InstallRequest<'_>,
    config: &InstallConfig,
    cancel: &CancelFlag,
    stderr: &mut dyn Write,
) -> InstallReport {
    let context = InstallContext {
        downloader: &HttpDownloader,
        extractor: &DefaultExtractor,
        cancel,
    };
    run_install_with(request, config, &context, stderr)
}

/// Testable inner function with injected dependencies.
///
/// The production entry point [`run_install`] delegates here with real
/// implementations; tests inject scripted downloaders.
pub fn run_install_with(
    request: &InstallRequest<'_>,
    config: &InstallConfig,
    context: &InstallContext<'_>,
    stderr: &mut dyn Write,
) -> InstallReport {
    let mut run = Run {
        request,
        config,
        context,
        stderr,
        states: vec![RunState::Idle],
        pending: Stage::Resolve,
    };
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| run.execute())).unwrap_or_else(
        |_| {
            Err(InstallerError::Panicked {
                stage: run.pending,
            })
        },
    );
    let final_state = match &outcome {
        Ok(_) => RunState::Done,
        Err(err) => RunState::Failed {
            stage: err.stage().unwrap_or(run.pending),
            reason: err.to_string(),
        },
    };
    debug!(
        target: "pipeline",
        "{} {}: {final_state}",
        request.manifest.name(),
        request.manifest.version()
    );
    run.states.push(final_state);
    InstallReport {
        package: request.manifest.name().to_string(),
        version: request.manifest.version().to_string(),
        platform: request.platform,
        states: run.states,
        outcome,
    }
}

/// Run several independent installs on at most `jobs` worker threads.
///
/// Workers take the next pending request as soon as they finish one, so a
/// slow download only holds up its own worker. Each run keeps its own
/// scratch directory; progress output is buffered per run and written to
/// `stderr` in request order. Reports are returned in request order.
pub fn install_all(
    requests: &[InstallRequest<'_>],
    config: &InstallConfig,
    jobs: usize,
    downloader: &(dyn ArtefactDownloader + Sync),
    extractor: &(dyn ArchiveExtractor + Sync),
    cancel: &CancelFlag,
    stderr: &mut dyn Write,
) -> Vec<InstallReport> {
    let next = AtomicUsize::new(0);
    let mut slots: Vec<Option<(InstallReport, Vec<u8>)>> =
        std::iter::repeat_with(|| None).take(requests.len()).collect();
    std::thread::scope(|scope| {
        let next = &next;
        let workers: Vec<_> = (0..jobs.clamp(1, requests.len().max(1)))
            .map(|_| {
                scope.spawn(move || {
                    let context = InstallContext {
                        downloader,
                        extractor,
                        cancel,
                    };
                    let mut finished = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(request) = requests.get(index) else {
                            break finished;
                        };
                        let mut buffer = Vec::new();
                        let report = run_install_with(request, config, &context, &mut buffer);
                        finished.push((index, report, buffer));
                    }
                })
            })
            .collect();
        for worker in workers {
            let finished = worker.join().unwrap_or_else(|payload| std::panic::resume_unwind(payload));
            for (index, report, buffer) in finished {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some((report, buffer));
                }
            }
        }
    });

    let mut reports = Vec::with_capacity(requests.len());
    for (report, buffer) in slots.into_iter().flatten() {
        if stderr.write_all(&buffer).is_err() {
            // Best-effort progress output; the report carries the result.
        }
        reports.push(report);
    }
    reports
}

/// Mutable bookkeeping for a single run.
struct Run<'r, 'a> {
    request: &'r InstallRequest<'a>,
    config: &'r InstallConfig,
    context: &'r InstallContext<'a>,
    stderr: &'r mut dyn Write,
    states: Vec<RunState>,
    pending: Stage,
}

impl Run<'_, '_> {
    fn enter(&mut self, state: RunState, next: Stage) {
        debug!(target: "pipeline", "{} -> {state}", self.request.manifest.name());
        self.states.push(state);
        self.pending = next;
    }

    fn progress(&mut self, message: impl fmt::Display) {
        if !self.config.quiet {
            write_stderr_line(&mut *self.stderr, message);
        }
    }

    fn execute(&mut self) -> Result<InstallOutcome> {
        let manifest = self.request.manifest;
        let platform = self.request.platform;
        self.progress(format_args!(
            "Installing {} {} for {platform}",
            manifest.name(),
            manifest.version()
        ));

        let entry = resolve(manifest, platform)?;
        self.enter(RunState::Resolved, Stage::Fetch);

        let scratch = tempfile::Builder::new()
            .prefix("tap-installer-")
            .tempdir()
            .map_err(|source| InstallerError::Scratch { source })?;
        let (archive, from_cache) = self.fetch_verified(entry, &scratch)?;

        let binary = self.extract(entry, &archive, scratch.path())?;
        self.enter(RunState::Extracted, Stage::Install);

        let file_name = manifest.binary_file_name(platform);
        let stager = Stager::new(self.config.target_dir.clone());
        stager.prepare()?;
        let _lock = stager.lock(&file_name)?;
        self.progress(format_args!("Installing to {}", stager.destination(&file_name)));
        let installed = stager.install(&binary, &file_name, self.config.rollback)?;
        self.enter(RunState::Installed, Stage::SelfTest);

        let banner = if Platform::current() == Some(platform) {
            let args = manifest.binary().test_args();
            self.progress(format_args!("Running {} {}", installed.path(), args.join(" ")));
            match self_test(
                installed.path().as_std_path(),
                args,
                self.config.self_test_timeout,
            ) {
                Ok(banner) => Some(banner),
                Err(err) => {
                    if self.config.rollback {
                        self.roll_back(installed);
                    } else {
                        installed.commit();
                    }
                    return Err(err.into());
                }
            }
        } else {
            warn!(
                target: "pipeline",
                "skipping self-test: {platform} binaries cannot run on this host"
            );
            None
        };
        let path = installed.path().to_owned();
        installed.commit();
        if banner.is_some() {
            self.enter(RunState::Tested, Stage::SelfTest);
        }
        Ok(InstallOutcome {
            path,
            banner,
            from_cache,
        })
    }

    /// Produce a verified archive in `scratch`, from the cache when possible.
    fn fetch_verified(
        &mut self,
        entry: &PlatformEntry,
        scratch: &TempDir,
    ) -> Result<(PathBuf, bool)> {
        let cache = self.config.cache_dir.as_ref().map(DownloadCache::new);
        let cached = cache
            .as_ref()
            .and_then(|cache| self.from_cache(cache, entry, scratch));
        if let Some(cached) = cached {
            match verify_archive(&cached, entry.checksum()) {
                Ok(()) => {
                    self.progress(format_args!("Using cached {}", entry.file_name()));
                    self.enter(RunState::Fetched, Stage::Verify);
                    self.enter(RunState::Verified, Stage::Extract);
                    return Ok((cached, true));
                }
                Err(err) => {
                    warn!(target: "pipeline", "discarding corrupt cache entry: {err}");
                    if let Some(cache) = &cache {
                        if let Err(evict_err) = cache.evict(entry.checksum()) {
                            warn!(target: "pipeline", "failed to evict cache entry: {evict_err}");
                        }
                    }
                }
            }
        }

        self.progress(format_args!("Downloading {}", entry.url()));
        let archive = fetch_archive(
            entry,
            scratch.path(),
            self.context.downloader,
            &self.config.retry,
            self.context.cancel,
        )?;
        self.enter(RunState::Fetched, Stage::Verify);

        self.progress("Verifying checksum");
        verify_archive(&archive, entry.checksum())?;
        self.enter(RunState::Verified, Stage::Extract);

        if let Some(cache) = &cache {
            if let Err(err) = cache.store(entry.checksum(), &archive) {
                warn!(target: "pipeline", "failed to cache {}: {err}", entry.file_name());
            }
        }
        Ok((archive, false))
    }

    fn from_cache(
        &self,
        cache: &DownloadCache,
        entry: &PlatformEntry,
        scratch: &TempDir,
    ) -> Option<PathBuf> {
        let dest = archive_path(entry, scratch.path());
        match cache.restore(entry.checksum(), &dest) {
            Ok(true) => Some(dest),
            Ok(false) => None,
            Err(err) => {
                warn!(target: "pipeline", "ignoring unreadable cache entry: {err}");
                None
            }
        }
    }

    fn extract(
        &mut self,
        entry: &PlatformEntry,
        archive: &Path,
        scratch: &Path,
    ) -> Result<PathBuf> {
        self.progress(format_args!("Extracting {}", entry.file_name()));
        let format = ArchiveFormat::detect(entry.file_name(), archive)?;
        let dest = scratch.join("extracted");
        std::fs::create_dir_all(&dest).map_err(ExtractionError::Io)?;
        let files = self.context.extractor.extract(archive, format, &dest)?;
        let manifest = self.request.manifest;
        let binary = locate_binary(
            &dest,
            &files,
            &manifest.binary_file_name(self.request.platform),
            manifest.binary().path(),
        )?;
        debug!(target: "pipeline", "located binary at {}", binary.display());
        Ok(binary)
    }

    fn roll_back(&mut self, installed: InstalledBinary) {
        let path = installed.path().to_owned();
        let restored = installed.has_backup();
        match installed.rollback() {
            Ok(()) if restored => self.progress(format_args!("Restored previous {path}")),
            Ok(()) => self.progress(format_args!("Removed {path}")),
            Err(err) => warn!(target: "pipeline", "rollback failed: {err}"),
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
