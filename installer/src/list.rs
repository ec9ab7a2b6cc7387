//! List command implementation.
//!
//! This module provides the `run_list` command handler: it loads every
//! manifest from the configured source and prints them.

use std::io::Write;

use crate::artefact::download::{ArtefactDownloader, HttpDownloader};
use crate::cli::ListArgs;
use crate::error::{InstallerError, Result};
use crate::list_output::{format_human, format_json};
use crate::manifest::source::ManifestSource;
use crate::platform::Platform;

/// Lists the packages the manifest source provides.
///
/// Output is written to stdout (human-readable by default, JSON with `--json`).
///
/// # Errors
///
/// Returns an error if:
/// - A manifest cannot be read, fetched or parsed
/// - Writing to stdout fails
pub fn run_list(args: &ListArgs, stdout: &mut dyn Write) -> Result<()> {
    run_list_with(args, stdout, &HttpDownloader, Platform::current())
}

/// Internal implementation with injectable downloader and host for testability.
fn run_list_with(
    args: &ListArgs,
    stdout: &mut dyn Write,
    downloader: &dyn ArtefactDownloader,
    host: Option<Platform>,
) -> Result<()> {
    let source = ManifestSource::from_arg(args.manifest.as_deref());
    let manifests = source.load_all(downloader)?;

    let output = if args.json {
        format_json(&manifests, host)
    } else {
        format_human(&manifests, host)
    };

    writeln!(stdout, "{output}").map_err(|e| InstallerError::WriteFailed { source: e })?;

    Ok(())
}
