//! Install-command helpers for the installer binary.
//!
//! This module keeps manifest loading, configuration and report summaries
//! separate from CLI dispatch in `main.rs`.

use std::io::Write;
use tap_installer::artefact::download::{ArtefactDownloader, CancelFlag};
use tap_installer::artefact::extraction::ArchiveExtractor;
use tap_installer::cli::InstallArgs;
use tap_installer::dirs::{BaseDirs, default_bin_dir, default_cache_dir};
use tap_installer::error::{InstallerError, Result};
use tap_installer::manifest::ReleaseManifest;
use tap_installer::manifest::package::{PackageName, PackageVersion};
use tap_installer::manifest::source::ManifestSource;
use tap_installer::output::{DryRunInfo, success_message, write_stderr_line};
use tap_installer::pipeline::{
    InstallConfig, InstallContext, InstallReport, InstallRequest, install_all, run_install_with,
};
use tap_installer::platform::Platform;
use tap_installer::resolution::{resolve, target_platform};

/// Collaborators the install command runs against.
pub(crate) struct InstallEnvironment<'a> {
    /// Platform directory lookup; `None` when no home directory exists.
    pub(crate) dirs: Option<&'a dyn BaseDirs>,
    /// Fetches manifests and archives.
    pub(crate) downloader: &'a (dyn ArtefactDownloader + Sync),
    /// Unpacks archives.
    pub(crate) extractor: &'a (dyn ArchiveExtractor + Sync),
    /// Set by Ctrl-C.
    pub(crate) cancel: &'a CancelFlag,
}

/// Run `install` for one package or, with `--all`, every package.
pub(crate) fn run_install_command(
    args: &InstallArgs,
    quiet: bool,
    env: &InstallEnvironment<'_>,
    stderr: &mut dyn Write,
) -> Result<()> {
    let platform = target_platform(args.os, args.arch)?;
    let config = install_config(args, quiet, env.dirs)?;
    let source = ManifestSource::from_arg(args.manifest.as_deref());
    let manifests = load_manifests(args, &source, env.downloader)?;

    if args.dry_run {
        for manifest in &manifests {
            print_dry_run(manifest, platform, &config, stderr)?;
        }
        return Ok(());
    }

    let requests: Vec<_> = manifests
        .iter()
        .map(|manifest| InstallRequest { manifest, platform })
        .collect();
    let reports = match requests.as_slice() {
        [request] => {
            let context = InstallContext {
                downloader: env.downloader,
                extractor: env.extractor,
                cancel: env.cancel,
            };
            vec![run_install_with(request, &config, &context, stderr)]
        }
        _ => install_all(
            &requests,
            &config,
            args.jobs,
            env.downloader,
            env.extractor,
            env.cancel,
            stderr,
        ),
    };
    summarise(reports, quiet, stderr)
}

/// Build the run configuration from CLI flags and platform directories.
pub(crate) fn install_config(
    args: &InstallArgs,
    quiet: bool,
    dirs: Option<&dyn BaseDirs>,
) -> Result<InstallConfig> {
    let target_dir = match (&args.target_dir, dirs) {
        (Some(dir), _) => dir.clone(),
        (None, Some(dirs)) => default_bin_dir(dirs)?,
        (None, None) => return Err(InstallerError::NoBinDir),
    };
    let mut config = InstallConfig::new(target_dir);
    if !args.no_cache {
        config.cache_dir = dirs.and_then(default_cache_dir);
    }
    config.rollback = args.rollback;
    config.quiet = quiet;
    Ok(config)
}

/// Load the manifests the command line asks for.
pub(crate) fn load_manifests(
    args: &InstallArgs,
    source: &ManifestSource,
    downloader: &dyn ArtefactDownloader,
) -> Result<Vec<ReleaseManifest>> {
    let Some(package) = args.package.as_deref().filter(|_| !args.all) else {
        return Ok(source.load_all(downloader)?);
    };
    let name = PackageName::try_from(package)?;
    let manifest = source.load(&name, downloader)?;
    if let Some(version) = args.version.as_deref() {
        manifest.ensure_version(&PackageVersion::try_from(version)?)?;
    }
    Ok(vec![manifest])
}

fn print_dry_run(
    manifest: &ReleaseManifest,
    platform: Platform,
    config: &InstallConfig,
    stderr: &mut dyn Write,
) -> Result<()> {
    let entry = resolve(manifest, platform)?;
    let destination = config
        .target_dir
        .join(manifest.binary_file_name(platform));
    let info = DryRunInfo {
        package: manifest.name().as_str(),
        version: manifest.version().as_str(),
        platform,
        url: entry.url(),
        sha256: entry.checksum().as_str(),
        destination: &destination,
        cache_dir: config.cache_dir.as_deref(),
        rollback: config.rollback,
    };
    write_stderr_line(stderr, info.display_text());
    write_stderr_line(stderr, "");
    Ok(())
}

/// Report each run; fail if any run failed.
fn summarise(reports: Vec<InstallReport>, quiet: bool, stderr: &mut dyn Write) -> Result<()> {
    let total = reports.len();
    let mut failures = Vec::new();
    for report in reports {
        let (package, version) = (report.package.clone(), report.version.clone());
        match report.into_result() {
            Ok(outcome) if !quiet => {
                write_stderr_line(stderr, success_message(&package, &version, &outcome));
            }
            Ok(_) => {}
            Err(err) => failures.push((package, err)),
        }
    }

    if total == 1 {
        return failures.pop().map_or(Ok(()), |(_, err)| Err(err));
    }
    if failures.is_empty() {
        return Ok(());
    }
    for (package, err) in &failures {
        write_stderr_line(stderr, format_args!("{package}: {}", err.tagged_message()));
    }
    Err(InstallerError::InstallsFailed {
        failed: failures.len(),
        total,
    })
}
