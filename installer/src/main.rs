//! Tap installer CLI entrypoint.
//!
//! This binary installs prebuilt release binaries described by the tap's
//! manifests, lists the packages a tap provides and refreshes manifests
//! from upstream GitHub releases.

mod install_flow;

use clap::Parser;
use log::{LevelFilter, warn};
use std::io::Write;
use tap_installer::artefact::download::{ArtefactDownloader, CancelFlag, HttpDownloader};
use tap_installer::artefact::extraction::DefaultExtractor;
use tap_installer::cli::{Cli, Command, UpdateArgs};
use tap_installer::dirs::{BaseDirs, SystemBaseDirs};
use tap_installer::error::{InstallerError, Result};
use tap_installer::list::run_list;
use tap_installer::manifest::package::PackageName;
use tap_installer::manifest::parser::to_toml_string;
use tap_installer::manifest::source::ManifestSource;
use tap_installer::output::write_stderr_line;
use tap_installer::release::{
    fetch_latest_release, refresh_manifest, repository_for, write_manifest,
};

use crate::install_flow::{InstallEnvironment, run_install_command};

/// Exit status after a second Ctrl-C.
const INTERRUPTED_EXIT_CODE: i32 = 130;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity);
    let cancel = CancelFlag::new();
    install_interrupt_handler(cancel.clone());
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &cancel, &mut stdout, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// `-v` enables debug logs, `-vv` trace; `RUST_LOG` overrides both.
fn init_logging(verbosity: u8) {
    env_logger::Builder::new()
        .filter_level(level_for_verbosity(verbosity))
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

const fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// The first Ctrl-C aborts downloads cleanly; a second one exits at once.
fn install_interrupt_handler(cancel: CancelFlag) {
    let installed = ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        cancel.cancel();
    });
    if let Err(err) = installed {
        warn!("failed to install Ctrl-C handler: {err}");
    }
}

fn run(
    cli: &Cli,
    cancel: &CancelFlag,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    match &cli.command {
        Command::Install(args) => {
            let dirs = SystemBaseDirs::new();
            let env = InstallEnvironment {
                dirs: dirs.as_ref().map(|dirs| dirs as &dyn BaseDirs),
                downloader: &HttpDownloader,
                extractor: &DefaultExtractor,
                cancel,
            };
            run_install_command(args, cli.quiet, &env, stderr)
        }
        Command::List(args) => run_list(args, stdout),
        Command::Update(args) => run_update(args, cli.quiet, &HttpDownloader, stdout, stderr),
    }
}

/// Refresh one manifest from the latest upstream release.
fn run_update(
    args: &UpdateArgs,
    quiet: bool,
    downloader: &dyn ArtefactDownloader,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    let source = ManifestSource::from_arg(args.manifest.as_deref());
    let package = PackageName::try_from(args.package.as_str())?;
    let manifest = source.load(&package, downloader)?;
    let repo = repository_for(&manifest, args.repo.as_deref())?;

    if !quiet {
        write_stderr_line(stderr, format_args!("Fetching latest release of {repo}..."));
    }
    let release = fetch_latest_release(&repo, downloader)?;
    let refreshed = refresh_manifest(&manifest, &repo, &release)?;

    if args.dry_run {
        let text = to_toml_string(&refreshed)?;
        write!(stdout, "{text}").map_err(|source| InstallerError::WriteFailed { source })?;
        return Ok(());
    }

    let path = source.manifest_path(&package)?;
    write_manifest(&path, &refreshed)?;
    if !quiet {
        write_stderr_line(
            stderr,
            format_args!(
                "Updated {path}: {package} {} -> {}",
                manifest.version(),
                refreshed.version()
            ),
        );
    }
    Ok(())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, err.tagged_message());
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use std::fs;
    use tap_installer::manifest::parser::parse_manifest;
    use tap_installer::test_utils::ScriptedDownloader;
    use tempfile::TempDir;

    const OLD_SHA: &str = "1111111111111111111111111111111111111111111111111111111111111111";
    const NEW_SHA: &str = "2222222222222222222222222222222222222222222222222222222222222222";
    const API_URL: &str = "https://api.github.com/repos/pirafrank/exif_renamer/releases/latest";

    struct Formula {
        _temp: TempDir,
        dir: Utf8PathBuf,
    }

    impl Formula {
        fn manifest_path(&self) -> Utf8PathBuf {
            self.dir.join("exif_renamer.toml")
        }
    }

    #[fixture]
    fn formula() -> Formula {
        let temp = TempDir::new().expect("temp dir");
        let dir = Utf8PathBuf::try_from(temp.path().to_owned()).expect("UTF-8 temp path");
        let toml = format!(
            r#"name = "exif_renamer"
version = "0.2.2"

[release]
github_repo = "pirafrank/exif_renamer"

[[entries]]
os = "linux"
arch = "x86_64"
url = "https://example.com/exif_renamer-0.2.2.tar.gz"
sha256 = "{OLD_SHA}"
asset = "{{NAME}}-{{VERSION}}-{{TARGET}}.tar.gz"
"#
        );
        fs::write(dir.join("exif_renamer.toml"), toml).expect("write manifest");
        Formula { _temp: temp, dir }
    }

    fn github() -> ScriptedDownloader {
        let body = format!(
            r#"{{"tag_name": "v0.2.3", "assets": [{{
                "name": "exif_renamer-0.2.3-x86_64-unknown-linux-gnu.tar.gz",
                "browser_download_url": "https://example.com/exif_renamer-0.2.3.tar.gz",
                "digest": "sha256:{NEW_SHA}"
            }}]}}"#
        );
        ScriptedDownloader::new().serving(API_URL, body)
    }

    fn update_args(formula: &Formula, dry_run: bool) -> UpdateArgs {
        UpdateArgs {
            package: "exif_renamer".to_owned(),
            manifest: Some(formula.dir.to_string()),
            repo: None,
            dry_run,
        }
    }

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_stage_tagged_error() {
        let err = InstallerError::UnsupportedPlatform {
            package: "poof".to_owned(),
            platform: "linux/aarch64".to_owned(),
            supported: "linux/x86_64".to_owned(),
        };

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.starts_with("resolve: poof has no release for linux/aarch64"));
    }

    #[rstest]
    #[case(0, LevelFilter::Warn)]
    #[case(1, LevelFilter::Debug)]
    #[case(2, LevelFilter::Trace)]
    #[case(5, LevelFilter::Trace)]
    fn verbosity_maps_to_log_level(#[case] verbosity: u8, #[case] expected: LevelFilter) {
        assert_eq!(level_for_verbosity(verbosity), expected);
    }

    #[rstest]
    fn update_rewrites_manifest(formula: Formula) {
        let downloader = github();
        let mut stderr = Vec::new();

        run_update(
            &update_args(&formula, false),
            false,
            &downloader,
            &mut Vec::new(),
            &mut stderr,
        )
        .expect("update succeeds");

        let text = fs::read_to_string(formula.manifest_path()).expect("read manifest");
        let manifest = parse_manifest(&text, "exif_renamer.toml").expect("valid manifest");
        assert_eq!(manifest.version().as_str(), "0.2.3");
        assert!(text.contains(NEW_SHA));
        let message = String::from_utf8(stderr).expect("UTF-8 output");
        assert!(message.contains("exif_renamer 0.2.2 -> 0.2.3"), "{message}");
    }

    #[rstest]
    fn update_dry_run_prints_instead_of_writing(formula: Formula) {
        let before = fs::read_to_string(formula.manifest_path()).expect("read manifest");
        let mut stdout = Vec::new();

        run_update(
            &update_args(&formula, true),
            true,
            &github(),
            &mut stdout,
            &mut Vec::new(),
        )
        .expect("dry run succeeds");

        let printed = String::from_utf8(stdout).expect("UTF-8 output");
        assert!(printed.contains("version = \"0.2.3\""), "{printed}");
        assert_eq!(
            fs::read_to_string(formula.manifest_path()).expect("read manifest"),
            before
        );
    }

    #[rstest]
    fn update_without_release_asset_fails(formula: Formula) {
        let downloader = ScriptedDownloader::new()
            .serving(API_URL, r#"{"tag_name": "v0.2.3", "assets": []}"#);

        let err = run_update(
            &update_args(&formula, false),
            true,
            &downloader,
            &mut Vec::new(),
            &mut Vec::new(),
        )
        .expect_err("asset missing");

        assert!(matches!(err, InstallerError::Release(_)));
        assert!(
            err.to_string()
                .contains("exif_renamer-0.2.3-x86_64-unknown-linux-gnu.tar.gz")
        );
    }
}
