//! Tests for installer CLI parsing and default behaviours.

use super::*;
use rstest::rstest;

fn install_args(argv: &[&str]) -> InstallArgs {
    let cli = Cli::try_parse_from(argv).expect("valid command line");
    match cli.command {
        Command::Install(args) => args,
        other => panic!("expected Install command, got {other:?}"),
    }
}

#[test]
fn install_parses_package_and_version() {
    let args = install_args(&["tap-installer", "install", "poof", "0.5.2"]);
    assert_eq!(args.package.as_deref(), Some("poof"));
    assert_eq!(args.version.as_deref(), Some("0.5.2"));
    assert!(args.target_dir.is_none());
    assert!(!args.no_cache);
    assert!(!args.rollback);
}

#[test]
fn install_version_is_optional() {
    let args = install_args(&["tap-installer", "install", "exif_renamer"]);
    assert_eq!(args.version, None);
}

#[test]
fn install_parses_target_dir_and_manifest() {
    let args = install_args(&[
        "tap-installer",
        "install",
        "poof",
        "-t",
        "/opt/bin",
        "--manifest",
        "Formula/poof.toml",
    ]);
    assert_eq!(args.target_dir, Some(Utf8PathBuf::from("/opt/bin")));
    assert_eq!(args.manifest.as_deref(), Some("Formula/poof.toml"));
}

#[rstest]
#[case::canonical("macos", "aarch64", Os::Macos, Arch::Aarch64)]
#[case::aliases("darwin", "arm64", Os::Macos, Arch::Aarch64)]
#[case::linux("linux", "amd64", Os::Linux, Arch::X86_64)]
fn install_parses_platform_override(
    #[case] os: &str,
    #[case] arch: &str,
    #[case] expected_os: Os,
    #[case] expected_arch: Arch,
) {
    let args = install_args(&["tap-installer", "install", "poof", "--os", os, "--arch", arch]);
    assert_eq!(args.os, Some(expected_os));
    assert_eq!(args.arch, Some(expected_arch));
}

#[rstest]
#[case::os_without_arch(&["tap-installer", "install", "poof", "--os", "linux"])]
#[case::arch_without_os(&["tap-installer", "install", "poof", "--arch", "x86_64"])]
#[case::unknown_os(&["tap-installer", "install", "poof", "--os", "plan9", "--arch", "x86_64"])]
#[case::missing_package(&["tap-installer", "install"])]
#[case::all_with_package(&["tap-installer", "install", "poof", "--all"])]
#[case::verbose_and_quiet(&["tap-installer", "-v", "-q", "list"])]
fn invalid_command_lines_are_rejected(#[case] argv: &[&str]) {
    assert!(Cli::try_parse_from(argv).is_err());
}

#[test]
fn install_all_parses_jobs() {
    let args = install_args(&["tap-installer", "install", "--all", "--jobs", "2"]);
    assert!(args.all);
    assert_eq!(args.jobs, 2);
    assert!(args.package.is_none());
}

#[test]
fn global_flags_follow_the_subcommand() {
    let cli = Cli::parse_from(["tap-installer", "install", "poof", "-vv"]);
    assert_eq!(cli.verbosity, 2);
    assert!(!cli.quiet);
}

#[test]
fn list_parses_json_and_manifest() {
    let cli = Cli::parse_from(["tap-installer", "list", "--json", "-m", "Formula"]);
    match cli.command {
        Command::List(args) => {
            assert!(args.json);
            assert_eq!(args.manifest.as_deref(), Some("Formula"));
        }
        other => panic!("expected List command, got {other:?}"),
    }
}

#[test]
fn update_parses_repo_override() {
    let cli = Cli::parse_from([
        "tap-installer",
        "update",
        "poof",
        "--repo",
        "pirafrank/poof",
        "--dry-run",
    ]);
    match cli.command {
        Command::Update(args) => {
            assert_eq!(args.package, "poof");
            assert_eq!(args.repo.as_deref(), Some("pirafrank/poof"));
            assert!(args.dry_run);
        }
        other => panic!("expected Update command, got {other:?}"),
    }
}

#[test]
fn defaults_match_an_empty_command_line() {
    let parsed = install_args(&["tap-installer", "install", "--all"]);
    let defaults = InstallArgs {
        all: true,
        ..InstallArgs::default()
    };
    assert_eq!(parsed.jobs, defaults.jobs);
    assert_eq!(parsed.no_cache, defaults.no_cache);
    assert_eq!(parsed.dry_run, defaults.dry_run);
    assert!(ListArgs::default().manifest.is_none());
}

#[test]
fn command_definition_is_consistent() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}
