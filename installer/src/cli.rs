//! CLI argument definitions for the tap installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::platform::{Arch, Os};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Install prebuilt release binaries described by tap manifests.
#[derive(Parser, Debug)]
#[command(name = "tap-installer")]
#[command(version, about)]
#[command(long_about = concat!(
    "Install prebuilt release binaries described by tap manifests.\n\n",
    "Each package has a TOML manifest listing one release archive per ",
    "platform together with its SHA-256 digest. The installer picks the ",
    "archive for this machine (or --os/--arch), downloads and verifies it, ",
    "extracts the binary, installs it atomically and runs a smoke test.\n\n",
    "Manifests are read from --manifest, the TAP_INSTALLER_MANIFESTS ",
    "environment variable, or ./Formula, in that order.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install the latest manifest version of poof into ~/.local/bin:\n",
    "    $ tap-installer install poof\n\n",
    "  Install a pinned version into a custom directory:\n",
    "    $ tap-installer install poof 0.5.2 --target-dir ~/bin\n\n",
    "  Preview the macOS arm64 download without touching anything:\n",
    "    $ tap-installer install poof --os macos --arch aarch64 --dry-run\n\n",
    "  Install every package in the tap, two at a time:\n",
    "    $ tap-installer install --all --jobs 2\n\n",
    "  List packages as JSON:\n",
    "    $ tap-installer list --json\n\n",
    "  Refresh a manifest from its latest GitHub release:\n",
    "    $ tap-installer update poof",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Suppress progress output (errors still shown).
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Install a package's binary for this (or the given) platform.
    Install(InstallArgs),

    /// List the packages a manifest source provides.
    List(ListArgs),

    /// Refresh a manifest from the package's latest GitHub release.
    Update(UpdateArgs),
}

/// Arguments for the install command.
#[derive(Parser, Debug, Clone)]
pub struct InstallArgs {
    /// Package to install.
    #[arg(required_unless_present = "all")]
    pub package: Option<String>,

    /// Version the manifest must describe [default: whatever it describes].
    pub version: Option<String>,

    /// Install every package in the manifest source.
    #[arg(long, conflicts_with_all = ["package", "version"])]
    pub all: bool,

    /// Maximum concurrent installs with --all.
    #[arg(short, long, value_name = "N", default_value_t = 4)]
    pub jobs: usize,

    /// Directory to install into [default: ~/.local/bin].
    #[arg(short, long, value_name = "DIR")]
    pub target_dir: Option<Utf8PathBuf>,

    /// Manifest file, directory or URL.
    #[arg(short, long, value_name = "SRC")]
    pub manifest: Option<String>,

    /// Install for this operating system instead of the host's.
    #[arg(long, value_name = "OS", requires = "arch")]
    pub os: Option<Os>,

    /// Install for this architecture instead of the host's.
    #[arg(long, value_name = "ARCH", requires = "os")]
    pub arch: Option<Arch>,

    /// Neither read nor populate the download cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Restore the previous binary if the new one fails its self-test.
    #[arg(long)]
    pub rollback: bool,

    /// Show what would be installed and exit.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the list command.
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// Manifest file, directory or URL.
    #[arg(short, long, value_name = "SRC")]
    pub manifest: Option<String>,

    /// Output in JSON format for scripting.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the update command.
#[derive(Parser, Debug, Clone)]
pub struct UpdateArgs {
    /// Package whose manifest to refresh.
    pub package: String,

    /// Manifest file or directory to rewrite.
    #[arg(short, long, value_name = "SRC")]
    pub manifest: Option<String>,

    /// GitHub repository to query [default: the manifest's release.github_repo].
    #[arg(long, value_name = "OWNER/NAME")]
    pub repo: Option<String>,

    /// Print the refreshed manifest instead of writing it.
    #[arg(long)]
    pub dry_run: bool,
}

impl Default for InstallArgs {
    /// Creates an `InstallArgs` instance with every flag disabled.
    ///
    /// # Examples
    ///
    /// ```
    /// use tap_installer::cli::InstallArgs;
    ///
    /// let args = InstallArgs::default();
    /// assert!(args.package.is_none());
    /// assert_eq!(args.jobs, 4);
    /// assert!(!args.rollback);
    /// ```
    fn default() -> Self {
        Self {
            package: None,
            version: None,
            all: false,
            jobs: 4,
            target_dir: None,
            manifest: None,
            os: None,
            arch: None,
            no_cache: false,
            rollback: false,
            dry_run: false,
        }
    }
}

impl Default for ListArgs {
    fn default() -> Self {
        Self {
            manifest: None,
            json: false,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
