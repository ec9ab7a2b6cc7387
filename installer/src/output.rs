//! Output formatting for the installer CLI.
//!
//! Progress and results go to stderr through [`write_stderr_line`]; this
//! module also renders the success summary and dry-run plans.

use crate::pipeline::InstallOutcome;
use crate::platform::Platform;
use camino::Utf8Path;
use std::fmt;
use std::io::Write;
use std::path::Path;

/// Write one line to `stderr`, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

/// Format a success message after installation.
///
/// # Example
///
/// ```
/// use camino::Utf8PathBuf;
/// use tap_installer::output::success_message;
/// use tap_installer::pipeline::InstallOutcome;
///
/// let outcome = InstallOutcome {
///     path: Utf8PathBuf::from("/home/user/.local/bin/poof"),
///     banner: Some("poof 0.5.2".to_owned()),
///     from_cache: false,
/// };
/// assert_eq!(
///     success_message("poof", "0.5.2", &outcome),
///     "Installed poof 0.5.2 to /home/user/.local/bin/poof (poof 0.5.2)"
/// );
/// ```
#[must_use]
pub fn success_message(package: &str, version: &str, outcome: &InstallOutcome) -> String {
    let mut message = format!("Installed {package} {version} to {}", outcome.path);
    match &outcome.banner {
        Some(banner) => message.push_str(&format!(" ({banner})")),
        None => message.push_str(" (self-test skipped)"),
    }
    message
}

/// What an install would do, shown by `install --dry-run`.
///
/// # Example
///
/// ```
/// use camino::Utf8Path;
/// use tap_installer::output::DryRunInfo;
/// use tap_installer::platform::{Arch, Os, Platform};
///
/// let info = DryRunInfo {
///     package: "poof",
///     version: "0.5.2",
///     platform: Platform::new(Os::Linux, Arch::X86_64),
///     url: "https://example.com/poof.tar.gz",
///     sha256: "0000",
///     destination: Utf8Path::new("/home/user/.local/bin/poof"),
///     cache_dir: None,
///     rollback: false,
/// };
///
/// let output = info.display_text();
/// assert!(output.contains("Dry run"));
/// assert!(output.contains("linux/x86_64"));
/// ```
#[derive(Debug)]
pub struct DryRunInfo<'a> {
    /// Package name.
    pub package: &'a str,
    /// Package version.
    pub version: &'a str,
    /// Platform the entry was resolved for.
    pub platform: Platform,
    /// Archive URL.
    pub url: &'a str,
    /// Expected archive digest.
    pub sha256: &'a str,
    /// Final path of the binary.
    pub destination: &'a Utf8Path,
    /// Download cache directory, if caching is enabled.
    pub cache_dir: Option<&'a Path>,
    /// Whether a failed self-test rolls back.
    pub rollback: bool,
}

impl DryRunInfo<'_> {
    /// Format the dry-run information for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let cache = self
            .cache_dir
            .map_or_else(|| "disabled".to_owned(), |dir| dir.display().to_string());
        [
            "Dry run - no files will be modified".to_owned(),
            String::new(),
            format!("Package: {} {}", self.package, self.version),
            format!("Platform: {}", self.platform),
            format!("Archive: {}", self.url),
            format!("SHA-256: {}", self.sha256),
            format!("Destination: {}", self.destination),
            format!("Cache: {cache}"),
            format!("Rollback on failed self-test: {}", self.rollback),
        ]
        .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os};
    use camino::Utf8PathBuf;
    use rstest::rstest;

    #[rstest]
    #[case::tested(Some("poof 0.5.2"), "(poof 0.5.2)")]
    #[case::skipped(None, "(self-test skipped)")]
    fn success_message_mentions_self_test(#[case] banner: Option<&str>, #[case] expected: &str) {
        let outcome = InstallOutcome {
            path: Utf8PathBuf::from("/tmp/bin/poof"),
            banner: banner.map(str::to_owned),
            from_cache: true,
        };
        let message = success_message("poof", "0.5.2", &outcome);
        assert!(message.starts_with("Installed poof 0.5.2 to /tmp/bin/poof"));
        assert!(message.ends_with(expected), "{message}");
    }

    #[test]
    fn dry_run_lists_cache_directory() {
        let info = DryRunInfo {
            package: "exif_renamer",
            version: "0.2.3",
            platform: Platform::new(Os::Macos, Arch::Aarch64),
            url: "https://example.com/exif.tar.gz",
            sha256: "abc",
            destination: Utf8Path::new("/tmp/bin/exif_renamer"),
            cache_dir: Some(Path::new("/tmp/cache")),
            rollback: true,
        };
        let text = info.display_text();
        assert!(text.contains("Cache: /tmp/cache"));
        assert!(text.contains("Rollback on failed self-test: true"));
        assert!(text.contains("Destination: /tmp/bin/exif_renamer"));
    }

    #[test]
    fn write_stderr_line_appends_newline() {
        let mut buffer = Vec::new();
        write_stderr_line(&mut buffer, "hello");
        assert_eq!(buffer, b"hello\n");
    }
}
