//! Output formatting for package listing.
//!
//! This module provides utilities to format the packages a manifest source
//! provides for human-readable or JSON output.

use serde::Serialize;

use crate::manifest::ReleaseManifest;
use crate::platform::Platform;

/// Format manifests for human-readable output.
///
/// Platforms matching `host` are marked so users can see at a glance which
/// packages install here.
///
/// # Examples
///
/// ```
/// use tap_installer::list_output::format_human;
///
/// let output = format_human(&[], None);
/// assert!(output.contains("No packages found"));
/// ```
#[must_use]
pub fn format_human(manifests: &[ReleaseManifest], host: Option<Platform>) -> String {
    if manifests.is_empty() {
        return String::from("No packages found.");
    }

    let mut output = String::from("Available packages:\n");

    for manifest in manifests {
        output.push('\n');
        output.push_str(&format!("{} {}\n", manifest.name(), manifest.version()));
        if let Some(description) = &manifest.metadata().description {
            output.push_str(&format!("  {description}\n"));
        }
        output.push_str("  Platforms:\n");
        for platform in manifest.supported_platforms() {
            let marker = if host == Some(platform) { " (this host)" } else { "" };
            output.push_str(&format!("    - {platform}{marker}\n"));
        }
    }

    output
}

/// Format manifests as JSON.
///
/// # Examples
///
/// ```
/// use tap_installer::list_output::format_json;
///
/// let json = format_json(&[], None);
/// assert!(json.contains("\"packages\""));
/// ```
#[must_use]
pub fn format_json(manifests: &[ReleaseManifest], host: Option<Platform>) -> String {
    let json_data = PackagesJson::from_manifests(manifests, host);

    serde_json::to_string_pretty(&json_data).unwrap_or_else(|_| "{}".to_owned())
}

/// JSON-serializable list of packages.
#[derive(Debug, Serialize)]
pub struct PackagesJson {
    /// One entry per manifest, sorted by name.
    pub packages: Vec<PackageEntry>,
}

impl PackagesJson {
    fn from_manifests(manifests: &[ReleaseManifest], host: Option<Platform>) -> Self {
        let packages = manifests
            .iter()
            .map(|manifest| {
                let platforms = manifest.supported_platforms();
                PackageEntry {
                    name: manifest.name().to_string(),
                    version: manifest.version().to_string(),
                    description: manifest.metadata().description.clone(),
                    installable: host.is_some_and(|host| platforms.contains(&host)),
                    platforms: platforms.iter().map(ToString::to_string).collect(),
                }
            })
            .collect();

        Self { packages }
    }
}

/// JSON entry for a package.
#[derive(Debug, Serialize)]
pub struct PackageEntry {
    /// Package name.
    pub name: String,
    /// Version the manifest describes.
    pub version: String,
    /// One-line description, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the manifest has an entry for this host.
    pub installable: bool,
    /// Supported platforms as `os/arch`.
    pub platforms: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::parser::parse_manifest;
    use crate::platform::{Arch, Os};
    use rstest::{fixture, rstest};

    #[fixture]
    fn manifests() -> Vec<ReleaseManifest> {
        let sha = "a".repeat(64);
        let toml = format!(
            "name = \"poof\"\nversion = \"0.5.2\"\ndescription = \"Magic manager of pre-built software\"\n\
             [[entries]]\nos = \"linux\"\narch = \"x86_64\"\nurl = \"https://example.com/l.tar.gz\"\nsha256 = \"{sha}\"\n\
             [[entries]]\nos = \"macos\"\narch = \"aarch64\"\nurl = \"https://example.com/m.tar.gz\"\nsha256 = \"{sha}\"\n"
        );
        vec![parse_manifest(&toml, "poof.toml").expect("valid manifest")]
    }

    #[rstest]
    fn human_output_marks_host_platform(manifests: Vec<ReleaseManifest>) {
        let output = format_human(&manifests, Some(Platform::new(Os::Linux, Arch::X86_64)));

        assert!(output.contains("poof 0.5.2"));
        assert!(output.contains("Magic manager of pre-built software"));
        assert!(output.contains("- linux/x86_64 (this host)"));
        assert!(output.contains("- macos/aarch64\n"));
    }

    #[rstest]
    fn human_output_lists_platforms_in_order(manifests: Vec<ReleaseManifest>) {
        let output = format_human(&manifests, None);
        let macos = output.find("macos/aarch64").expect("macos listed");
        let linux = output.find("linux/x86_64").expect("linux listed");
        assert!(macos < linux);
    }

    #[rstest]
    #[case::installable(Some(Platform::new(Os::Macos, Arch::Aarch64)), true)]
    #[case::not_installable(Some(Platform::new(Os::Windows, Arch::X86_64)), false)]
    #[case::unknown_host(None, false)]
    fn json_output_reports_installability(
        manifests: Vec<ReleaseManifest>,
        #[case] host: Option<Platform>,
        #[case] installable: bool,
    ) {
        let json = format_json(&manifests, host);
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");

        let package = &value["packages"][0];
        assert_eq!(package["name"], "poof");
        assert_eq!(package["installable"], installable);
        assert_eq!(package["platforms"][0], "macos/aarch64");
    }
}
