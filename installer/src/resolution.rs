//! Platform resolution.
//!
//! Maps the requested (or detected) platform to exactly one manifest entry.
//! There is no fallback to a "close" platform: an Intel build is never
//! installed on ARM, and the error lists what the manifest does provide.

use crate::error::{InstallerError, Result};
use crate::manifest::{PlatformEntry, ReleaseManifest};
use crate::platform::{Arch, Os, Platform};

/// Select the entry for `platform`.
///
/// # Errors
///
/// Returns [`InstallerError::UnsupportedPlatform`] when the manifest has no
/// entry for `platform`.
///
/// # Examples
///
/// ```
/// use tap_installer::manifest::parser::parse_manifest;
/// use tap_installer::platform::{Arch, Os, Platform};
/// use tap_installer::resolution::resolve;
///
/// let toml = format!(
///     "name = \"poof\"\nversion = \"0.5.2\"\n[[entries]]\nos = \"linux\"\n\
///      arch = \"x86_64\"\nurl = \"https://example.com/poof.tar.gz\"\nsha256 = \"{}\"\n",
///     "0".repeat(64)
/// );
/// let manifest = parse_manifest(&toml, "poof.toml").expect("valid manifest");
///
/// assert!(resolve(&manifest, Platform::new(Os::Linux, Arch::X86_64)).is_ok());
/// assert!(resolve(&manifest, Platform::new(Os::Linux, Arch::Aarch64)).is_err());
/// ```
pub fn resolve(manifest: &ReleaseManifest, platform: Platform) -> Result<&PlatformEntry> {
    manifest
        .entry_for(platform)
        .ok_or_else(|| InstallerError::UnsupportedPlatform {
            package: manifest.name().to_string(),
            platform: platform.to_string(),
            supported: manifest
                .supported_platforms()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

/// Determine the platform to install for.
///
/// Explicit `os`/`arch` overrides win; otherwise the host is detected.
///
/// # Errors
///
/// Returns [`InstallerError::UnknownHostPlatform`] when detection is needed
/// and the host has no prebuilt release support.
pub fn target_platform(os: Option<Os>, arch: Option<Arch>) -> Result<Platform> {
    let unknown = || InstallerError::UnknownHostPlatform {
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
    };
    let resolved_os = os.or_else(Os::current).ok_or_else(unknown)?;
    let resolved_arch = arch.or_else(Arch::current).ok_or_else(unknown)?;
    Ok(Platform::new(resolved_os, resolved_arch))
}
