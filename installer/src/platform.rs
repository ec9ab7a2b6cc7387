//! Operating system and architecture identifiers.
//!
//! A [`Platform`] is the `(os, arch)` key under which a manifest stores its
//! download entries. Parsing accepts the common aliases used by release
//! asset names (`darwin`, `arm64`, `amd64`, ...) and normalizes them to one
//! canonical spelling, so a manifest can never hold two entries for the same
//! platform under different names.

use crate::manifest::error::ManifestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An operating system family with prebuilt release support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Os {
    /// Apple macOS.
    Macos,
    /// Linux with a GNU userland.
    Linux,
    /// Microsoft Windows.
    Windows,
}

/// A CPU architecture with prebuilt release support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Arch {
    /// 64-bit x86 (Intel/AMD).
    X86_64,
    /// 64-bit ARM (Apple silicon, Graviton, ...).
    Aarch64,
}

impl Os {
    /// Every supported operating system, in manifest display order.
    pub const ALL: [Self; 3] = [Self::Macos, Self::Linux, Self::Windows];

    /// Return the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Macos => "macos",
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }

    /// Return the operating system this binary was compiled for, if supported.
    #[must_use]
    pub fn current() -> Option<Self> {
        std::env::consts::OS.parse().ok()
    }

    /// Return the file name an executable called `name` has on this OS.
    ///
    /// # Examples
    ///
    /// ```
    /// use tap_installer::platform::Os;
    ///
    /// assert_eq!(Os::Windows.executable_name("poof"), "poof.exe");
    /// assert_eq!(Os::Linux.executable_name("poof"), "poof");
    /// ```
    #[must_use]
    pub fn executable_name(self, name: &str) -> String {
        match self {
            Self::Windows if !name.ends_with(".exe") => format!("{name}.exe"),
            _ => name.to_owned(),
        }
    }
}

impl Arch {
    /// Every supported architecture.
    pub const ALL: [Self; 2] = [Self::X86_64, Self::Aarch64];

    /// Return the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
        }
    }

    /// Return the architecture this binary was compiled for, if supported.
    #[must_use]
    pub fn current() -> Option<Self> {
        std::env::consts::ARCH.parse().ok()
    }
}

impl FromStr for Os {
    type Err = ManifestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "macos" | "darwin" | "osx" => Ok(Self::Macos),
            "linux" => Ok(Self::Linux),
            "windows" | "win" => Ok(Self::Windows),
            _ => Err(ManifestError::UnknownOs {
                value: value.to_owned(),
            }),
        }
    }
}

impl FromStr for Arch {
    type Err = ManifestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Ok(Self::X86_64),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            _ => Err(ManifestError::UnknownArch {
                value: value.to_owned(),
            }),
        }
    }
}

impl TryFrom<String> for Os {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for Arch {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Os> for String {
    fn from(value: Os) -> Self {
        value.as_str().to_owned()
    }
}

impl From<Arch> for String {
    fn from(value: Arch) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `(os, arch)` pair identifying one manifest entry.
///
/// # Examples
///
/// ```
/// use tap_installer::platform::{Arch, Os, Platform};
///
/// let platform = Platform::new(Os::Macos, Arch::Aarch64);
/// assert_eq!(platform.to_string(), "macos/aarch64");
/// assert_eq!(platform.target_triple(), "aarch64-apple-darwin");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Platform {
    /// The operating system.
    pub os: Os,
    /// The CPU architecture.
    pub arch: Arch,
}

impl Platform {
    /// Create a platform key.
    #[must_use]
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detect the platform this binary is running on.
    ///
    /// Returns `None` when the host OS or architecture has no prebuilt
    /// release support at all (for example FreeBSD or 32-bit ARM).
    #[must_use]
    pub fn current() -> Option<Self> {
        Some(Self::new(Os::current()?, Arch::current()?))
    }

    /// Parse a platform from separate OS and architecture strings.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnknownOs`] or [`ManifestError::UnknownArch`]
    /// when either component is not recognized.
    pub fn parse(os: &str, arch: &str) -> Result<Self, ManifestError> {
        Ok(Self::new(os.parse()?, arch.parse()?))
    }

    /// Return the Rust target triple release assets conventionally use.
    #[must_use]
    pub const fn target_triple(self) -> &'static str {
        match (self.os, self.arch) {
            (Os::Macos, Arch::X86_64) => "x86_64-apple-darwin",
            (Os::Macos, Arch::Aarch64) => "aarch64-apple-darwin",
            (Os::Linux, Arch::X86_64) => "x86_64-unknown-linux-gnu",
            (Os::Linux, Arch::Aarch64) => "aarch64-unknown-linux-gnu",
            (Os::Windows, Arch::X86_64) => "x86_64-pc-windows-msvc",
            (Os::Windows, Arch::Aarch64) => "aarch64-pc-windows-msvc",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}
