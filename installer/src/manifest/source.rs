//! Manifest locations: a single file, a formula directory, or a URL.
//!
//! The tap keeps one `<package>.toml` per package under `Formula/`. Callers
//! may point the installer at that directory, at one manifest file, or at a
//! manifest served over HTTP(S).

use super::error::{ManifestError, Result};
use super::package::PackageName;
use super::parser::parse_manifest;
use super::ReleaseManifest;
use crate::artefact::download::ArtefactDownloader;
use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use std::fmt;

/// Environment variable naming the default manifest source.
pub const MANIFEST_SOURCE_ENV: &str = "TAP_INSTALLER_MANIFESTS";

/// Directory searched when neither `--manifest` nor the environment
/// variable is set.
pub const DEFAULT_FORMULA_DIR: &str = "Formula";

/// Extension of manifest files inside a formula directory.
const MANIFEST_EXTENSION: &str = "toml";

/// Where manifests are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    /// A single manifest file.
    File(Utf8PathBuf),
    /// A directory holding `<package>.toml` files.
    Directory(Utf8PathBuf),
    /// A manifest served over HTTP(S).
    Url(String),
}

impl ManifestSource {
    /// Interpret a `--manifest` argument.
    ///
    /// `http://` and `https://` values are URLs, values ending in `.toml` are
    /// files, and anything else is treated as a formula directory.
    ///
    /// # Examples
    ///
    /// ```
    /// use tap_installer::manifest::source::ManifestSource;
    ///
    /// assert!(matches!(ManifestSource::parse("Formula"), ManifestSource::Directory(_)));
    /// assert!(matches!(ManifestSource::parse("poof.toml"), ManifestSource::File(_)));
    /// assert!(matches!(
    ///     ManifestSource::parse("https://example.com/poof.toml"),
    ///     ManifestSource::Url(_)
    /// ));
    /// ```
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("https://") || raw.starts_with("http://") {
            return Self::Url(raw.to_owned());
        }
        let path = Utf8PathBuf::from(raw);
        if path.extension() == Some(MANIFEST_EXTENSION) {
            Self::File(path)
        } else {
            Self::Directory(path)
        }
    }

    /// Resolve the source to use when `--manifest` is absent.
    ///
    /// Reads [`MANIFEST_SOURCE_ENV`], falling back to [`DEFAULT_FORMULA_DIR`]
    /// relative to the working directory.
    #[must_use]
    pub fn from_env_or_default() -> Self {
        match std::env::var(MANIFEST_SOURCE_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::parse(value.trim()),
            _ => Self::Directory(Utf8PathBuf::from(DEFAULT_FORMULA_DIR)),
        }
    }

    /// Resolve an optional CLI argument, falling back to the environment.
    #[must_use]
    pub fn from_arg(arg: Option<&str>) -> Self {
        arg.map_or_else(Self::from_env_or_default, Self::parse)
    }

    /// Load the manifest for `package`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NotFound`] when a directory has no manifest
    /// for the package, [`ManifestError::NameMismatch`] when a file or URL
    /// describes another package, and read, fetch or parse errors otherwise.
    pub fn load(
        &self,
        package: &PackageName,
        downloader: &dyn ArtefactDownloader,
    ) -> Result<ReleaseManifest> {
        let manifest = match self {
            Self::File(path) => read_manifest(path)?,
            Self::Directory(dir) => {
                let path = manifest_file(dir, package);
                if !path.is_file() {
                    return Err(ManifestError::NotFound {
                        package: package.to_string(),
                        source_desc: self.to_string(),
                    });
                }
                read_manifest(&path)?
            }
            Self::Url(url) => fetch_manifest(url, downloader)?,
        };
        if manifest.name() != package {
            return Err(ManifestError::NameMismatch {
                origin: self.to_string(),
                expected: package.to_string(),
                found: manifest.name().to_string(),
            });
        }
        Ok(manifest)
    }

    /// Load every manifest the source provides, sorted by package name.
    ///
    /// # Errors
    ///
    /// Returns the first read, fetch or parse error encountered.
    pub fn load_all(&self, downloader: &dyn ArtefactDownloader) -> Result<Vec<ReleaseManifest>> {
        let mut manifests = match self {
            Self::File(path) => vec![read_manifest(path)?],
            Self::Url(url) => vec![fetch_manifest(url, downloader)?],
            Self::Directory(dir) => manifest_files(dir)?
                .iter()
                .map(|path| read_manifest(path))
                .collect::<Result<Vec<_>>>()?,
        };
        manifests.sort_by(|left, right| left.name().cmp(right.name()));
        Ok(manifests)
    }

    /// The local file that holds (or would hold) `package`'s manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::ReadOnlySource`] for URL sources.
    pub fn manifest_path(&self, package: &PackageName) -> Result<Utf8PathBuf> {
        match self {
            Self::File(path) => Ok(path.clone()),
            Self::Directory(dir) => Ok(manifest_file(dir, package)),
            Self::Url(_) => Err(ManifestError::ReadOnlySource {
                source_desc: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file {path}"),
            Self::Directory(dir) => write!(f, "directory {dir}"),
            Self::Url(url) => write!(f, "URL {url}"),
        }
    }
}

fn manifest_file(dir: &Utf8Path, package: &PackageName) -> Utf8PathBuf {
    dir.join(format!("{package}.{MANIFEST_EXTENSION}"))
}

fn read_manifest(path: &Utf8Path) -> Result<ReleaseManifest> {
    debug!(target: "manifest", "reading manifest {path}");
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_owned(),
        source,
    })?;
    parse_manifest(&text, path.as_str())
}

fn fetch_manifest(url: &str, downloader: &dyn ArtefactDownloader) -> Result<ReleaseManifest> {
    debug!(target: "manifest", "fetching manifest {url}");
    let text = downloader
        .download_text(url)
        .map_err(|err| ManifestError::Fetch {
            url: url.to_owned(),
            reason: err.to_string(),
        })?;
    parse_manifest(&text, url)
}

fn manifest_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let io_error = |source| ManifestError::Io {
        path: dir.to_owned(),
        source,
    };
    let mut files = Vec::new();
    for entry in dir.read_dir_utf8().map_err(io_error)? {
        let path = entry.map_err(io_error)?.into_path();
        if path.extension() == Some(MANIFEST_EXTENSION) && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
