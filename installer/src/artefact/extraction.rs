//! Archive extraction and binary discovery.
//!
//! Unpacks `.tar.gz`, `.tar.zst`, plain `.tar` and `.zip` release archives
//! into a scratch directory with path traversal protection, then locates the
//! single executable the manifest asks for.

use camino::Utf8Path;
use log::{debug, trace};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

/// Offset of the `ustar` magic inside a tar header block.
const TAR_MAGIC_OFFSET: usize = 257;

/// Bytes needed to sniff every supported format.
const SNIFF_LEN: usize = TAR_MAGIC_OFFSET + 5;

/// Supported archive container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Gzip-compressed tar (`.tar.gz`, `.tgz`).
    TarGz,
    /// Zstandard-compressed tar (`.tar.zst`, `.tzst`).
    TarZst,
    /// Uncompressed tar.
    Tar,
    /// Zip archive.
    Zip,
}

impl ArchiveFormat {
    /// Infer the format from a file name or URL.
    ///
    /// # Examples
    ///
    /// ```
    /// use tap_installer::artefact::extraction::ArchiveFormat;
    ///
    /// assert_eq!(ArchiveFormat::from_name("poof-0.5.2.tar.gz"), Some(ArchiveFormat::TarGz));
    /// assert_eq!(ArchiveFormat::from_name("poof.ZIP"), Some(ArchiveFormat::Zip));
    /// assert_eq!(ArchiveFormat::from_name("poof"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar.zst") || lower.ends_with(".tzst") {
            Some(Self::TarZst)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// Infer the format from the leading bytes of the file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn sniff(path: &Path) -> io::Result<Option<Self>> {
        let mut header = Vec::with_capacity(SNIFF_LEN);
        File::open(path)?
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut header)?;
        Ok(Self::from_magic(&header))
    }

    fn from_magic(header: &[u8]) -> Option<Self> {
        if header.starts_with(&[0x1f, 0x8b]) {
            Some(Self::TarGz)
        } else if header.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
            Some(Self::TarZst)
        } else if header.starts_with(b"PK\x03\x04") {
            Some(Self::Zip)
        } else if header.get(TAR_MAGIC_OFFSET..SNIFF_LEN) == Some(b"ustar".as_slice()) {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// Pick the format from `name_hint`, falling back to magic bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::UnknownFormat`] when neither the name nor
    /// the contents identify a supported format.
    pub fn detect(name_hint: &str, path: &Path) -> Result<Self, ExtractionError> {
        if let Some(format) = Self::from_name(name_hint) {
            return Ok(format);
        }
        Self::sniff(path)?.ok_or_else(|| ExtractionError::UnknownFormat {
            name: name_hint.to_owned(),
        })
    }
}

/// Trait for extracting release archives, enabling test mocking.
///
/// # Examples
///
/// ```
/// use tap_installer::artefact::extraction::DefaultExtractor;
///
/// let extractor = DefaultExtractor;
/// // Use extractor.extract(archive_path, format, dest_dir) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract the archive at `archive_path` into `dest_dir`.
    ///
    /// Returns the paths, relative to `dest_dir`, of the regular files that
    /// were extracted. Symlinks and other special entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathTraversal`] if any entry
    /// attempts to escape the destination directory.
    /// Returns [`ExtractionError::EmptyArchive`] if no files are found.
    /// Returns [`ExtractionError::Io`] on I/O failures.
    fn extract(
        &self,
        archive_path: &Path,
        format: ArchiveFormat,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExtractionError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] io::Error),

    /// The zip container is malformed.
    #[error("invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains no regular files.
    #[error("archive contains no files")]
    EmptyArchive,

    /// The archive format could not be determined.
    #[error("unrecognized archive format for {name}")]
    UnknownFormat {
        /// The file name or URL used as a hint.
        name: String,
    },

    /// No extracted file matches the binary.
    #[error("binary {name} not found in archive")]
    BinaryNotFound {
        /// The binary name or configured path.
        name: String,
    },

    /// Several extracted files match the binary name.
    #[error("binary {name} is ambiguous; candidates: {candidates}")]
    AmbiguousBinary {
        /// The binary name.
        name: String,
        /// Comma-separated candidate paths.
        candidates: String,
    },
}

/// Default extractor using the `tar`, `flate2`, `zstd` and `zip` crates.
///
/// Validates each entry path before extraction to guard against
/// path traversal attacks (zip-slip).
pub struct DefaultExtractor;

impl ArchiveExtractor for DefaultExtractor {
    fn extract(
        &self,
        archive_path: &Path,
        format: ArchiveFormat,
        dest_dir: &Path,
    ) -> Result<Vec<PathBuf>, ExtractionError> {
        debug!(target: "extract", "extracting {} as {format:?}", archive_path.display());
        let file = File::open(archive_path)?;
        let extracted = match format {
            ArchiveFormat::TarGz => unpack_tar(flate2::read::GzDecoder::new(file), dest_dir)?,
            ArchiveFormat::TarZst => unpack_tar(zstd::Decoder::new(file)?, dest_dir)?,
            ArchiveFormat::Tar => unpack_tar(file, dest_dir)?,
            ArchiveFormat::Zip => unpack_zip(file, dest_dir)?,
        };
        if extracted.is_empty() {
            return Err(ExtractionError::EmptyArchive);
        }
        Ok(extracted)
    }
}

fn unpack_tar(reader: impl Read, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let mut archive = tar::Archive::new(reader);
    let mut extracted = Vec::new();

    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_path = entry.path()?.into_owned();

        validate_entry_path(&entry_path)?;

        let dest_path = dest_dir.join(&entry_path);
        match entry.header().entry_type() {
            tar::EntryType::Directory => fs::create_dir_all(&dest_path)?,
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                if let Some(parent) = dest_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                entry.unpack(&dest_path)?;
                extracted.push(entry_path);
            }
            other => trace!(target: "extract", "skipping {other:?} entry {}", entry_path.display()),
        }
    }
    Ok(extracted)
}

fn unpack_zip(file: File, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let entry_path = PathBuf::from(entry.name());
        validate_entry_path(&entry_path)?;
        let Some(safe_path) = entry.enclosed_name() else {
            return Err(ExtractionError::PathTraversal {
                path: entry.name().to_owned(),
            });
        };

        let dest_path = dest_dir.join(&safe_path);
        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }
        if !entry.is_file() {
            trace!(target: "extract", "skipping special zip entry {}", entry.name());
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&dest_path)?;
        io::copy(&mut entry, &mut output)?;
        extracted.push(safe_path);
    }
    Ok(extracted)
}

/// Validate that an entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::RootDir | Component::Prefix(_)
                )
            });
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Find the binary among the extracted files.
///
/// With `explicit`, exactly that relative path must be an extracted regular
/// file. Otherwise every file whose name equals `file_name` is a candidate
/// and there must be exactly one.
///
/// # Errors
///
/// Returns [`ExtractionError::BinaryNotFound`] for zero matches and
/// [`ExtractionError::AmbiguousBinary`] for several.
pub fn locate_binary(
    dest_dir: &Path,
    extracted: &[PathBuf],
    file_name: &str,
    explicit: Option<&Utf8Path>,
) -> Result<PathBuf, ExtractionError> {
    if let Some(relative) = explicit {
        let wanted = normalize(relative.as_std_path());
        return extracted
            .iter()
            .find(|path| normalize(path) == wanted)
            .map(|path| dest_dir.join(path))
            .ok_or_else(|| ExtractionError::BinaryNotFound {
                name: relative.to_string(),
            });
    }

    let candidates: Vec<&PathBuf> = extracted
        .iter()
        .filter(|path| path.file_name().is_some_and(|name| name == file_name))
        .collect();
    match candidates.as_slice() {
        [] => Err(ExtractionError::BinaryNotFound {
            name: file_name.to_owned(),
        }),
        [only] => Ok(dest_dir.join(only)),
        many => Err(ExtractionError::AmbiguousBinary {
            name: file_name.to_owned(),
            candidates: many
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Drop `.` components so `./bin/poof` and `bin/poof` compare equal.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_archive;
    use rstest::rstest;
    use tempfile::TempDir;

    fn write_archive(
        dir: &TempDir,
        name: &str,
        format: ArchiveFormat,
        files: &[(&str, &[u8])],
    ) -> PathBuf {
        let path = dir.path().join(name);
        let archive = build_archive(format, files).expect("build archive");
        fs::write(&path, archive).expect("write archive");
        path
    }

    #[rstest]
    #[case::tar_gz(ArchiveFormat::TarGz)]
    #[case::tar_zst(ArchiveFormat::TarZst)]
    #[case::tar(ArchiveFormat::Tar)]
    #[case::zip(ArchiveFormat::Zip)]
    fn extracts_every_supported_format(#[case] format: ArchiveFormat) {
        let dir = TempDir::new().expect("temp dir");
        let archive = write_archive(
            &dir,
            "release",
            format,
            &[("poof-0.5.2/poof", b"#!/bin/sh\n"), ("poof-0.5.2/README.md", b"docs")],
        );
        let dest = dir.path().join("out");
        fs::create_dir_all(&dest).expect("create dest");

        let files = DefaultExtractor
            .extract(&archive, format, &dest)
            .expect("extract");

        assert_eq!(files.len(), 2);
        assert!(dest.join("poof-0.5.2/poof").is_file());
    }

    #[rstest]
    #[case::tar_gz(ArchiveFormat::TarGz)]
    #[case::tar_zst(ArchiveFormat::TarZst)]
    #[case::tar(ArchiveFormat::Tar)]
    #[case::zip(ArchiveFormat::Zip)]
    fn sniffs_format_from_contents(#[case] format: ArchiveFormat) {
        let dir = TempDir::new().expect("temp dir");
        let archive = write_archive(&dir, "download", format, &[("poof", b"binary")]);
        assert_eq!(
            ArchiveFormat::detect("download", &archive).expect("detected"),
            format
        );
    }

    #[test]
    fn unknown_format_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("blob");
        fs::write(&path, b"plain text, not an archive").expect("write blob");
        assert!(matches!(
            ArchiveFormat::detect("blob", &path),
            Err(ExtractionError::UnknownFormat { .. })
        ));
    }

    #[rstest]
    #[case::parent_dir("../escape.txt")]
    #[case::nested_parent("foo/../../escape.txt")]
    #[case::absolute("/etc/passwd")]
    fn rejects_path_traversal(#[case] bad_path: &str) {
        let result = validate_entry_path(Path::new(bad_path));
        assert!(
            matches!(result, Err(ExtractionError::PathTraversal { .. })),
            "expected PathTraversal for {bad_path}"
        );
    }

    #[test]
    fn accepts_normal_paths() {
        assert!(validate_entry_path(Path::new("./bin/poof")).is_ok());
    }

    #[test]
    fn empty_archive_is_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let archive = write_archive(&dir, "empty.tar.gz", ArchiveFormat::TarGz, &[]);
        let result = DefaultExtractor.extract(&archive, ArchiveFormat::TarGz, dir.path());
        assert!(matches!(result, Err(ExtractionError::EmptyArchive)));
    }

    fn paths(raw: &[&str]) -> Vec<PathBuf> {
        raw.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn locates_single_candidate_by_name() {
        let extracted = paths(&["poof-0.5.2/poof", "poof-0.5.2/LICENSE"]);
        let found = locate_binary(Path::new("/out"), &extracted, "poof", None).expect("found");
        assert_eq!(found, Path::new("/out/poof-0.5.2/poof"));
    }

    #[test]
    fn zero_candidates_is_an_error() {
        let extracted = paths(&["LICENSE", "poofd"]);
        let result = locate_binary(Path::new("/out"), &extracted, "poof", None);
        assert!(matches!(result, Err(ExtractionError::BinaryNotFound { .. })));
    }

    #[test]
    fn multiple_candidates_is_an_error() {
        let extracted = paths(&["x86/poof", "arm/poof"]);
        let err =
            locate_binary(Path::new("/out"), &extracted, "poof", None).expect_err("ambiguous");
        assert!(matches!(err, ExtractionError::AmbiguousBinary { .. }));
        assert!(err.to_string().contains("x86/poof"));
    }

    #[test]
    fn explicit_path_disambiguates() {
        let extracted = paths(&["x86/poof", "arm/poof"]);
        let found = locate_binary(
            Path::new("/out"),
            &extracted,
            "poof",
            Some(Utf8Path::new("./arm/poof")),
        )
        .expect("explicit path");
        assert_eq!(found, Path::new("/out/arm/poof"));
    }

    #[test]
    fn explicit_path_must_exist() {
        let extracted = paths(&["poof"]);
        let nested = Some(Utf8Path::new("bin/poof"));
        let result = locate_binary(Path::new("/out"), &extracted, "poof", nested);
        assert!(matches!(result, Err(ExtractionError::BinaryNotFound { .. })));
    }
}
