//! Unified error types for skybook
//!
//! Provides a top-level `BookError` that wraps module-specific errors,
//! plus `From` impls so `?` works across module boundaries.

use core::fmt;

use skybook_cover::CoverError;

/// Top-level error type for package assembly
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BookError {
    /// ZIP archive error
    Zip(ZipError),
    /// XML serialization error
    Xml(String),
    /// I/O error (description only, since `std::io::Error` is not `Clone`)
    Io(String),
    /// Cover could not be produced
    Cover(CoverError),
    /// The manifest/spine/navigation reference graph is inconsistent
    Integrity(IntegrityViolation),
    /// No article survived filtering and transformation
    NoArticles,
    /// Output path has no usable file name or parent directory
    InvalidOutputPath(String),
}

impl fmt::Display for BookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookError::Zip(kind) => write!(f, "ZIP error: {}", kind),
            BookError::Xml(msg) => write!(f, "XML error: {}", msg),
            BookError::Io(msg) => write!(f, "I/O error: {}", msg),
            BookError::Cover(err) => write!(f, "Cover error: {}", err),
            BookError::Integrity(violation) => {
                write!(f, "Package integrity violation: {}", violation)
            }
            BookError::NoArticles => write!(f, "No usable articles to package"),
            BookError::InvalidOutputPath(path) => write!(f, "Invalid output path: {}", path),
        }
    }
}

/// Which cross-reference invariant of the package broke.
///
/// These indicate an id-generation bug, never bad user input.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IntegrityViolation {
    /// Two manifest items share an id
    DuplicateManifestId {
        /// Repeated id.
        id: String,
    },
    /// Two manifest items point at the same file
    DuplicateManifestHref {
        /// Repeated href.
        href: String,
    },
    /// Spine `idref` has no manifest item
    SpineIdrefMissing {
        /// Unresolved idref.
        idref: String,
    },
    /// Spine references a manifest item that is not an XHTML page
    SpineItemNotXhtml {
        /// Offending idref.
        idref: String,
    },
    /// Spine does not start with the cover page
    CoverNotFirst,
    /// Navigation point targets a file that no manifest item declares
    NavTargetMissing {
        /// Navigation point id.
        nav_id: String,
        /// Unresolved content src.
        src: String,
    },
    /// Navigation order differs from spine order
    NavOrderMismatch {
        /// Position of the first mismatch.
        index: usize,
    },
    /// A manifest item has no file in the planned archive
    ManifestFileMissing {
        /// Manifest item id.
        id: String,
    },
    /// A planned archive file is not declared in the manifest
    FileNotInManifest {
        /// Archive path.
        path: String,
    },
    /// A planned archive path appears twice
    DuplicateArchivePath {
        /// Repeated path.
        path: String,
    },
    /// The `mimetype` entry is not first or is compressed
    MimetypeLayout,
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityViolation::DuplicateManifestId { id } => {
                write!(f, "duplicate manifest id '{}'", id)
            }
            IntegrityViolation::DuplicateManifestHref { href } => {
                write!(f, "duplicate manifest href '{}'", href)
            }
            IntegrityViolation::SpineIdrefMissing { idref } => {
                write!(f, "spine item '{}' does not exist in manifest", idref)
            }
            IntegrityViolation::SpineItemNotXhtml { idref } => {
                write!(f, "spine item '{}' is not an XHTML document", idref)
            }
            IntegrityViolation::CoverNotFirst => write!(f, "cover page is not first in spine"),
            IntegrityViolation::NavTargetMissing { nav_id, src } => write!(
                f,
                "navigation point '{}' targets '{}' which is not in manifest",
                nav_id, src
            ),
            IntegrityViolation::NavOrderMismatch { index } => {
                write!(f, "navigation order diverges from spine at position {}", index)
            }
            IntegrityViolation::ManifestFileMissing { id } => {
                write!(f, "manifest item '{}' has no file in archive", id)
            }
            IntegrityViolation::FileNotInManifest { path } => {
                write!(f, "archive file '{}' is not listed in manifest", path)
            }
            IntegrityViolation::DuplicateArchivePath { path } => {
                write!(f, "archive path '{}' is written twice", path)
            }
            IntegrityViolation::MimetypeLayout => {
                write!(f, "mimetype must be the first, uncompressed entry")
            }
        }
    }
}

/// ZIP-specific error variants
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ZipErrorKind {
    /// File not found in archive
    FileNotFound,
    /// Invalid ZIP format
    InvalidFormat,
    /// Unsupported compression method
    UnsupportedCompression,
    /// Decompression failed
    DecompressError,
    /// CRC32 mismatch
    CrcMismatch,
    /// I/O error during ZIP operations
    IoError,
    /// Entry or archive exceeds the 32-bit ZIP size fields
    FileTooLarge,
    /// More entries than the 16-bit entry count allows
    TooManyEntries,
    /// Entry name is empty, absolute, or too long
    InvalidEntryName(String),
    /// Same entry name written twice
    DuplicateEntry(String),
    /// Invalid or missing mimetype file
    InvalidMimetype(String),
    /// ZIP64 structures are present but unsupported
    UnsupportedZip64,
}

/// Public ZIP error type alias used across the crate API.
pub type ZipError = ZipErrorKind;

impl fmt::Display for ZipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZipErrorKind::FileNotFound => write!(f, "file not found in archive"),
            ZipErrorKind::InvalidFormat => write!(f, "invalid ZIP format"),
            ZipErrorKind::UnsupportedCompression => write!(f, "unsupported compression method"),
            ZipErrorKind::DecompressError => write!(f, "decompression failed"),
            ZipErrorKind::CrcMismatch => write!(f, "CRC32 checksum mismatch"),
            ZipErrorKind::IoError => write!(f, "I/O error"),
            ZipErrorKind::FileTooLarge => write!(f, "file too large"),
            ZipErrorKind::TooManyEntries => write!(f, "too many entries"),
            ZipErrorKind::InvalidEntryName(name) => write!(f, "invalid entry name '{}'", name),
            ZipErrorKind::DuplicateEntry(name) => write!(f, "duplicate entry '{}'", name),
            ZipErrorKind::InvalidMimetype(msg) => write!(f, "invalid mimetype: {}", msg),
            ZipErrorKind::UnsupportedZip64 => write!(f, "ZIP64 is not supported"),
        }
    }
}

impl std::error::Error for BookError {}

impl std::error::Error for ZipErrorKind {}

impl std::error::Error for IntegrityViolation {}

impl From<ZipError> for BookError {
    fn from(err: ZipError) -> Self {
        BookError::Zip(err)
    }
}

impl From<IntegrityViolation> for BookError {
    fn from(err: IntegrityViolation) -> Self {
        BookError::Integrity(err)
    }
}

impl From<CoverError> for BookError {
    fn from(err: CoverError) -> Self {
        BookError::Cover(err)
    }
}

impl From<std::io::Error> for BookError {
    fn from(err: std::io::Error) -> Self {
        BookError::Io(err.to_string())
    }
}
