//! skybook -- EPUB 2 books with mosaic covers from lists of linked articles
//!
//! Takes an ordered list of [`ArticleRecord`]s (title, HTML body, optional
//! thumbnail bytes) and produces one EPUB file: a cover mosaic built from
//! the thumbnails, a table of contents, and one XHTML page per article.
//!
//! # Pipeline
//!
//! - [`xhtml`] -- sanitizes article HTML into well-formed XHTML 1.1
//! - [`skybook_cover`] -- decodes thumbnails and renders the 1264x1680 cover
//! - [`book`] -- assembles manifest, spine and NCX, checks them, writes the ZIP
//! - [`pipeline`] -- runs the above with per-item failure isolation
//!
//! Fetching feeds and extracting articles from web pages happens upstream;
//! this crate starts from already-extracted records.
//!
//! # Features
//!
//! - `cli` -- builds the `skybook` binary (`clap`, `flexi_logger`, `serde_json`)

#![warn(missing_docs)]
#![deny(clippy::large_enum_variant, clippy::large_stack_arrays, clippy::redundant_clone)]
#![warn(
    clippy::box_collection,
    clippy::needless_collect,
    clippy::map_clone,
    clippy::implicit_clone,
    clippy::inefficient_to_string
)]

pub mod article;
pub mod book;
pub mod error;
pub mod metadata;
pub mod naming;
pub mod navigation;
pub mod pipeline;
pub mod spine;
pub mod validate;
pub mod xhtml;
pub mod zip;

// Re-export key types for convenience
pub use article::{ArticleInput, ArticleRecord, ItemFailure, SkipReason};
pub use book::{AssembledPackage, BookOptions, EpubBuilder, PackageEntry, PackagePage};
pub use error::{BookError, IntegrityViolation, ZipError, ZipErrorKind};
pub use metadata::{BookMetadata, Manifest, ManifestItem};
pub use naming::{default_output_name, normalize_account, sanitize_filename};
pub use navigation::{NavPoint, Navigation};
pub use pipeline::{build_book, BookReport, PipelineOptions, TileFailure};
pub use skybook_cover::{CoverError, CoverOptions, DecodeError};
pub use spine::Spine;
pub use xhtml::{transform_html, TransformError, TransformLimits};
pub use zip::{Compression, StreamingZip, ZipWriter};
