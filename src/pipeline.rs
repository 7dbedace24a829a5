//! End-to-end run: article records in, EPUB file out.
//!
//! Per-item failures (unusable records, bodies that do not transform,
//! thumbnails that do not decode) are collected into the [`BookReport`]
//! and logged where they are absorbed. Only cover allocation, archive
//! I/O and package integrity abort the run.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rayon::prelude::*;
use skybook_cover::{load_tile, render_cover_jpeg, CoverOptions, DecodeError, Tile};

use crate::article::{ArticleRecord, ItemFailure, SkipReason};
use crate::book::{BookOptions, EpubBuilder};
use crate::error::BookError;
use crate::naming::cover_subtitle;
use crate::xhtml::{transform_html_with_limits, TransformLimits};

/// Everything a run needs besides its input and output
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// Book metadata and packaging settings
    pub book: BookOptions,
    /// Cover rendering settings
    pub cover: CoverOptions,
    /// Article body limits
    pub transform: TransformLimits,
}

impl PipelineOptions {
    /// Derive cover settings from the book: same title, creation-date subtitle.
    pub fn new(book: BookOptions) -> Self {
        let cover = CoverOptions::new(book.title.clone())
            .with_subtitle(cover_subtitle(book.created.date()));
        Self {
            book,
            cover,
            transform: TransformLimits::default(),
        }
    }

    /// Replace cover settings
    pub fn with_cover(mut self, cover: CoverOptions) -> Self {
        self.cover = cover;
        self
    }

    /// Replace transform limits
    pub fn with_transform_limits(mut self, limits: TransformLimits) -> Self {
        self.transform = limits;
        self
    }
}

/// A thumbnail that could not be used
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileFailure {
    /// URL of the article the thumbnail belongs to
    pub url: String,
    /// Decoder error
    pub error: DecodeError,
}

/// Outcome of a successful run
#[derive(Clone, Debug)]
pub struct BookReport {
    /// Written file
    pub output: PathBuf,
    /// Package identifier
    pub identifier: String,
    /// URLs of packaged articles, in reading order
    pub articles: Vec<String>,
    /// Thumbnails placed on the cover
    pub tiles_used: usize,
    /// Records left out of the book
    pub skipped: Vec<ItemFailure>,
    /// Thumbnails that failed to decode
    pub tile_failures: Vec<TileFailure>,
}

/// An article that survived filtering, with its transformed body
#[derive(Clone, Debug)]
pub struct PreparedArticle<'a> {
    /// Source record
    pub record: &'a ArticleRecord,
    /// Well-formed XHTML body fragment
    pub content: String,
}

/// Filter and transform records, keeping input order.
///
/// Records without title or body, repeated URLs and bodies that fail to
/// transform become [`ItemFailure`]s. Transformation runs in parallel.
pub fn prepare_articles<'a>(
    records: &'a [ArticleRecord],
    limits: TransformLimits,
) -> (Vec<PreparedArticle<'a>>, Vec<ItemFailure>) {
    let mut seen = BTreeSet::new();
    let checked: Vec<Result<&ArticleRecord, ItemFailure>> = records
        .iter()
        .map(|record| {
            record.check_usable().map_err(|reason| ItemFailure {
                url: record.url.clone(),
                reason,
            })?;
            if !seen.insert(record.url.as_str()) {
                return Err(ItemFailure {
                    url: record.url.clone(),
                    reason: SkipReason::DuplicateUrl,
                });
            }
            Ok(record)
        })
        .collect();

    let transformed: Vec<Result<PreparedArticle<'a>, ItemFailure>> = checked
        .into_par_iter()
        .map(|checked| {
            let record = checked?;
            transform_html_with_limits(&record.body_markup, limits)
                .map(|content| PreparedArticle { record, content })
                .map_err(|err| ItemFailure {
                    url: record.url.clone(),
                    reason: SkipReason::Transform(err),
                })
        })
        .collect();

    let mut prepared = Vec::new();
    let mut skipped = Vec::new();
    for item in transformed {
        match item {
            Ok(article) => prepared.push(article),
            Err(failure) => {
                warn!("[BOOK] Skipping article {}", failure);
                skipped.push(failure);
            }
        }
    }
    (prepared, skipped)
}

/// Decode thumbnails in input order until `max_tiles` have decoded.
///
/// Decoding runs in parallel over batches no larger than the number of
/// tiles still missing, so articles past the cap are never decoded.
pub fn collect_tiles(
    articles: &[PreparedArticle<'_>],
    max_tiles: usize,
) -> (Vec<Tile>, Vec<TileFailure>) {
    let mut tiles = Vec::new();
    let mut failures = Vec::new();
    let mut pending = articles.iter().filter_map(|article| {
        let bytes = article.record.thumbnail.as_deref()?;
        Some((article.record.url.as_str(), bytes))
    });

    while tiles.len() < max_tiles {
        let batch: Vec<(&str, &[u8])> = pending.by_ref().take(max_tiles - tiles.len()).collect();
        if batch.is_empty() {
            break;
        }
        let decoded: Vec<Result<Tile, TileFailure>> = batch
            .par_iter()
            .map(|(url, bytes)| {
                load_tile(bytes).map_err(|error| TileFailure {
                    url: url.to_string(),
                    error,
                })
            })
            .collect();
        for item in decoded {
            match item {
                Ok(tile) => tiles.push(tile),
                Err(failure) => {
                    warn!(
                        "[COVER] Thumbnail for {} unusable: {}",
                        failure.url, failure.error
                    );
                    failures.push(failure);
                }
            }
        }
    }
    (tiles, failures)
}

/// Build a book from `records` and write it atomically to `output`.
pub fn build_book(
    records: &[ArticleRecord],
    options: &PipelineOptions,
    output: &Path,
) -> Result<BookReport, BookError> {
    info!("[BOOK] Building '{}' from {} records", options.book.title, records.len());

    let (articles, skipped) = prepare_articles(records, options.transform);
    if articles.is_empty() {
        return Err(BookError::NoArticles);
    }

    let (tiles, tile_failures) = collect_tiles(&articles, options.cover.max_tiles);
    let tiles_used = tiles.len();
    let cover_jpeg = render_cover_jpeg(&tiles, &options.cover)?;
    drop(tiles);

    let mut builder = EpubBuilder::new(options.book.clone(), cover_jpeg);
    for article in &articles {
        builder.add_article(article.record, &article.content)?;
    }
    let package = builder.write_file(output)?;

    info!(
        "[BOOK] Packaged {} articles ({} skipped), cover from {} thumbnails",
        articles.len(),
        skipped.len(),
        tiles_used
    );
    Ok(BookReport {
        output: output.to_path_buf(),
        identifier: package.identifier,
        articles: articles.iter().map(|a| a.record.url.clone()).collect(),
        tiles_used,
        skipped,
        tile_failures,
    })
}
