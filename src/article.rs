//! Article records handed over by the feed/extraction stage
//!
//! Records are immutable input. Their order is the reading order of the
//! book. A record that cannot become a page is reported as an
//! [`ItemFailure`] and dropped; it never aborts the run.

use std::fmt;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Deserialize;

use crate::xhtml::TransformError;

/// One article to package
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArticleRecord {
    /// Source URL; unique key of the record
    pub url: String,
    /// Article title, used for the page heading and table of contents
    pub title: String,
    /// HTML (or plain text) body
    pub body_markup: String,
    /// Raw thumbnail bytes, undecoded
    pub thumbnail: Option<Vec<u8>>,
    /// Byline, if known
    pub author: Option<String>,
    /// Publication date as extracted, free-form
    pub published: Option<String>,
}

impl ArticleRecord {
    /// Create a record without thumbnail or byline
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        body_markup: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            body_markup: body_markup.into(),
            ..Self::default()
        }
    }

    /// Attach raw thumbnail bytes
    pub fn with_thumbnail(mut self, bytes: Vec<u8>) -> Self {
        self.thumbnail = Some(bytes);
        self
    }

    /// Attach a byline
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Attach a publication date
    pub fn with_published(mut self, published: impl Into<String>) -> Self {
        self.published = Some(published.into());
        self
    }

    /// Check the minimum a record needs to become a page.
    pub fn check_usable(&self) -> Result<(), SkipReason> {
        if self.title.trim().is_empty() {
            return Err(SkipReason::MissingTitle);
        }
        if self.body_markup.trim().is_empty() {
            return Err(SkipReason::MissingBody);
        }
        Ok(())
    }
}

/// Why a record was left out of the book
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum SkipReason {
    /// Title is empty
    MissingTitle,
    /// Body is empty
    MissingBody,
    /// Another record with the same URL came first
    DuplicateUrl,
    /// Body could not be converted to XHTML
    Transform(TransformError),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingTitle => write!(f, "missing title"),
            SkipReason::MissingBody => write!(f, "missing body"),
            SkipReason::DuplicateUrl => write!(f, "duplicate URL"),
            SkipReason::Transform(err) => write!(f, "transform failed: {}", err),
        }
    }
}

/// A record that was dropped, and why
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemFailure {
    /// URL of the dropped record
    pub url: String,
    /// Cause
    pub reason: SkipReason,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.reason)
    }
}

/// Article as stored in a JSON input file
///
/// `thumbnail` is a path to a local image file, resolved against the
/// directory of the input file when relative.
#[derive(Clone, Debug, Deserialize)]
pub struct ArticleInput {
    /// Source URL
    pub url: String,
    /// Article title
    #[serde(default)]
    pub title: String,
    /// Article body
    #[serde(default, alias = "content_html", alias = "body_markup")]
    pub body: String,
    /// Local thumbnail path
    #[serde(default)]
    pub thumbnail: Option<PathBuf>,
    /// Byline
    #[serde(default)]
    pub author: Option<String>,
    /// Publication date
    #[serde(default, alias = "date")]
    pub published: Option<String>,
}

impl ArticleInput {
    /// Turn the input into a record, reading the thumbnail file.
    ///
    /// An unreadable thumbnail is logged and leaves the record without one.
    pub fn into_record(self, base_dir: &Path) -> ArticleRecord {
        let thumbnail = self.thumbnail.and_then(|path| {
            let path = if path.is_relative() {
                base_dir.join(path)
            } else {
                path
            };
            match std::fs::read(&path) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    warn!(
                        "[BOOK] thumbnail {} for {} unreadable: {}",
                        path.display(),
                        self.url,
                        err
                    );
                    None
                }
            }
        });
        ArticleRecord {
            url: self.url,
            title: self.title,
            body_markup: self.body,
            thumbnail,
            author: self.author,
            published: self.published,
        }
    }
}
