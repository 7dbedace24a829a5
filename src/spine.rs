//! Spine: the linear reading order of the package
//!
//! The spine references manifest ids only. The EPUB 2 `toc` attribute
//! names the manifest id of the NCX document.

use quick_xml::Writer;

use crate::error::BookError;
use crate::metadata::{write_empty_element, write_end, write_start};

/// Spine represents the reading order of the book
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spine {
    /// Ordered manifest ids
    idrefs: Vec<String>,
    /// Manifest id of the NCX navigation document
    toc_id: String,
}

impl Spine {
    /// Create an empty spine whose `toc` attribute is `toc_id`
    pub fn new(toc_id: impl Into<String>) -> Self {
        Self {
            idrefs: Vec::new(),
            toc_id: toc_id.into(),
        }
    }

    /// Append a page to the reading order
    pub fn push(&mut self, idref: impl Into<String>) {
        self.idrefs.push(idref.into());
    }

    /// Ordered manifest ids
    pub fn idrefs(&self) -> &[String] {
        &self.idrefs
    }

    /// Manifest id of the NCX document
    pub fn toc_id(&self) -> &str {
        &self.toc_id
    }

    /// Get total number of pages
    pub fn len(&self) -> usize {
        self.idrefs.len()
    }

    /// Check if spine is empty
    pub fn is_empty(&self) -> bool {
        self.idrefs.is_empty()
    }

    /// Serialize `<spine toc="..."><itemref idref="..."/>...</spine>`
    pub(crate) fn write(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), BookError> {
        write_start(writer, "spine", &[("toc", self.toc_id.as_str())])?;
        for idref in &self.idrefs {
            write_empty_element(writer, "itemref", &[("idref", idref.as_str())])?;
        }
        write_end(writer, "spine")
    }
}
