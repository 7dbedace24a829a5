//! EPUB 2.0 NCX navigation document
//!
//! The NCX is the reader-facing table of contents. Each navigation point
//! carries a label and an OPF-relative `src`; the package assembler keeps
//! the points in the same order as the spine.

use quick_xml::Writer;

use crate::error::BookError;
use crate::metadata::{write_empty_element, write_end, write_start, write_text_element, xml_writer};

const NS_NCX: &str = "http://www.daisy.org/z3986/2005/ncx/";
const NCX_DOCTYPE: &str = r#"<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">"#;

/// A single navigation point (table of contents entry)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavPoint {
    /// Id of the navigation point (matches the page's manifest id)
    pub id: String,
    /// Display label for this navigation point
    pub label: String,
    /// Content href, relative to the OPF
    pub src: String,
}

/// Complete NCX table of contents
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Navigation {
    /// `dtb:uid`; must equal the package identifier
    pub uid: String,
    /// `<docTitle>` text
    pub doc_title: String,
    /// `xml:lang` of the document
    pub language: String,
    /// Flat list of navigation points in reading order
    pub points: Vec<NavPoint>,
}

impl Navigation {
    /// Create an empty navigation document
    pub fn new(uid: impl Into<String>, doc_title: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            doc_title: doc_title.into(),
            language: "en".to_string(),
            points: Vec::new(),
        }
    }

    /// Set the document language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Append a navigation point
    pub fn push(&mut self, id: impl Into<String>, label: impl Into<String>, src: impl Into<String>) {
        self.points.push(NavPoint {
            id: id.into(),
            label: label.into(),
            src: src.into(),
        });
    }

    /// Number of navigation points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the navigation has no entries
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Serialize as `toc.ncx`
    pub fn to_ncx(&self) -> Result<Vec<u8>, BookError> {
        let mut writer = xml_writer(Some(NCX_DOCTYPE));
        write_start(
            &mut writer,
            "ncx",
            &[
                ("xmlns", NS_NCX),
                ("version", "2005-1"),
                ("xml:lang", self.language.as_str()),
            ],
        )?;

        write_start(&mut writer, "head", &[])?;
        write_empty_element(
            &mut writer,
            "meta",
            &[("name", "dtb:uid"), ("content", self.uid.as_str())],
        )?;
        write_empty_element(&mut writer, "meta", &[("name", "dtb:depth"), ("content", "1")])?;
        write_empty_element(
            &mut writer,
            "meta",
            &[("name", "dtb:totalPageCount"), ("content", "0")],
        )?;
        write_empty_element(
            &mut writer,
            "meta",
            &[("name", "dtb:maxPageNumber"), ("content", "0")],
        )?;
        write_end(&mut writer, "head")?;

        write_start(&mut writer, "docTitle", &[])?;
        write_text_element(&mut writer, "text", &[], &self.doc_title)?;
        write_end(&mut writer, "docTitle")?;

        write_start(&mut writer, "navMap", &[])?;
        for (idx, point) in self.points.iter().enumerate() {
            write_nav_point(&mut writer, point, idx + 1)?;
        }
        write_end(&mut writer, "navMap")?;
        write_end(&mut writer, "ncx")?;
        Ok(writer.into_inner())
    }
}

fn write_nav_point(
    writer: &mut Writer<Vec<u8>>,
    point: &NavPoint,
    play_order: usize,
) -> Result<(), BookError> {
    let order = play_order.to_string();
    write_start(
        writer,
        "navPoint",
        &[("id", point.id.as_str()), ("playOrder", order.as_str())],
    )?;
    write_start(writer, "navLabel", &[])?;
    write_text_element(writer, "text", &[], &point.label)?;
    write_end(writer, "navLabel")?;
    write_empty_element(writer, "content", &[("src", point.src.as_str())])?;
    write_end(writer, "navPoint")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ncx_structure() {
        let mut nav = Navigation::new("urn:uuid:abc", "My Book");
        nav.push("cover", "Cover", "cover.xhtml");
        nav.push("article0", "First <story>", "article0.xhtml");
        let xml = String::from_utf8(nav.to_ncx().unwrap()).unwrap();

        assert!(xml.contains("<!DOCTYPE ncx PUBLIC"));
        assert!(xml.contains(r#"<meta name="dtb:uid" content="urn:uuid:abc"/>"#));
        assert!(xml.contains("<text>My Book</text>"));
        assert!(xml.contains(r#"<navPoint id="cover" playOrder="1">"#));
        assert!(xml.contains(r#"<navPoint id="article0" playOrder="2">"#));
        assert!(xml.contains("<text>First &lt;story&gt;</text>"));
        assert!(xml.contains(r#"<content src="article0.xhtml"/>"#));
        assert!(xml.contains(r#"xml:lang="en""#));
    }

    #[test]
    fn test_ncx_language() {
        let nav = Navigation::new("u", "Livre").with_language("fr");
        let xml = String::from_utf8(nav.to_ncx().unwrap()).unwrap();
        assert!(xml.contains(r#"xml:lang="fr""#));
        assert!(!xml.contains(r#"xml:lang="en""#));
    }

    #[test]
    fn test_navigation_len() {
        let mut nav = Navigation::new("u", "t");
        assert!(nav.is_empty());
        nav.push("a", "A", "a.xhtml");
        assert_eq!(nav.len(), 1);
    }
}
