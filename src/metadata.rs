//! Book metadata and manifest model
//!
//! Holds the Dublin Core fields written into `content.opf`, the manifest
//! that declares every content file, and the fixed OCF container pointer.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Display;

use chrono::NaiveDate;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::{BookError, IntegrityViolation};

/// Content of the `mimetype` entry.
pub const EPUB_MIMETYPE: &str = "application/epub+zip";
/// Archive path of the container pointer.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";
/// Directory holding the package document and all content files.
pub const CONTENT_DIR: &str = "OEBPS";
/// Package document file name inside [`CONTENT_DIR`].
pub const OPF_FILE: &str = "content.opf";

/// Media type of XHTML content documents.
pub const MEDIA_XHTML: &str = "application/xhtml+xml";
/// Media type of the NCX navigation document.
pub const MEDIA_NCX: &str = "application/x-dtbncx+xml";
/// Media type of CSS stylesheets.
pub const MEDIA_CSS: &str = "text/css";
/// Media type of JPEG images.
pub const MEDIA_JPEG: &str = "image/jpeg";
/// Media type of the package document.
pub const MEDIA_OPF: &str = "application/oebps-package+xml";

pub(crate) const NS_OPF: &str = "http://www.idpf.org/2007/opf";
const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
const NS_CONTAINER: &str = "urn:oasis:names:tc:opendocument:xmlns:container";

pub(crate) const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Archive path of the package document.
pub fn opf_path() -> String {
    format!("{}/{}", CONTENT_DIR, OPF_FILE)
}

/// Dublin Core metadata for the package
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookMetadata {
    /// Book title
    pub title: String,
    /// Author name
    pub author: String,
    /// Language code (e.g. "en")
    pub language: String,
    /// Unique identifier, typically `urn:uuid:...`
    pub identifier: String,
    /// Publication date
    pub date: NaiveDate,
    /// Optional description
    pub description: Option<String>,
}

/// A single item in the manifest (id -> href mapping)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestItem {
    /// Resource identifier
    pub id: String,
    /// Path relative to the OPF
    pub href: String,
    /// MIME type
    pub media_type: String,
}

impl ManifestItem {
    /// Archive path of this item (OPF-relative href under [`CONTENT_DIR`]).
    pub fn archive_path(&self) -> String {
        format!("{}/{}", CONTENT_DIR, self.href)
    }
}

/// Ordered manifest with unique ids and hrefs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    items: Vec<ManifestItem>,
    by_id: BTreeMap<String, usize>,
}

impl Manifest {
    /// Create an empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource; ids and hrefs must both be unique.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        href: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Result<(), IntegrityViolation> {
        let item = ManifestItem {
            id: id.into(),
            href: href.into(),
            media_type: media_type.into(),
        };
        if self.by_id.contains_key(&item.id) {
            return Err(IntegrityViolation::DuplicateManifestId { id: item.id });
        }
        if self.find_by_href(&item.href).is_some() {
            return Err(IntegrityViolation::DuplicateManifestHref { href: item.href });
        }
        self.by_id.insert(item.id.clone(), self.items.len());
        self.items.push(item);
        Ok(())
    }

    /// Look up an item by id
    pub fn get(&self, id: &str) -> Option<&ManifestItem> {
        self.by_id.get(id).map(|&idx| &self.items[idx])
    }

    /// Look up an item by OPF-relative href
    pub fn find_by_href(&self, href: &str) -> Option<&ManifestItem> {
        self.items.iter().find(|item| item.href == href)
    }

    /// Whether an id is declared
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// All items in declaration order
    pub fn items(&self) -> &[ManifestItem] {
        &self.items
    }

    /// Number of declared items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is declared
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub(crate) fn xml_err<E: Display>(err: E) -> BookError {
    BookError::Xml(err.to_string())
}

/// Whether XML 1.0 allows `ch` in character data.
fn is_xml_char(ch: char) -> bool {
    matches!(ch, '\t' | '\n' | '\r') || (ch >= ' ' && !matches!(ch, '\u{FFFE}' | '\u{FFFF}'))
}

/// `text` without the characters XML 1.0 forbids (C0 controls other than
/// tab, newline and carriage return, and U+FFFE/U+FFFF).
pub(crate) fn xml_chars(text: &str) -> Cow<'_, str> {
    if text.chars().all(is_xml_char) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|ch| is_xml_char(*ch)).collect())
    }
}

fn start_tag<'a>(name: &'a str, attributes: &[(&str, &str)]) -> BytesStart<'a> {
    let mut start = BytesStart::new(name);
    for (key, value) in attributes {
        start.push_attribute((*key, xml_chars(value).as_ref()));
    }
    start
}

/// Write `<name>text</name>` with optional attributes.
pub(crate) fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    attributes: &[(&str, &str)],
    text: &str,
) -> Result<(), BookError> {
    writer
        .write_event(Event::Start(start_tag(name, attributes)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(&xml_chars(text))))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}

/// Write `<name attr.../>`.
pub(crate) fn write_empty_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    attributes: &[(&str, &str)],
) -> Result<(), BookError> {
    writer
        .write_event(Event::Empty(start_tag(name, attributes)))
        .map_err(xml_err)
}

/// Open `<name attr...>`.
pub(crate) fn write_start(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    attributes: &[(&str, &str)],
) -> Result<(), BookError> {
    writer
        .write_event(Event::Start(start_tag(name, attributes)))
        .map_err(xml_err)
}

/// Close `</name>`.
pub(crate) fn write_end(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<(), BookError> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)
}

/// Indenting writer positioned after the XML declaration and an optional
/// doctype line.
pub(crate) fn xml_writer(doctype: Option<&str>) -> Writer<Vec<u8>> {
    let mut prolog = XML_DECLARATION.as_bytes().to_vec();
    if let Some(doctype) = doctype {
        prolog.extend_from_slice(doctype.as_bytes());
        prolog.push(b'\n');
    }
    Writer::new_with_indent(prolog, b' ', 2)
}

/// Serialize `META-INF/container.xml` pointing at the package document.
pub fn container_xml() -> Result<Vec<u8>, BookError> {
    let mut writer = xml_writer(None);
    write_start(
        &mut writer,
        "container",
        &[("version", "1.0"), ("xmlns", NS_CONTAINER)],
    )?;
    write_start(&mut writer, "rootfiles", &[])?;
    let full_path = opf_path();
    write_empty_element(
        &mut writer,
        "rootfile",
        &[("full-path", full_path.as_str()), ("media-type", MEDIA_OPF)],
    )?;
    write_end(&mut writer, "rootfiles")?;
    write_end(&mut writer, "container")?;
    Ok(writer.into_inner())
}

/// Serialize the `<metadata>` block of the package document.
pub(crate) fn write_metadata(
    writer: &mut Writer<Vec<u8>>,
    metadata: &BookMetadata,
    cover_image_id: Option<&str>,
) -> Result<(), BookError> {
    write_start(
        writer,
        "metadata",
        &[("xmlns:dc", NS_DC), ("xmlns:opf", NS_OPF)],
    )?;
    write_text_element(writer, "dc:title", &[], &metadata.title)?;
    write_text_element(
        writer,
        "dc:creator",
        &[("opf:role", "aut")],
        &metadata.author,
    )?;
    write_text_element(writer, "dc:language", &[], &metadata.language)?;
    let date = metadata.date.format("%Y-%m-%d").to_string();
    write_text_element(writer, "dc:date", &[], &date)?;
    write_text_element(
        writer,
        "dc:identifier",
        &[("id", "bookid")],
        &metadata.identifier,
    )?;
    if let Some(description) = &metadata.description {
        write_text_element(writer, "dc:description", &[], description)?;
    }
    if let Some(cover_id) = cover_image_id {
        write_empty_element(writer, "meta", &[("name", "cover"), ("content", cover_id)])?;
    }
    write_end(writer, "metadata")
}

/// Serialize the `<manifest>` block.
pub(crate) fn write_manifest(
    writer: &mut Writer<Vec<u8>>,
    manifest: &Manifest,
) -> Result<(), BookError> {
    write_start(writer, "manifest", &[])?;
    for item in manifest.items() {
        write_empty_element(
            writer,
            "item",
            &[
                ("id", item.id.as_str()),
                ("href", item.href.as_str()),
                ("media-type", item.media_type.as_str()),
            ],
        )?;
    }
    write_end(writer, "manifest")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> BookMetadata {
        BookMetadata {
            title: "Feed & Friends".to_string(),
            author: "@example.com".to_string(),
            language: "en".to_string(),
            identifier: "urn:uuid:0000".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 10, 26).unwrap(),
            description: None,
        }
    }

    #[test]
    fn test_container_xml_points_at_opf() {
        let xml = String::from_utf8(container_xml().unwrap()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(r#"full-path="OEBPS/content.opf""#));
        assert!(xml.contains(r#"media-type="application/oebps-package+xml""#));
        assert!(xml.contains(NS_CONTAINER));
    }

    #[test]
    fn test_manifest_rejects_duplicate_id() {
        let mut manifest = Manifest::new();
        manifest.insert("a", "a.xhtml", MEDIA_XHTML).unwrap();
        assert_eq!(
            manifest.insert("a", "b.xhtml", MEDIA_XHTML),
            Err(IntegrityViolation::DuplicateManifestId { id: "a".into() })
        );
    }

    #[test]
    fn test_manifest_rejects_duplicate_href() {
        let mut manifest = Manifest::new();
        manifest.insert("a", "a.xhtml", MEDIA_XHTML).unwrap();
        assert_eq!(
            manifest.insert("b", "a.xhtml", MEDIA_XHTML),
            Err(IntegrityViolation::DuplicateManifestHref {
                href: "a.xhtml".into()
            })
        );
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_manifest_lookup() {
        let mut manifest = Manifest::new();
        manifest.insert("css", "style.css", MEDIA_CSS).unwrap();
        manifest.insert("ncx", "toc.ncx", MEDIA_NCX).unwrap();
        assert_eq!(manifest.get("ncx").unwrap().href, "toc.ncx");
        assert_eq!(manifest.find_by_href("style.css").unwrap().id, "css");
        assert_eq!(
            manifest.get("css").unwrap().archive_path(),
            "OEBPS/style.css"
        );
        assert!(!manifest.contains("missing"));
    }

    #[test]
    fn test_metadata_escapes_text() {
        let mut writer = xml_writer(None);
        write_metadata(&mut writer, &sample_metadata(), Some("cover-image")).unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert!(xml.contains("<dc:title>Feed &amp; Friends</dc:title>"));
        assert!(xml.contains(r#"<dc:creator opf:role="aut">@example.com</dc:creator>"#));
        assert!(xml.contains("<dc:date>2025-10-26</dc:date>"));
        assert!(xml.contains(r#"<meta name="cover" content="cover-image"/>"#));
    }

    #[test]
    fn test_xml_chars_drops_forbidden_controls() {
        assert_eq!(xml_chars("plain\ttext\n"), "plain\ttext\n");
        assert!(matches!(xml_chars("plain"), Cow::Borrowed(_)));
        assert_eq!(xml_chars("a\u{1}b\u{b}c\u{c}d\u{1f}e\u{fffe}\u{ffff}f"), "abcdef");
        assert_eq!(xml_chars("caf\u{e9} \u{1F680}"), "caf\u{e9} \u{1F680}");
    }

    #[test]
    fn test_metadata_with_control_characters_is_well_formed() {
        let mut metadata = sample_metadata();
        metadata.title = "Bell\u{7} and \u{c}feed".to_string();
        metadata.author = "@nul\u{0}".to_string();
        metadata.identifier = "urn:\u{1}id".to_string();
        let mut writer = xml_writer(None);
        write_start(&mut writer, "package", &[("xmlns", NS_OPF), ("dir", "x\u{2}y")]).unwrap();
        write_metadata(&mut writer, &metadata, Some("cover-image")).unwrap();
        write_end(&mut writer, "package").unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();

        let doc = roxmltree::Document::parse(&xml).unwrap();
        let title = doc
            .descendants()
            .find(|n| n.tag_name().name() == "title")
            .and_then(|n| n.text());
        assert_eq!(title, Some("Bell and feed"));
        assert_eq!(doc.root_element().attribute("dir"), Some("xy"));
    }
}
