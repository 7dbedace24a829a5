//! Package assembly: from pages and a cover to a finished EPUB file.
//!
//! [`EpubBuilder`] allocates every id, builds the manifest, spine and NCX
//! in memory, and plans the archive as an ordered list of
//! [`PackageEntry`] values. The plan is checked by
//! [`crate::validate::check_package`] before a single byte is written.
//! Writing is one sequential pass through [`ZipWriter`]; file output goes
//! through a temporary file in the destination directory that is only
//! renamed into place after it has been read back.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use log::{debug, info};
use quick_xml::Writer;
use uuid::Uuid;

use crate::article::ArticleRecord;
use crate::error::{BookError, ZipError};
use crate::metadata::{
    container_xml, opf_path, write_empty_element, write_end, write_manifest, write_metadata,
    write_start, write_text_element, xml_err, xml_writer, BookMetadata, Manifest, CONTAINER_PATH,
    CONTENT_DIR, EPUB_MIMETYPE, MEDIA_CSS, MEDIA_JPEG, MEDIA_NCX, MEDIA_XHTML, NS_OPF,
};
use crate::navigation::Navigation;
use crate::spine::Spine;
use crate::validate::check_package;
use crate::zip::{Compression, DosDateTime, StreamingZip, ZipWriter};

/// Manifest id of the NCX document
pub const NCX_ID: &str = "ncx";
/// Manifest id of the stylesheet
pub const STYLESHEET_ID: &str = "css";
/// Manifest id of the cover image
pub const COVER_IMAGE_ID: &str = "cover-image";
/// Manifest and spine id of the cover page
pub const COVER_PAGE_ID: &str = "cover";

const NCX_HREF: &str = "toc.ncx";
const STYLESHEET_HREF: &str = "style.css";
const COVER_IMAGE_HREF: &str = "cover.jpg";

const NS_XHTML: &str = "http://www.w3.org/1999/xhtml";
const XHTML_DOCTYPE: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">"#;

/// Stylesheet shipped in every book
pub const DEFAULT_STYLESHEET: &str = "\
body { font-family: Georgia, serif; line-height: 1.6; margin: 1em; }
h1 { font-size: 1.8em; margin-bottom: 0.5em; }
h2 { font-size: 1.4em; margin-top: 1em; }
p { margin: 1em 0; text-align: justify; }
a { color: #0066cc; text-decoration: none; }
pre { white-space: pre-wrap; }
.meta { color: #666; font-size: 0.9em; margin-bottom: 1em; }
.cover { margin: 0; padding: 0; text-align: center; }
.cover img { max-width: 100%; max-height: 100%; }
";

/// Book-level settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookOptions {
    /// Book title
    pub title: String,
    /// Author written as `dc:creator`
    pub author: String,
    /// Language code
    pub language: String,
    /// Package identifier; a fresh `urn:uuid:` is generated when `None`
    pub identifier: Option<String>,
    /// Creation time, used for `dc:date` and archive timestamps
    pub created: NaiveDateTime,
    /// CSS written to `style.css`
    pub stylesheet: String,
    /// DEFLATE level (0-10) for compressed entries
    pub deflate_level: u8,
}

impl Default for BookOptions {
    fn default() -> Self {
        Self {
            title: "BlueSky Book".to_string(),
            author: "BlueSky Collection".to_string(),
            language: "en".to_string(),
            identifier: None,
            created: Local::now().naive_local(),
            stylesheet: DEFAULT_STYLESHEET.to_string(),
            deflate_level: 6,
        }
    }
}

impl BookOptions {
    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Set the language code
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Use a fixed package identifier
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Set the creation time
    pub fn with_created(mut self, created: NaiveDateTime) -> Self {
        self.created = created;
        self
    }

    /// Replace the stylesheet
    pub fn with_stylesheet(mut self, css: impl Into<String>) -> Self {
        self.stylesheet = css.into();
        self
    }

    /// Set the DEFLATE level
    pub fn with_deflate_level(mut self, level: u8) -> Self {
        self.deflate_level = level.min(10);
        self
    }
}

/// One XHTML page of the book
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackagePage {
    /// Manifest, spine and navigation id
    pub id: String,
    /// Title shown in the table of contents and `<title>`
    pub title: String,
    /// Well-formed XHTML placed inside `<body>`
    pub body: String,
}

impl PackagePage {
    /// OPF-relative file name
    pub fn href(&self) -> String {
        format!("{}.xhtml", self.id)
    }
}

/// One file of the planned archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageEntry {
    /// Archive path
    pub path: String,
    /// File content
    pub data: Vec<u8>,
    /// How the entry is stored
    pub compression: Compression,
}

impl PackageEntry {
    fn deflated(path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            data,
            compression: Compression::Deflated,
        }
    }
}

/// The complete, checked in-memory package
#[derive(Clone, Debug)]
pub struct AssembledPackage {
    /// Package identifier shared by OPF and NCX
    pub identifier: String,
    /// Every declared resource
    pub manifest: Manifest,
    /// Reading order
    pub spine: Spine,
    /// Table of contents
    pub navigation: Navigation,
    /// Archive files in write order
    pub entries: Vec<PackageEntry>,
    timestamp: DosDateTime,
    deflate_level: u8,
}

impl AssembledPackage {
    /// Serialize the archive into `out` in one sequential pass.
    pub fn write_to<W: Write>(&self, out: W) -> Result<W, BookError> {
        let mut zip = ZipWriter::new(out)
            .with_timestamp(self.timestamp)
            .with_deflate_level(self.deflate_level);
        for entry in &self.entries {
            zip.add_entry(&entry.path, &entry.data, entry.compression)?;
        }
        Ok(zip.finish()?)
    }

    /// Archive paths in write order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.path.as_str())
    }
}

/// Builds an EPUB 2 package from a cover image and article pages
#[derive(Clone, Debug)]
pub struct EpubBuilder {
    options: BookOptions,
    cover_jpeg: Vec<u8>,
    pages: Vec<PackagePage>,
}

impl EpubBuilder {
    /// Start a book with the given settings and JPEG cover.
    pub fn new(options: BookOptions, cover_jpeg: Vec<u8>) -> Self {
        Self {
            options,
            cover_jpeg,
            pages: Vec::new(),
        }
    }

    /// Settings in use
    pub fn options(&self) -> &BookOptions {
        &self.options
    }

    /// Article pages added so far, in reading order
    pub fn pages(&self) -> &[PackagePage] {
        &self.pages
    }

    /// Append a page with a pre-built XHTML body; returns its id.
    ///
    /// Ids are allocated sequentially (`article0`, `article1`, ...) over the
    /// pages actually added, so dropped articles leave no gaps.
    pub fn add_page(&mut self, title: impl Into<String>, body: impl Into<String>) -> &str {
        let id = format!("article{}", self.pages.len());
        self.pages.push(PackagePage {
            id,
            title: title.into(),
            body: body.into(),
        });
        &self.pages[self.pages.len() - 1].id
    }

    /// Append an article page: heading, byline, source link, then the
    /// already-transformed `content` fragment.
    pub fn add_article(
        &mut self,
        record: &ArticleRecord,
        content: &str,
    ) -> Result<&str, BookError> {
        let body = article_body(record, content)?;
        Ok(self.add_page(record.title.trim(), body))
    }

    /// Build and check every document without writing anything.
    pub fn assemble(&self) -> Result<AssembledPackage, BookError> {
        if self.pages.is_empty() {
            return Err(BookError::NoArticles);
        }
        let identifier = self
            .options
            .identifier
            .clone()
            .unwrap_or_else(|| format!("urn:uuid:{}", Uuid::new_v4()));
        let metadata = BookMetadata {
            title: self.options.title.clone(),
            author: self.options.author.clone(),
            language: self.options.language.clone(),
            identifier: identifier.clone(),
            date: self.options.created.date(),
            description: None,
        };

        let cover_page = PackagePage {
            id: COVER_PAGE_ID.to_string(),
            title: "Cover".to_string(),
            body: cover_body()?,
        };
        let all_pages = || core::iter::once(&cover_page).chain(self.pages.iter());

        let mut manifest = Manifest::new();
        manifest.insert(NCX_ID, NCX_HREF, MEDIA_NCX)?;
        manifest.insert(STYLESHEET_ID, STYLESHEET_HREF, MEDIA_CSS)?;
        manifest.insert(COVER_IMAGE_ID, COVER_IMAGE_HREF, MEDIA_JPEG)?;
        let mut spine = Spine::new(NCX_ID);
        let mut navigation = Navigation::new(identifier.clone(), self.options.title.clone())
            .with_language(self.options.language.clone());
        for page in all_pages() {
            manifest.insert(page.id.clone(), page.href(), MEDIA_XHTML)?;
            spine.push(page.id.clone());
            navigation.push(page.id.clone(), page.title.clone(), page.href());
        }

        let content_path = |href: &str| format!("{}/{}", CONTENT_DIR, href);
        let mut entries = vec![
            PackageEntry {
                path: "mimetype".to_string(),
                data: EPUB_MIMETYPE.as_bytes().to_vec(),
                compression: Compression::Stored,
            },
            PackageEntry::deflated(CONTAINER_PATH, container_xml()?),
            PackageEntry::deflated(opf_path(), package_opf(&metadata, &manifest, &spine)?),
            PackageEntry::deflated(content_path(NCX_HREF), navigation.to_ncx()?),
            PackageEntry::deflated(
                content_path(STYLESHEET_HREF),
                self.options.stylesheet.as_bytes().to_vec(),
            ),
            PackageEntry::deflated(content_path(COVER_IMAGE_HREF), self.cover_jpeg.clone()),
        ];
        for page in all_pages() {
            let xhtml = page_xhtml(&self.options.language, &page.title, &page.body)?;
            entries.push(PackageEntry::deflated(content_path(&page.href()), xhtml));
        }

        check_package(&manifest, &spine, &navigation, &entries, COVER_PAGE_ID)?;
        info!(
            "[BOOK] Assembled '{}': {} pages, {} archive entries",
            self.options.title,
            spine.len(),
            entries.len()
        );

        Ok(AssembledPackage {
            identifier,
            manifest,
            spine,
            navigation,
            entries,
            timestamp: dos_timestamp(&self.options.created),
            deflate_level: self.options.deflate_level,
        })
    }

    /// Assemble and write the archive into `out`.
    pub fn write_to<W: Write>(&self, out: W) -> Result<W, BookError> {
        self.assemble()?.write_to(out)
    }

    /// Assemble and write the archive to `path`.
    ///
    /// The archive is written to a temporary file next to `path`, read back
    /// and checked, then renamed over `path`. On any error no file is left
    /// behind and an existing `path` is untouched.
    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<AssembledPackage, BookError> {
        let path = path.as_ref();
        if path.file_name().is_none() {
            return Err(BookError::InvalidOutputPath(path.display().to_string()));
        }
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let package = self.assemble()?;
        let mut temp = tempfile::Builder::new()
            .prefix(".skybook-")
            .suffix(".epub.part")
            .tempfile_in(&parent)?;
        {
            let writer = package.write_to(BufWriter::new(temp.as_file_mut()))?;
            writer
                .into_inner()
                .map_err(|e| BookError::Io(e.error().to_string()))?
                .sync_all()?;
        }

        verify_archive(&package, temp.reopen()?)?;
        temp.persist(path)
            .map_err(|e| BookError::Io(e.error.to_string()))?;
        info!("[BOOK] Wrote {}", path.display());
        Ok(package)
    }
}

/// Read a written archive back and compare it to the plan.
fn verify_archive(package: &AssembledPackage, file: std::fs::File) -> Result<(), BookError> {
    let mut zip = StreamingZip::new(file)?;
    zip.validate_mimetype()?;
    let written: Vec<String> = zip.entries().map(|entry| entry.filename.clone()).collect();
    if !written.iter().map(String::as_str).eq(package.paths()) {
        return Err(ZipError::InvalidFormat.into());
    }
    for name in &written {
        zip.read_by_name(name)?;
    }
    debug!("[BOOK] Verified {} archive entries", written.len());
    Ok(())
}

fn dos_timestamp(at: &NaiveDateTime) -> DosDateTime {
    DosDateTime::from_parts(
        u16::try_from(at.year()).unwrap_or(1980),
        at.month() as u8,
        at.day() as u8,
        at.hour() as u8,
        at.minute() as u8,
        at.second() as u8,
    )
}

/// Serialize `content.opf`.
fn package_opf(
    metadata: &BookMetadata,
    manifest: &Manifest,
    spine: &Spine,
) -> Result<Vec<u8>, BookError> {
    let mut writer = xml_writer(None);
    write_start(
        &mut writer,
        "package",
        &[
            ("xmlns", NS_OPF),
            ("version", "2.0"),
            ("unique-identifier", "bookid"),
        ],
    )?;
    write_metadata(&mut writer, metadata, Some(COVER_IMAGE_ID))?;
    write_manifest(&mut writer, manifest)?;
    spine.write(&mut writer)?;
    let cover_href = format!("{}.xhtml", COVER_PAGE_ID);
    write_start(&mut writer, "guide", &[])?;
    write_empty_element(
        &mut writer,
        "reference",
        &[
            ("type", "cover"),
            ("title", "Cover"),
            ("href", cover_href.as_str()),
        ],
    )?;
    write_end(&mut writer, "guide")?;
    write_end(&mut writer, "package")?;
    Ok(writer.into_inner())
}

/// Wrap a body fragment in a complete XHTML 1.1 document.
fn page_xhtml(language: &str, title: &str, body: &str) -> Result<Vec<u8>, BookError> {
    let mut writer = xml_writer(Some(XHTML_DOCTYPE));
    write_start(
        &mut writer,
        "html",
        &[("xmlns", NS_XHTML), ("xml:lang", language)],
    )?;
    write_start(&mut writer, "head", &[])?;
    write_text_element(&mut writer, "title", &[], title)?;
    write_empty_element(
        &mut writer,
        "link",
        &[
            ("rel", "stylesheet"),
            ("type", "text/css"),
            ("href", STYLESHEET_HREF),
        ],
    )?;
    write_end(&mut writer, "head")?;
    write_start(&mut writer, "body", &[])?;
    push_raw(&mut writer, body);
    write_end(&mut writer, "body")?;
    write_end(&mut writer, "html")?;
    Ok(writer.into_inner())
}

/// Append already-escaped markup.
fn push_raw(writer: &mut Writer<Vec<u8>>, markup: &str) {
    writer.get_mut().extend_from_slice(markup.as_bytes());
}

fn cover_body() -> Result<String, BookError> {
    let mut writer = Writer::new(Vec::new());
    write_start(&mut writer, "div", &[("class", "cover")])?;
    write_empty_element(
        &mut writer,
        "img",
        &[("src", COVER_IMAGE_HREF), ("alt", "Cover")],
    )?;
    write_end(&mut writer, "div")?;
    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

fn article_body(record: &ArticleRecord, content: &str) -> Result<String, BookError> {
    let mut writer = Writer::new(Vec::new());
    write_text_element(&mut writer, "h1", &[], record.title.trim())?;
    write_start(&mut writer, "div", &[("class", "meta")])?;
    if let Some(author) = record.author.as_deref().filter(|a| !a.trim().is_empty()) {
        write_text_element(&mut writer, "p", &[], &format!("By {}", author.trim()))?;
    }
    if let Some(date) = record.published.as_deref().filter(|d| !d.trim().is_empty()) {
        write_text_element(&mut writer, "p", &[], date.trim())?;
    }
    write_start(&mut writer, "p", &[])?;
    write_text_element(&mut writer, "a", &[("href", record.url.as_str())], "Source")?;
    write_end(&mut writer, "p")?;
    write_end(&mut writer, "div")?;
    write_start(&mut writer, "div", &[("class", "content")])?;
    push_raw(&mut writer, content);
    write_end(&mut writer, "div")?;
    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Cursor;

    fn options() -> BookOptions {
        BookOptions::default()
            .with_title("Test Book")
            .with_author("@tester")
            .with_identifier("urn:uuid:00000000-0000-0000-0000-000000000001")
            .with_created(
                NaiveDate::from_ymd_opt(2025, 10, 26)
                    .unwrap()
                    .and_hms_opt(12, 30, 0)
                    .unwrap(),
            )
    }

    fn builder_with(count: usize) -> EpubBuilder {
        let mut builder = EpubBuilder::new(options(), vec![0xFF, 0xD8, 0xFF, 0xD9]);
        for i in 0..count {
            let record = ArticleRecord::new(
                format!("https://example.com/{}", i),
                format!("Story {}", i),
                "",
            );
            builder
                .add_article(&record, &format!("<p>Body {}</p>", i))
                .unwrap();
        }
        builder
    }

    #[test]
    fn test_no_pages_is_an_error() {
        assert_eq!(builder_with(0).assemble().unwrap_err(), BookError::NoArticles);
    }

    #[test]
    fn test_entry_order() {
        let package = builder_with(2).assemble().unwrap();
        let paths: Vec<&str> = package.paths().collect();
        assert_eq!(
            paths,
            vec![
                "mimetype",
                "META-INF/container.xml",
                "OEBPS/content.opf",
                "OEBPS/toc.ncx",
                "OEBPS/style.css",
                "OEBPS/cover.jpg",
                "OEBPS/cover.xhtml",
                "OEBPS/article0.xhtml",
                "OEBPS/article1.xhtml",
            ]
        );
        assert_eq!(package.entries[0].compression, Compression::Stored);
        assert!(package.entries[1..]
            .iter()
            .all(|e| e.compression == Compression::Deflated));
    }

    #[test]
    fn test_spine_and_navigation_agree() {
        let package = builder_with(3).assemble().unwrap();
        assert_eq!(
            package.spine.idrefs(),
            &["cover", "article0", "article1", "article2"]
        );
        let nav_ids: Vec<&str> = package
            .navigation
            .points
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(nav_ids, package.spine.idrefs());
        assert_eq!(package.navigation.points[1].label, "Story 0");
        assert_eq!(package.navigation.uid, package.identifier);
    }

    #[test]
    fn test_opf_content() {
        let package = builder_with(1).assemble().unwrap();
        let opf = String::from_utf8(package.entries[2].data.clone()).unwrap();
        assert!(opf.contains(r#"unique-identifier="bookid""#));
        assert!(opf.contains(
            r#"<dc:identifier id="bookid">urn:uuid:00000000-0000-0000-0000-000000000001</dc:identifier>"#
        ));
        assert!(opf.contains("<dc:date>2025-10-26</dc:date>"));
        assert!(opf.contains(r#"<spine toc="ncx">"#));
        assert!(opf.contains(r#"<reference type="cover" title="Cover" href="cover.xhtml"/>"#));
        let manifest_pos = opf.find("<manifest>").unwrap();
        let spine_pos = opf.find("<spine").unwrap();
        assert!(manifest_pos < spine_pos);
    }

    #[test]
    fn test_language_shared_by_opf_ncx_and_pages() {
        let mut builder = EpubBuilder::new(options().with_language("de"), vec![1]);
        builder.add_page("Seite", "<p>x</p>");
        let package = builder.assemble().unwrap();
        let text = |idx: usize| String::from_utf8(package.entries[idx].data.clone()).unwrap();
        assert!(text(2).contains("<dc:language>de</dc:language>"));
        assert!(text(3).contains(r#"xml:lang="de""#));
        assert!(text(6).contains(r#"xml:lang="de""#));
        assert_eq!(package.navigation.language, "de");
    }

    #[test]
    fn test_article_page_escapes_metadata() {
        let mut builder = EpubBuilder::new(options(), vec![1]);
        let record = ArticleRecord::new("https://example.com/?a=1&b=2", "Q & A <live>", "")
            .with_author("Ann")
            .with_published("2025-10-01");
        builder.add_article(&record, "<p>text</p>").unwrap();
        let body = &builder.pages()[0].body;
        assert!(body.starts_with("<h1>Q &amp; A &lt;live&gt;</h1>"));
        assert!(body.contains("<p>By Ann</p>"));
        assert!(body.contains(r#"<a href="https://example.com/?a=1&amp;b=2">Source</a>"#));
        assert!(body.ends_with(r#"<div class="content"><p>text</p></div>"#));
    }

    #[test]
    fn test_page_document_shape() {
        let xhtml = page_xhtml("en", "T", "<p>x</p>").unwrap();
        let xhtml = String::from_utf8(xhtml).unwrap();
        assert!(xhtml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE html"));
        assert!(xhtml.contains(r#"<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="en">"#));
        assert!(xhtml.contains(r#"href="style.css""#));
        assert!(xhtml.contains("<p>x</p>"));
    }

    #[test]
    fn test_cover_page_references_image() {
        let body = cover_body().unwrap();
        assert_eq!(
            body,
            r#"<div class="cover"><img src="cover.jpg" alt="Cover"/></div>"#
        );
    }

    #[test]
    fn test_write_to_reads_back() {
        let package = builder_with(2).assemble().unwrap();
        let bytes = package.write_to(Cursor::new(Vec::new())).unwrap().into_inner();
        let mut zip = StreamingZip::new(Cursor::new(bytes)).unwrap();
        zip.validate_mimetype().unwrap();
        assert_eq!(zip.num_entries(), package.entries.len());
        let ncx = zip.read_by_name("OEBPS/toc.ncx").unwrap();
        assert_eq!(ncx, package.entries[3].data);
    }

    #[test]
    fn test_write_file_is_atomic_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("book.epub");
        assert!(builder_with(0).write_file(&target).is_err());
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("book.epub");
        builder_with(1).write_file(&target).unwrap();
        assert!(target.exists());
        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_dos_timestamp() {
        let at = NaiveDate::from_ymd_opt(2025, 10, 26)
            .unwrap()
            .and_hms_opt(12, 30, 10)
            .unwrap();
        assert_eq!(
            dos_timestamp(&at),
            DosDateTime::from_parts(2025, 10, 26, 12, 30, 10)
        );
    }
}
