//! HTML fragment to strict XHTML converter for article bodies
//!
//! Article markup arrives from arbitrary web pages: unclosed tags, bare
//! ampersands, HTML-only entities, scripts. This module re-emits it through
//! `quick_xml` as a well-formed XHTML 1.1 body fragment, keeping a fixed
//! allow-list of elements and attributes. Input the reader cannot parse is
//! recovered from, never rejected: whatever was read so far is kept and
//! every open element is closed.

use std::borrow::Cow;

use log::{debug, warn};
use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::Writer;

use crate::metadata::xml_chars;

/// Bounds applied to one article body
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformLimits {
    /// Largest accepted input, in bytes
    pub max_input_bytes: usize,
    /// Deepest element nesting written to the output; deeper tags are unwrapped
    pub max_depth: usize,
}

impl Default for TransformLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: 4 * 1024 * 1024,
            max_depth: 256,
        }
    }
}

/// Why an article body could not be turned into a page
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransformError {
    /// Input exceeds [`TransformLimits::max_input_bytes`]
    InputTooLarge {
        /// Input size in bytes.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
    /// Nothing readable survived sanitizing
    EmptyDocument,
    /// Output serialization failed
    Write(String),
}

impl core::fmt::Display for TransformError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransformError::InputTooLarge { size, max } => {
                write!(f, "body of {} bytes exceeds limit of {} bytes", size, max)
            }
            TransformError::EmptyDocument => write!(f, "body has no readable content"),
            TransformError::Write(msg) => write!(f, "write error: {}", msg),
        }
    }
}

impl std::error::Error for TransformError {}

/// Element names written to the output unchanged
const KEPT_ELEMENTS: &[&str] = &[
    "p", "div", "span", "h1", "h2", "h3", "h4", "h5", "h6", "em", "strong", "i", "b", "a", "ul",
    "ol", "li", "blockquote", "pre", "code", "q", "cite", "sub", "sup", "dl", "dt", "dd", "table",
    "thead", "tbody", "tfoot", "tr", "th", "td", "caption",
];

/// Elements that end an open paragraph
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "dl", "pre", "blockquote", "table",
    "hr",
];

/// Elements whose content model is inline only
const INLINE_CONTENT: &[&str] = &[
    "span", "em", "strong", "i", "b", "a", "code", "q", "cite", "sub", "sup", "p", "h1", "h2",
    "h3", "h4", "h5", "h6", "pre", "dt", "caption",
];

/// Inline elements among the kept ones
const INLINE_ELEMENTS: &[&str] = &[
    "span", "em", "strong", "i", "b", "a", "code", "q", "cite", "sub", "sup",
];

/// Containers whose direct children must be elements
const NO_TEXT_CONTAINERS: &[&str] = &["ul", "ol", "dl", "table", "thead", "tbody", "tfoot", "tr"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rule {
    /// Written as the given output element
    Keep(&'static str),
    /// Written as an empty element, never has content
    Void(&'static str),
    /// Removed together with everything inside it
    Skip,
    /// Void element removed entirely
    Drop,
    /// Tag removed, content kept
    Unwrap,
}

fn rule_for(name: &str) -> Rule {
    if let Some(kept) = KEPT_ELEMENTS.iter().find(|kept| **kept == name) {
        return Rule::Keep(*kept);
    }
    match name {
        "br" => Rule::Void("br"),
        "hr" => Rule::Void("hr"),
        "section" | "article" | "main" | "figure" | "figcaption" | "center" | "address" => {
            Rule::Keep("div")
        }
        "script" | "style" | "head" | "nav" | "header" | "footer" | "aside" | "noscript"
        | "iframe" | "form" | "svg" | "math" | "object" | "template" | "button" | "select"
        | "textarea" | "title" | "video" | "audio" | "canvas" | "picture" => Rule::Skip,
        "img" | "input" | "meta" | "link" | "source" | "track" | "wbr" | "area" | "base"
        | "col" | "param" | "embed" => Rule::Drop,
        _ => Rule::Unwrap,
    }
}

/// An element opened in the input, and what it became in the output
#[derive(Debug)]
struct Frame {
    source: String,
    output: Option<&'static str>,
}

struct Sanitizer {
    writer: Writer<Vec<u8>>,
    stack: Vec<Frame>,
    /// Skipped element name and how many of it are nested
    skip: Option<(String, usize)>,
    open_outputs: usize,
    pre_depth: usize,
    wrote_text: bool,
    max_depth: usize,
}

impl Sanitizer {
    fn new(max_depth: usize) -> Self {
        Self {
            writer: Writer::new(Vec::new()),
            stack: Vec::new(),
            skip: None,
            open_outputs: 0,
            pre_depth: 0,
            wrote_text: false,
            max_depth,
        }
    }

    fn emit(&mut self, event: Event<'_>) -> Result<(), TransformError> {
        self.writer
            .write_event(event)
            .map_err(|e| TransformError::Write(e.to_string()))
    }

    /// Innermost element actually present in the output
    fn current_output(&self) -> Option<&'static str> {
        self.stack.iter().rev().find_map(|frame| frame.output)
    }

    /// Index of the innermost output frame named in `targets`, searching
    /// no further than the first frame named in `boundaries`.
    fn find_open(&self, targets: &[&str], boundaries: &[&str]) -> Option<usize> {
        for (idx, frame) in self.stack.iter().enumerate().rev() {
            let Some(name) = frame.output else {
                continue;
            };
            if targets.contains(&name) {
                return Some(idx);
            }
            if boundaries.contains(&name) {
                return None;
            }
        }
        None
    }

    fn close_to(&mut self, idx: usize) -> Result<(), TransformError> {
        while self.stack.len() > idx {
            let Some(frame) = self.stack.pop() else {
                break;
            };
            if let Some(name) = frame.output {
                self.emit(Event::End(BytesEnd::new(name)))?;
                self.open_outputs -= 1;
                if name == "pre" {
                    self.pre_depth -= 1;
                }
            }
        }
        Ok(())
    }

    fn close_all(&mut self) -> Result<(), TransformError> {
        self.close_to(0)
    }

    /// Close elements that HTML ends implicitly when `name` opens.
    fn implicit_close(&mut self, name: &str) -> Result<(), TransformError> {
        let found = match name {
            "li" => self.find_open(&["li"], &["ul", "ol"]),
            "dt" | "dd" => self.find_open(&["dt", "dd"], &["dl"]),
            "tr" => self.find_open(&["tr"], &["table", "thead", "tbody", "tfoot"]),
            "td" | "th" => self.find_open(&["td", "th"], &["tr", "table"]),
            "thead" | "tbody" | "tfoot" => {
                self.find_open(&["thead", "tbody", "tfoot"], &["table"])
            }
            _ => None,
        };
        if let Some(idx) = found {
            self.close_to(idx)?;
        }
        if BLOCK_ELEMENTS.contains(&name) {
            let boundaries = ["div", "li", "dd", "dt", "td", "th", "blockquote"];
            if let Some(idx) = self.find_open(&["p"], &boundaries) {
                self.close_to(idx)?;
            }
        }
        Ok(())
    }

    /// Rewrite an element whose parent cannot hold it; `None` unwraps it.
    fn contextual(&self, output: &'static str) -> Option<&'static str> {
        let parent = self.current_output();
        let allowed = match output {
            "li" => matches!(parent, Some("ul" | "ol")),
            "dt" | "dd" => parent == Some("dl"),
            "tr" => matches!(parent, Some("table" | "thead" | "tbody" | "tfoot")),
            "td" | "th" => parent == Some("tr"),
            "thead" | "tbody" | "tfoot" | "caption" => parent == Some("table"),
            "a" => self.find_open(&["a"], &[]).is_none(),
            _ => true,
        };
        let output = match (allowed, output) {
            (true, _) => output,
            (false, "li" | "dt" | "dd") => "p",
            (false, _) => return None,
        };
        let Some(parent) = parent else {
            return Some(output);
        };
        if BLOCK_ELEMENTS.contains(&output) && INLINE_CONTENT.contains(&parent) {
            return None;
        }
        if INLINE_ELEMENTS.contains(&output) && NO_TEXT_CONTAINERS.contains(&parent) {
            return None;
        }
        Some(output)
    }

    fn open(
        &mut self,
        source: String,
        output: &'static str,
        attributes: &[(String, String)],
    ) -> Result<(), TransformError> {
        self.implicit_close(output)?;
        let output = self.contextual(output);
        let output = match output {
            Some("a") if !has_safe_href(attributes) => None,
            Some(_) if self.open_outputs >= self.max_depth => {
                debug!("[XHTML] nesting limit reached, unwrapping <{}>", source);
                None
            }
            other => other,
        };

        if let Some(name) = output {
            let mut start = BytesStart::new(name);
            for (key, value) in allowed_attributes(name, attributes) {
                start.push_attribute((key, xml_chars(value).as_ref()));
            }
            self.emit(Event::Start(start))?;
            self.open_outputs += 1;
            if name == "pre" {
                self.pre_depth += 1;
            }
        }
        self.stack.push(Frame { source, output });
        Ok(())
    }

    fn void(&mut self, name: &'static str) -> Result<(), TransformError> {
        self.implicit_close(name)?;
        let misplaced = match self.current_output() {
            Some(parent) if NO_TEXT_CONTAINERS.contains(&parent) => true,
            Some(parent) => name == "hr" && INLINE_CONTENT.contains(&parent),
            None => false,
        };
        if misplaced {
            return Ok(());
        }
        self.emit(Event::Empty(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), TransformError> {
        match self.stack.iter().rposition(|frame| frame.source == name) {
            Some(idx) => self.close_to(idx),
            None => {
                debug!("[XHTML] ignoring stray </{}>", name);
                Ok(())
            }
        }
    }

    fn text(&mut self, raw: &str) -> Result<(), TransformError> {
        let raw = xml_chars(raw);
        let text = if self.pre_depth > 0 {
            raw.into_owned()
        } else {
            collapse_whitespace(&raw)
        };
        if text.is_empty() {
            return Ok(());
        }
        if matches!(self.current_output(), Some(parent) if NO_TEXT_CONTAINERS.contains(&parent)) {
            return Ok(());
        }
        if !text.trim().is_empty() {
            self.wrote_text = true;
        }
        self.emit(Event::Text(BytesText::new(&text)))
    }

    /// Track skipped subtrees; returns true while inside one.
    fn skipping_start(&mut self, name: &str) -> bool {
        match &mut self.skip {
            Some((skipped, depth)) => {
                if skipped.as_str() == name {
                    *depth += 1;
                }
                true
            }
            None => false,
        }
    }

    fn skipping_end(&mut self, name: &str) -> bool {
        match &mut self.skip {
            Some((skipped, depth)) => {
                if skipped.as_str() == name {
                    *depth -= 1;
                    if *depth == 0 {
                        self.skip = None;
                    }
                }
                true
            }
            None => false,
        }
    }

    fn start_element(
        &mut self,
        name: String,
        attributes: Vec<(String, String)>,
        self_closing: bool,
    ) -> Result<(), TransformError> {
        if self.skipping_start(&name) {
            if self_closing {
                self.skipping_end(&name);
            }
            return Ok(());
        }
        match rule_for(&name) {
            Rule::Keep(output) => {
                self.open(name.clone(), output, &attributes)?;
                if self_closing {
                    self.end(&name)?;
                }
            }
            Rule::Void(output) => self.void(output)?,
            Rule::Skip => {
                if !self_closing {
                    self.skip = Some((name, 1));
                }
            }
            Rule::Drop => {}
            Rule::Unwrap => {
                if !self_closing {
                    self.stack.push(Frame {
                        source: name,
                        output: None,
                    });
                }
            }
        }
        Ok(())
    }

    fn end_element(&mut self, name: &str) -> Result<(), TransformError> {
        if self.skipping_end(name) {
            return Ok(());
        }
        self.end(name)
    }

    fn finish(mut self) -> Result<String, TransformError> {
        self.close_all()?;
        if !self.wrote_text {
            return Err(TransformError::EmptyDocument);
        }
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| TransformError::Write(e.to_string()))
    }
}

/// Attributes that survive on `element`, with unsafe link targets removed.
fn allowed_attributes<'a>(
    element: &str,
    attributes: &'a [(String, String)],
) -> Vec<(&'static str, &'a String)> {
    let mut kept = Vec::new();
    for (key, value) in attributes {
        let key = match (element, key.as_str()) {
            ("a", "href") if is_safe_href(value) => "href",
            ("a", "title") => "title",
            ("td" | "th", "colspan") if is_span_count(value) => "colspan",
            ("td" | "th", "rowspan") if is_span_count(value) => "rowspan",
            _ => continue,
        };
        kept.push((key, value));
    }
    kept
}

fn is_safe_href(href: &str) -> bool {
    let href = href.trim().to_ascii_lowercase();
    ["http://", "https://", "mailto:", "#"]
        .iter()
        .any(|scheme| href.starts_with(scheme))
}

fn has_safe_href(attributes: &[(String, String)]) -> bool {
    attributes
        .iter()
        .any(|(key, value)| key == "href" && is_safe_href(value))
}

fn is_span_count(value: &str) -> bool {
    !value.is_empty() && value.len() <= 3 && value.bytes().all(|b| b.is_ascii_digit())
}

/// Collapse whitespace runs to one space; leading and trailing space is
/// kept so inline elements stay separated.
fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}

/// Whether the `<` at `bytes[0]` can open markup: a tag name, an end tag,
/// a comment or declaration, or a processing instruction.
fn opens_markup(bytes: &[u8]) -> bool {
    match bytes.get(1) {
        Some(b) if b.is_ascii_alphabetic() => true,
        Some(b'!' | b'?') => true,
        Some(b'/') => bytes.get(2).is_some_and(|b| b.is_ascii_alphabetic()),
        _ => false,
    }
}

/// Escape every `<` that cannot start a tag (`a < b`, `<3`, a trailing
/// `<`) so it reaches the output as text.
fn escape_stray_lt(html: &str) -> Cow<'_, str> {
    let bytes = html.as_bytes();
    let stray = |idx: usize| bytes[idx] == b'<' && !opens_markup(&bytes[idx..]);
    if !(0..bytes.len()).any(stray) {
        return Cow::Borrowed(html);
    }
    let mut escaped = String::with_capacity(html.len() + 16);
    let mut last = 0;
    for idx in (0..bytes.len()).filter(|idx| stray(*idx)) {
        escaped.push_str(&html[last..idx]);
        escaped.push_str("&lt;");
        last = idx + 1;
    }
    escaped.push_str(&html[last..]);
    Cow::Owned(escaped)
}

/// Resolve HTML entities; unknown ones are left for the caller to handle.
fn resolve_entities(raw: &str) -> Option<String> {
    unescape_with(raw, resolve_html5_entity)
        .ok()
        .map(|resolved| resolved.into_owned())
}

fn decode_name(name: &[u8], reader: &Reader<&[u8]>) -> Option<String> {
    reader
        .decoder()
        .decode(name)
        .ok()
        .map(|name| name.to_ascii_lowercase())
}

/// Attribute key/value pairs, keys lowercased, values entity-decoded.
fn read_attributes(e: &BytesStart, reader: &Reader<&[u8]>) -> Vec<(String, String)> {
    let mut attributes = Vec::new();
    for attr in e.html_attributes().flatten() {
        let Some(key) = decode_name(attr.key.as_ref(), reader) else {
            continue;
        };
        let Ok(raw) = reader.decoder().decode(&attr.value) else {
            continue;
        };
        // Bare '&' in query strings is common; keep such values verbatim
        let value = resolve_entities(&raw).unwrap_or_else(|| raw.into_owned());
        attributes.push((key, value));
    }
    attributes
}

/// Convert an HTML fragment into a well-formed XHTML body fragment
///
/// Keeps paragraphs, headings, lists, emphasis, links (absolute `http`,
/// `https` and `mailto` targets, or fragment links), quotes, code and
/// tables. Section-like containers become `div`. Scripts, styles, forms,
/// embedded media and page chrome (`nav`, `header`, `footer`, `aside`)
/// are removed together with their content. Images are dropped. Any other
/// element is unwrapped, keeping its text.
///
/// Input without any markup is treated as plain text with blank-line
/// separated paragraphs.
///
/// # Example
/// ```
/// use skybook::xhtml::transform_html;
///
/// let xhtml = transform_html("<p>Fish &amp; chips<br>today<script>x()</script>").unwrap();
/// assert_eq!(xhtml, "<p>Fish &amp; chips<br/>today</p>");
/// ```
pub fn transform_html(html: &str) -> Result<String, TransformError> {
    transform_html_with_limits(html, TransformLimits::default())
}

/// [`transform_html`] with explicit limits.
pub fn transform_html_with_limits(
    html: &str,
    limits: TransformLimits,
) -> Result<String, TransformError> {
    if html.len() > limits.max_input_bytes {
        return Err(TransformError::InputTooLarge {
            size: html.len(),
            max: limits.max_input_bytes,
        });
    }
    if html.trim().is_empty() {
        return Err(TransformError::EmptyDocument);
    }

    let mut sanitizer = Sanitizer::new(limits.max_depth);
    let markup = escape_stray_lt(html);
    if !markup.contains('<') {
        transform_plain_text(&mut sanitizer, html)?;
        return sanitizer.finish();
    }

    let mut reader = Reader::from_str(&markup);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.allow_dangling_amp = true;
        config.expand_empty_elements = false;
    }

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if let Some(name) = decode_name(e.name().as_ref(), &reader) {
                    let attributes = read_attributes(&e, &reader);
                    sanitizer.start_element(name, attributes, false)?;
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(name) = decode_name(e.name().as_ref(), &reader) {
                    let attributes = read_attributes(&e, &reader);
                    sanitizer.start_element(name, attributes, true)?;
                }
            }
            Ok(Event::End(e)) => {
                if let Some(name) = decode_name(e.name().as_ref(), &reader) {
                    sanitizer.end_element(&name)?;
                }
            }
            Ok(Event::Text(e)) => {
                if sanitizer.skip.is_none() {
                    if let Ok(text) = e.decode() {
                        sanitizer.text(&text)?;
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if sanitizer.skip.is_none() {
                    if let Ok(text) = reader.decoder().decode(&e) {
                        sanitizer.text(&text)?;
                    }
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if sanitizer.skip.is_none() {
                    if let Ok(entity) = e.decode() {
                        match resolve_entities(&format!("&{};", entity)) {
                            Some(resolved) => sanitizer.text(&resolved)?,
                            None => debug!("[XHTML] dropping unknown entity &{};", entity),
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {
                // Comments, declarations, doctypes and processing instructions
            }
            Err(e) => {
                warn!(
                    "[XHTML] recovering from malformed markup at byte {}: {}",
                    reader.error_position(),
                    e
                );
                break;
            }
        }
        buf.clear();
    }

    sanitizer.finish()
}

fn transform_plain_text(sanitizer: &mut Sanitizer, text: &str) -> Result<(), TransformError> {
    let text = text.replace("\r\n", "\n");
    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        let resolved = resolve_entities(paragraph).unwrap_or_else(|| paragraph.to_string());
        sanitizer.open("p".to_string(), "p", &[])?;
        sanitizer.text(&resolved)?;
        sanitizer.end("p")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(xhtml: &str) {
        let wrapped = format!("<body>{}</body>", xhtml);
        if let Err(e) = roxmltree::Document::parse(&wrapped) {
            panic!("not well-formed: {} in {:?}", e, xhtml);
        }
    }

    #[test]
    fn test_simple_paragraph() {
        assert_eq!(transform_html("<p>Hello world</p>").unwrap(), "<p>Hello world</p>");
    }

    #[test]
    fn test_script_and_style_removed() {
        let html = "<p>Before</p><script>alert('<p>x</p>')</script><style>p{}</style><p>After</p>";
        let xhtml = transform_html(html).unwrap();
        assert_eq!(xhtml, "<p>Before</p><p>After</p>");
        assert!(!xhtml.contains("alert"));
        assert_well_formed(&xhtml);
    }

    #[test]
    fn test_nested_skipped_elements() {
        let html = "<nav><nav>menu</nav>still menu</nav><p>Body</p>";
        assert_eq!(transform_html(html).unwrap(), "<p>Body</p>");
    }

    #[test]
    fn test_unclosed_paragraphs_closed() {
        let xhtml = transform_html("<p>one<p>two<div>three").unwrap();
        assert_eq!(xhtml, "<p>one</p><p>two</p><div>three</div>");
    }

    #[test]
    fn test_void_elements_self_close() {
        let xhtml = transform_html("<p>a<br>b<hr></p>").unwrap();
        assert_eq!(xhtml, "<p>a<br/>b</p><hr/>");
        assert_well_formed(&xhtml);
    }

    #[test]
    fn test_html_entities_normalized() {
        let xhtml = transform_html("<p>caf&eacute; &mdash; &#233; &lt;tag&gt; &bogus;</p>").unwrap();
        assert_eq!(xhtml, "<p>café — é &lt;tag&gt; </p>");
    }

    #[test]
    fn test_bare_ampersand_escaped() {
        let xhtml = transform_html("<p>Q & A</p>").unwrap();
        assert_eq!(xhtml, "<p>Q &amp; A</p>");
    }

    #[test]
    fn test_link_attributes_filtered() {
        let html = r#"<a href="https://example.com/?a=1&b=2" onclick="x()" class="c">ok</a><a href="javascript:alert(1)">bad</a>"#;
        let xhtml = transform_html(html).unwrap();
        assert_eq!(
            xhtml,
            r#"<a href="https://example.com/?a=1&amp;b=2">ok</a>bad"#
        );
    }

    #[test]
    fn test_unquoted_attributes() {
        let xhtml = transform_html("<a href=http://x.org>x</a>").unwrap();
        assert_eq!(xhtml, r#"<a href="http://x.org">x</a>"#);
    }

    #[test]
    fn test_images_dropped() {
        let xhtml = transform_html(r#"<p>pic <img src="a.png" alt="A"> here</p>"#).unwrap();
        assert_eq!(xhtml, "<p>pic  here</p>");
    }

    #[test]
    fn test_sections_become_divs() {
        let xhtml = transform_html("<article><section><p>x</p></section></article>").unwrap();
        assert_eq!(xhtml, "<div><div><p>x</p></div></div>");
    }

    #[test]
    fn test_unknown_elements_unwrapped() {
        let xhtml = transform_html("<p><font color=red>red</font> text</p>").unwrap();
        assert_eq!(xhtml, "<p>red text</p>");
    }

    #[test]
    fn test_list_items_closed_implicitly() {
        let xhtml = transform_html("<ul><li>one<li>two</ul>").unwrap();
        assert_eq!(xhtml, "<ul><li>one</li><li>two</li></ul>");
    }

    #[test]
    fn test_orphan_list_item_becomes_paragraph() {
        let xhtml = transform_html("<li>alone</li>").unwrap();
        assert_eq!(xhtml, "<p>alone</p>");
    }

    #[test]
    fn test_misnested_end_tags() {
        let xhtml = transform_html("<p><em>one <strong>two</em> three</strong></p>").unwrap();
        assert_eq!(xhtml, "<p><em>one <strong>two</strong></em> three</p>");
        assert_well_formed(&xhtml);
    }

    #[test]
    fn test_stray_end_tag_ignored() {
        let xhtml = transform_html("</div><p>text</p></span>").unwrap();
        assert_eq!(xhtml, "<p>text</p>");
    }

    #[test]
    fn test_whitespace_collapsed_outside_pre() {
        let xhtml = transform_html("<p>a \n\t  b</p><pre>x\n  y</pre>").unwrap();
        assert_eq!(xhtml, "<p>a b</p><pre>x\n  y</pre>");
    }

    #[test]
    fn test_table_structure() {
        let xhtml =
            transform_html(r#"<table><tr><td colspan="2" style="x">a<td>b</table>"#).unwrap();
        assert_eq!(
            xhtml,
            r#"<table><tr><td colspan="2">a</td><td>b</td></tr></table>"#
        );
    }

    #[test]
    fn test_depth_limit_unwraps() {
        let html = format!("{}deep{}", "<div>".repeat(10), "</div>".repeat(10));
        let limits = TransformLimits {
            max_depth: 3,
            ..TransformLimits::default()
        };
        let xhtml = transform_html_with_limits(&html, limits).unwrap();
        assert_eq!(xhtml, "<div><div><div>deep</div></div></div>");
    }

    #[test]
    fn test_input_too_large() {
        let limits = TransformLimits {
            max_input_bytes: 8,
            ..TransformLimits::default()
        };
        assert_eq!(
            transform_html_with_limits("<p>too long</p>", limits),
            Err(TransformError::InputTooLarge { size: 15, max: 8 })
        );
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(transform_html("  "), Err(TransformError::EmptyDocument));
        assert_eq!(
            transform_html("<script>only()</script><img src=x>"),
            Err(TransformError::EmptyDocument)
        );
    }

    #[test]
    fn test_plain_text_paragraphs() {
        let xhtml = transform_html("First line\nsame para\n\nSecond & last").unwrap();
        assert_eq!(xhtml, "<p>First line same para</p><p>Second &amp; last</p>");
    }

    #[test]
    fn test_truncated_markup_recovers() {
        let xhtml = transform_html("<div><p>kept text<em>open <a href=\"http").unwrap();
        assert!(xhtml.starts_with("<div><p>kept text<em>open "));
        assert_well_formed(&xhtml);
    }

    #[test]
    fn test_uppercase_tags() {
        let xhtml = transform_html("<P>Loud<BR></P>").unwrap();
        assert_eq!(xhtml, "<p>Loud<br/></p>");
    }

    #[test]
    fn test_control_characters_removed() {
        let cases = [
            ("<p>tab\u{1}stop</p>", "<p>tabstop</p>"),
            ("<p>a&#1;b</p>", "<p>ab</p>"),
            ("<pre>feed\u{c}page</pre>", "<pre>feedpage</pre>"),
            ("<p>end\u{ffff}</p>", "<p>end</p>"),
        ];
        for (html, expected) in cases {
            let xhtml = transform_html(html).unwrap();
            assert_eq!(xhtml, expected);
            assert_well_formed(&xhtml);
        }
    }

    #[test]
    fn test_control_characters_removed_from_attributes() {
        let html = "<a href=\"https://x.org/\u{1}\" title=\"t\u{2}\">link</a>";
        let xhtml = transform_html(html).unwrap();
        assert_eq!(xhtml, r#"<a href="https://x.org/" title="t">link</a>"#);
        assert_well_formed(&xhtml);
    }

    #[test]
    fn test_control_only_body_is_empty() {
        assert_eq!(
            transform_html("<p>\u{1}\u{2}</p>"),
            Err(TransformError::EmptyDocument)
        );
    }

    #[test]
    fn test_less_than_in_prose_kept() {
        let xhtml = transform_html("<p>if a < b then c</p><p>second paragraph</p>").unwrap();
        assert_eq!(xhtml, "<p>if a &lt; b then c</p><p>second paragraph</p>");

        let xhtml = transform_html("<p>I <3 this, x<</p><p>a </ b</p>").unwrap();
        assert_eq!(xhtml, "<p>I &lt;3 this, x&lt;</p><p>a &lt;/ b</p>");
        assert_well_formed(&xhtml);
    }

    #[test]
    fn test_less_than_in_plain_text() {
        let xhtml = transform_html("a < b\n\nc").unwrap();
        assert_eq!(xhtml, "<p>a &lt; b</p><p>c</p>");
    }

    #[test]
    fn test_block_inside_inline_unwrapped() {
        let cases = [
            ("<span><div>x</div></span>", "<span>x</span>"),
            ("<h2><p>title</p></h2>", "<h2>title</h2>"),
            (
                r#"<a href="http://x.org"><div>card</div></a>"#,
                r#"<a href="http://x.org">card</a>"#,
            ),
            ("<em>a<hr>b</em>", "<em>ab</em>"),
            ("<pre><blockquote>q</blockquote></pre>", "<pre>q</pre>"),
        ];
        for (html, expected) in cases {
            let xhtml = transform_html(html).unwrap();
            assert_eq!(xhtml, expected);
            assert_well_formed(&xhtml);
        }
    }

    #[test]
    fn test_inline_directly_in_list_unwrapped() {
        let xhtml = transform_html("<ul><em>x</em><li>y</li></ul>").unwrap();
        assert_eq!(xhtml, "<ul><li>y</li></ul>");
    }
}
