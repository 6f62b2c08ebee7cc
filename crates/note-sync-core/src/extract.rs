//! Content extraction: live editor markup → persistence-safe string.
//!
//! The editor serializes its document as HTML-like markup. Before that
//! markup is stored or compared, [`ContentExtractor::extract`]:
//!
//! - removes transient per-node identifier attributes (`data-id` and
//!   friends), which the editor regenerates on every load;
//! - collapses a document with no user content to [`EMPTY_PARAGRAPH`];
//! - falls back to [`EMPTY_PARAGRAPH`] when the markup cannot be tokenized.
//!
//! Extraction is a pure function: no I/O, no logging, never panics.
//! Callers that care about the fallback path inspect
//! [`Extracted::fell_back`].

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::models::ContentType;

/// Canonical representation of a document with no user-entered content.
pub const EMPTY_PARAGRAPH: &str = "<p></p>";

/// Attributes stripped when no explicit list is configured.
pub const DEFAULT_TRANSIENT_ATTRIBUTES: &[&str] = &["data-id", "data-node-id", "data-block-id"];

/// Elements that count as content even without any text inside them.
const MEDIA_ELEMENTS: &[&str] = &[
    "img", "video", "audio", "iframe", "embed", "object", "svg", "canvas", "hr",
];

/// Result of one extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub content: String,
    pub content_type: ContentType,
    /// `true` when the markup could not be tokenized and the canonical
    /// empty paragraph was substituted.
    pub fell_back: bool,
}

/// Strips transient attributes and normalizes empty documents.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    transient_attributes: Vec<String>,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSIENT_ATTRIBUTES.iter().map(|s| s.to_string()))
    }
}

impl ContentExtractor {
    /// Creates an extractor stripping the given attribute names (case-insensitive).
    pub fn new<I, S>(transient_attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            transient_attributes: transient_attributes
                .into_iter()
                .map(|s| s.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Extracts the storable content of `markup`.
    pub fn extract(&self, markup: &str) -> Extracted {
        match self.rewrite(markup) {
            Some((content, true)) => Extracted {
                content,
                content_type: ContentType::Text,
                fell_back: false,
            },
            Some((_, false)) => empty(false),
            None => empty(true),
        }
    }

    /// Convenience wrapper returning only the content string.
    pub fn extract_content(&self, markup: &str) -> String {
        self.extract(markup).content
    }

    fn is_transient(&self, key: &[u8]) -> bool {
        self.transient_attributes
            .iter()
            .any(|name| name.as_bytes().eq_ignore_ascii_case(key))
    }

    /// Re-serializes `markup` without transient attributes.
    ///
    /// Returns the rewritten markup and whether it holds any user content,
    /// or `None` if tokenizing fails anywhere.
    fn rewrite(&self, markup: &str) -> Option<(String, bool)> {
        let mut reader = Reader::from_str(markup);
        // Editor HTML has void elements (`<br>`) that never close.
        reader.config_mut().check_end_names = false;

        let mut writer = Writer::new(Vec::new());
        let mut has_content = false;

        loop {
            match reader.read_event().ok()? {
                Event::Eof => break,
                Event::Start(start) => {
                    has_content |= is_media(&start);
                    let cleaned = self.strip(&start)?;
                    writer.write_event(Event::Start(cleaned)).ok()?;
                }
                Event::Empty(start) => {
                    has_content |= is_media(&start);
                    let cleaned = self.strip(&start)?;
                    writer.write_event(Event::Empty(cleaned)).ok()?;
                }
                Event::Text(text) => {
                    has_content |= has_visible_text(&String::from_utf8_lossy(&text));
                    writer.write_event(Event::Text(text)).ok()?;
                }
                Event::CData(data) => {
                    has_content |= has_visible_text(&String::from_utf8_lossy(&data));
                    writer.write_event(Event::CData(data)).ok()?;
                }
                other => writer.write_event(other).ok()?,
            }
        }

        let content = String::from_utf8(writer.into_inner()).ok()?;
        Some((content, has_content))
    }

    fn strip(&self, start: &BytesStart<'_>) -> Option<BytesStart<'static>> {
        let name = std::str::from_utf8(start.name().as_ref()).ok()?.to_string();
        let mut cleaned = BytesStart::new(name);
        for attr in start.html_attributes() {
            let attr = attr.ok()?;
            if !self.is_transient(attr.key.as_ref()) {
                cleaned.push_attribute(attr);
            }
        }
        Some(cleaned)
    }
}

/// Classifies already-extracted content for fragment metadata.
pub fn content_type_of(content: &str) -> ContentType {
    if content == EMPTY_PARAGRAPH {
        ContentType::EmptyParagraph
    } else {
        ContentType::Text
    }
}

fn empty(fell_back: bool) -> Extracted {
    Extracted {
        content: EMPTY_PARAGRAPH.to_string(),
        content_type: ContentType::EmptyParagraph,
        fell_back,
    }
}

fn is_media(start: &BytesStart<'_>) -> bool {
    let name = start.name();
    MEDIA_ELEMENTS
        .iter()
        .any(|m| m.as_bytes().eq_ignore_ascii_case(name.as_ref()))
}

fn has_visible_text(raw: &str) -> bool {
    raw.replace("&nbsp;", " ")
        .replace("&#160;", " ")
        .chars()
        .any(|c| !c.is_whitespace())
}
