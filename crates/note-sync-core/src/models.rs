//! Data models shared by the store, the gateway, and the save pipeline.
//!
//! Field names serialize in camelCase to match the block store's wire
//! format (`noteId`, `lastEditedAt`, `updatedAt`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier of a note, assigned by the store on creation.
pub type NoteId = i64;

/// Block type written by the auto-save flow.
pub const TEXT_BLOCK_TYPE: &str = "text";

fn default_block_type() -> String {
    TEXT_BLOCK_TYPE.to_string()
}

/// A note (document) as returned by `GET /notes/{key}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    pub slug: String,
    pub title: String,
    /// Content the note was created with. Live content lives in fragments.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Request body for `POST /notes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub title: String,
    /// Optional seed content, stored as the note's first fragment.
    #[serde(default)]
    pub content: Option<String>,
}

/// Request body for `PATCH /notes/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameNote {
    pub title: String,
}

/// Lookup key for a note: its numeric id or its slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteKey {
    Id(NoteId),
    Slug(String),
}

impl NoteKey {
    /// Parses a path segment; all-digit segments are ids, anything else is a slug.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<NoteId>() {
            Ok(id) => NoteKey::Id(id),
            Err(_) => NoteKey::Slug(raw.to_string()),
        }
    }
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteKey::Id(id) => write!(f, "{}", id),
            NoteKey::Slug(slug) => f.write_str(slug),
        }
    }
}

/// Classification of stored content, kept in fragment metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    EmptyParagraph,
}

/// Metadata record attached to every fragment.
///
/// Both fields are optional on read: fragments written by older clients
/// may carry no metadata at all, or a timestamp that does not parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    /// ISO 8601 timestamp of the edit that produced this content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_at: Option<String>,
}

impl FragmentMetadata {
    pub fn new(content_type: ContentType, last_edited_at: DateTime<Utc>) -> Self {
        Self {
            content_type: Some(content_type),
            last_edited_at: Some(last_edited_at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        }
    }

    /// Parsed `lastEditedAt`, or `None` when absent or malformed.
    pub fn last_edited_at(&self) -> Option<DateTime<Utc>> {
        self.last_edited_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Nested content shape: `{ "content": "<p>…</p>" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedContent {
    pub content: String,
}

/// Stored fragment content.
///
/// Fragments normally hold a plain markup string, but some rows carry the
/// markup wrapped in an object. Anything else is kept verbatim so that a
/// single odd row cannot fail a whole listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FragmentContent {
    Plain(String),
    Nested(NestedContent),
    Other(serde_json::Value),
}

impl FragmentContent {
    /// The markup string carried by this content, whichever shape it has.
    pub fn text(&self) -> Option<&str> {
        match self {
            FragmentContent::Plain(value) => Some(value),
            FragmentContent::Nested(nested) => Some(&nested.content),
            FragmentContent::Other(_) => None,
        }
    }
}

impl From<String> for FragmentContent {
    fn from(value: String) -> Self {
        FragmentContent::Plain(value)
    }
}

impl From<&str> for FragmentContent {
    fn from(value: &str) -> Self {
        FragmentContent::Plain(value.to_string())
    }
}

/// A persisted snapshot of a note's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    pub id: String,
    pub note_id: NoteId,
    #[serde(default)]
    pub slug: String,
    pub content: FragmentContent,
    #[serde(rename = "type", default = "default_block_type")]
    pub block_type: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default)]
    pub metadata: Option<FragmentMetadata>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of `PUT /blocks`, built by the save coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    pub content: String,
    pub note_id: NoteId,
    /// Fresh per call; the store derives a new fragment's identity from it.
    pub slug: String,
    pub metadata: FragmentMetadata,
    #[serde(rename = "type", default = "default_block_type")]
    pub block_type: String,
    #[serde(default)]
    pub order: i64,
    /// Fragment to update in place. Absent on the first save of a note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl SavePayload {
    /// Generates a slug unique to one save call.
    pub fn fresh_slug() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Response body of `PUT /blocks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertResponse {
    pub block: Fragment,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fragment_plain_content() {
        let fragment: Fragment = serde_json::from_value(json!({
            "id": "b1",
            "noteId": 7,
            "slug": "s",
            "content": "<p>hi</p>",
            "type": "text",
            "metadata": {"contentType": "text", "lastEditedAt": "2024-05-01T10:00:00.000Z"}
        }))
        .unwrap();
        assert_eq!(fragment.content.text(), Some("<p>hi</p>"));
        assert_eq!(
            fragment.metadata.unwrap().content_type,
            Some(ContentType::Text)
        );
    }

    #[test]
    fn test_fragment_nested_content() {
        let fragment: Fragment = serde_json::from_value(json!({
            "id": "b2",
            "noteId": 7,
            "content": {"content": "<p>nested</p>"}
        }))
        .unwrap();
        assert_eq!(fragment.content.text(), Some("<p>nested</p>"));
        assert_eq!(fragment.block_type, "text");
        assert!(fragment.metadata.is_none());
    }

    #[test]
    fn test_fragment_unknown_content_shape_is_kept() {
        let fragment: Fragment = serde_json::from_value(json!({
            "id": "b3",
            "noteId": 7,
            "content": [1, 2, 3]
        }))
        .unwrap();
        assert_eq!(fragment.content.text(), None);
    }

    #[test]
    fn test_payload_omits_absent_id() {
        let payload = SavePayload {
            content: "<p>x</p>".into(),
            note_id: 3,
            slug: "abc".into(),
            metadata: FragmentMetadata::default(),
            block_type: TEXT_BLOCK_TYPE.into(),
            order: 0,
            id: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["noteId"], 3);
        assert_eq!(value["type"], "text");
    }

    #[test]
    fn test_metadata_wire_names() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let value = serde_json::to_value(FragmentMetadata::new(ContentType::EmptyParagraph, at)).unwrap();
        assert_eq!(value["contentType"], "empty_paragraph");
        assert_eq!(value["lastEditedAt"], "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn test_malformed_last_edited_at_parses_as_none() {
        let meta = FragmentMetadata {
            content_type: None,
            last_edited_at: Some("yesterday".into()),
        };
        assert!(meta.last_edited_at().is_none());
    }

    #[test]
    fn test_note_key_parse() {
        assert_eq!(NoteKey::parse("42"), NoteKey::Id(42));
        assert_eq!(NoteKey::parse("my-note"), NoteKey::Slug("my-note".into()));
    }

    #[test]
    fn test_fresh_slugs_differ() {
        assert_ne!(SavePayload::fresh_slug(), SavePayload::fresh_slug());
    }
}
