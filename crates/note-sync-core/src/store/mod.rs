//! Storage abstraction for notes and their fragments.
//!
//! The [`BlockStore`] trait is the server-side contract behind the block
//! endpoints: create and look up notes, upsert a fragment by identity, and
//! list a note's fragments. Two implementations exist: the in-memory
//! [`memory::InMemoryBlockStore`] here and the SQLite store in `note-sync`.
//!
//! # Upsert by identity
//!
//! [`BlockStore::upsert_fragment`] resolves its target in this order:
//!
//! 1. `payload.id` names an existing fragment of the same note → update it.
//!    If it belongs to another note the call fails with [`StoreError::Conflict`].
//! 2. Otherwise the fragment id is derived from `(noteId, slug)` by
//!    [`derived_fragment_id`]. If that fragment exists it is updated, which makes
//!    re-sending an identical create payload idempotent.
//! 3. Otherwise a new fragment is inserted under the derived id.
//!
//! Updating replaces content, metadata, type and order, and bumps
//! `updatedAt`. Re-applying the same content yields the same stored state.

pub mod memory;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::extract::content_type_of;
use crate::models::{
    Fragment, FragmentMetadata, NewNote, Note, NoteId, NoteKey, SavePayload, TEXT_BLOCK_TYPE,
};

/// Errors surfaced by [`BlockStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("note not found: {0}")]
    NoteNotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Abstract note and fragment storage.
///
/// | Method | Endpoint |
/// |--------|----------|
/// | [`create_note`](BlockStore::create_note) | `POST /notes` |
/// | [`get_note`](BlockStore::get_note) | `GET /notes/{key}` |
/// | [`rename_note`](BlockStore::rename_note) | `PATCH /notes/{id}` |
/// | [`upsert_fragment`](BlockStore::upsert_fragment) | `PUT /blocks` |
/// | [`list_fragments`](BlockStore::list_fragments) | `GET /blocks?noteId=` |
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Creates a note. Seed content, if any, becomes the note's first fragment.
    async fn create_note(&self, new: &NewNote) -> StoreResult<Note>;

    async fn get_note(&self, key: &NoteKey) -> StoreResult<Option<Note>>;

    /// Replaces a note's title. Content is untouched.
    async fn rename_note(&self, id: NoteId, title: &str) -> StoreResult<Note>;

    /// Inserts or updates a fragment; see the module docs for resolution.
    async fn upsert_fragment(&self, payload: &SavePayload) -> StoreResult<Fragment>;

    /// All fragments of a note in store order. Unknown notes yield an empty list.
    async fn list_fragments(&self, note_id: NoteId) -> StoreResult<Vec<Fragment>>;
}

/// Identity a newly created fragment receives.
pub fn derived_fragment_id(note_id: NoteId, slug: &str) -> String {
    format!("{}-{}", note_id, slug)
}

/// Rejects payloads no store should accept.
pub fn validate_payload(payload: &SavePayload) -> StoreResult<()> {
    if payload.content.is_empty() {
        return Err(StoreError::Invalid("content must not be empty".into()));
    }
    if payload.slug.trim().is_empty() {
        return Err(StoreError::Invalid("slug must not be empty".into()));
    }
    if payload.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
        return Err(StoreError::Invalid("id must not be blank when present".into()));
    }
    Ok(())
}

/// Payload for the fragment seeded from a new note's initial content.
pub fn seed_payload(note_id: NoteId, content: &str) -> SavePayload {
    SavePayload {
        content: content.to_string(),
        note_id,
        slug: SavePayload::fresh_slug(),
        metadata: FragmentMetadata::new(content_type_of(content), Utc::now()),
        block_type: TEXT_BLOCK_TYPE.to_string(),
        order: 0,
        id: None,
    }
}

pub fn validate_title(title: &str) -> StoreResult<()> {
    if title.trim().is_empty() {
        return Err(StoreError::Invalid("title must not be empty".into()));
    }
    Ok(())
}

/// URL-safe slug for a new note: the title's alphanumerics plus a random suffix.
pub fn note_slug(title: &str) -> String {
    let mut base = String::new();
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            base.push(c.to_ascii_lowercase());
        } else if !base.ends_with('-') && !base.is_empty() {
            base.push('-');
        }
    }
    let base = base.trim_end_matches('-');
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
    if base.is_empty() {
        format!("note-{}", suffix)
    } else {
        format!("{}-{}", base, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(content: &str, slug: &str) -> SavePayload {
        SavePayload {
            content: content.into(),
            note_id: 1,
            slug: slug.into(),
            metadata: FragmentMetadata::default(),
            block_type: "text".into(),
            order: 0,
            id: None,
        }
    }

    #[test]
    fn test_validate_payload() {
        assert!(validate_payload(&payload("<p>x</p>", "s")).is_ok());
        assert!(matches!(
            validate_payload(&payload("", "s")),
            Err(StoreError::Invalid(_))
        ));
        assert!(matches!(
            validate_payload(&payload("x", " ")),
            Err(StoreError::Invalid(_))
        ));
        let mut blank_id = payload("x", "s");
        blank_id.id = Some(String::new());
        assert!(validate_payload(&blank_id).is_err());
    }

    #[test]
    fn test_note_slug_shape() {
        let slug = note_slug("Weekly Plan: Q3!");
        assert!(slug.starts_with("weekly-plan-q3-"), "{}", slug);
        assert_eq!(slug.len(), "weekly-plan-q3-".len() + 8);
        assert!(note_slug("???").starts_with("note-"));
    }

    #[test]
    fn test_derived_fragment_id() {
        assert_eq!(derived_fragment_id(5, "abc"), "5-abc");
    }
}
