//! In-memory [`BlockStore`] implementation for tests and local sessions.
//!
//! Notes and fragments live in `Vec`s behind `std::sync::RwLock`, so
//! listing order is insertion order, the same as the SQLite store's rowid order.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use crate::models::{Fragment, FragmentContent, NewNote, Note, NoteId, NoteKey, SavePayload};

use super::{
    derived_fragment_id, note_slug, seed_payload, validate_payload, validate_title, BlockStore,
    StoreError, StoreResult,
};

#[derive(Default)]
struct Notes {
    next_id: NoteId,
    rows: Vec<Note>,
}

/// In-memory store for tests and transient sessions.
#[derive(Default)]
pub struct InMemoryBlockStore {
    notes: RwLock<Notes>,
    fragments: RwLock<Vec<Fragment>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of fragments across all notes.
    pub fn fragment_count(&self) -> usize {
        self.fragments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Inserts a fragment verbatim, bypassing upsert resolution.
    ///
    /// Lets tests seed legacy rows (nested content, missing metadata).
    pub fn insert_raw(&self, fragment: Fragment) {
        self.fragments
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(fragment);
    }

    fn note_exists(&self, id: NoteId) -> bool {
        self.notes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .iter()
            .any(|n| n.id == id)
    }
}

#[async_trait]
impl BlockStore for InMemoryBlockStore {
    async fn create_note(&self, new: &NewNote) -> StoreResult<Note> {
        validate_title(&new.title)?;
        let now = Utc::now();
        let note = {
            let mut notes = self.notes.write().unwrap_or_else(PoisonError::into_inner);
            notes.next_id += 1;
            let note = Note {
                id: notes.next_id,
                slug: note_slug(&new.title),
                title: new.title.clone(),
                content: new.content.clone().unwrap_or_default(),
                created_at: Some(now),
                updated_at: Some(now),
            };
            notes.rows.push(note.clone());
            note
        };

        if let Some(content) = new.content.as_deref().filter(|c| !c.is_empty()) {
            self.upsert_fragment(&seed_payload(note.id, content)).await?;
        }
        Ok(note)
    }

    async fn get_note(&self, key: &NoteKey) -> StoreResult<Option<Note>> {
        let notes = self.notes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(notes
            .rows
            .iter()
            .find(|n| match key {
                NoteKey::Id(id) => n.id == *id,
                NoteKey::Slug(slug) => n.slug == *slug,
            })
            .cloned())
    }

    async fn rename_note(&self, id: NoteId, title: &str) -> StoreResult<Note> {
        validate_title(title)?;
        let mut notes = self.notes.write().unwrap_or_else(PoisonError::into_inner);
        let note = notes
            .rows
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| StoreError::NoteNotFound(id.to_string()))?;
        note.title = title.to_string();
        note.updated_at = Some(Utc::now());
        Ok(note.clone())
    }

    async fn upsert_fragment(&self, payload: &SavePayload) -> StoreResult<Fragment> {
        validate_payload(payload)?;
        if !self.note_exists(payload.note_id) {
            return Err(StoreError::NoteNotFound(payload.note_id.to_string()));
        }

        let now = Utc::now();
        let mut fragments = self.fragments.write().unwrap_or_else(PoisonError::into_inner);

        let mut target = None;
        if let Some(id) = payload.id.as_deref() {
            if let Some(pos) = fragments.iter().position(|f| f.id == id) {
                if fragments[pos].note_id != payload.note_id {
                    return Err(StoreError::Conflict(format!(
                        "fragment {} belongs to note {}",
                        id, fragments[pos].note_id
                    )));
                }
                target = Some(pos);
            }
        }
        let derived = derived_fragment_id(payload.note_id, &payload.slug);
        if target.is_none() {
            target = fragments.iter().position(|f| f.id == derived);
        }

        match target {
            Some(pos) => {
                let fragment = &mut fragments[pos];
                fragment.content = FragmentContent::Plain(payload.content.clone());
                fragment.metadata = Some(payload.metadata.clone());
                fragment.block_type = payload.block_type.clone();
                fragment.order = payload.order;
                fragment.updated_at = Some(now);
                Ok(fragment.clone())
            }
            None => {
                let fragment = Fragment {
                    id: derived,
                    note_id: payload.note_id,
                    slug: payload.slug.clone(),
                    content: FragmentContent::Plain(payload.content.clone()),
                    block_type: payload.block_type.clone(),
                    order: payload.order,
                    metadata: Some(payload.metadata.clone()),
                    created_at: Some(now),
                    updated_at: Some(now),
                };
                fragments.push(fragment.clone());
                Ok(fragment)
            }
        }
    }

    async fn list_fragments(&self, note_id: NoteId) -> StoreResult<Vec<Fragment>> {
        let fragments = self.fragments.read().unwrap_or_else(PoisonError::into_inner);
        Ok(fragments
            .iter()
            .filter(|f| f.note_id == note_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FragmentMetadata;

    fn payload(note_id: NoteId, content: &str, id: Option<&str>) -> SavePayload {
        SavePayload {
            content: content.into(),
            note_id,
            slug: SavePayload::fresh_slug(),
            metadata: FragmentMetadata::default(),
            block_type: "text".into(),
            order: 0,
            id: id.map(str::to_string),
        }
    }

    async fn note(store: &InMemoryBlockStore) -> Note {
        store
            .create_note(&NewNote {
                title: "Test".into(),
                content: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_then_update_in_place() {
        let store = InMemoryBlockStore::new();
        let n = note(&store).await;
        let first = store.upsert_fragment(&payload(n.id, "<p>a</p>", None)).await.unwrap();
        let second = store
            .upsert_fragment(&payload(n.id, "<p>b</p>", Some(&first.id)))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.fragment_count(), 1);
        assert_eq!(second.content.text(), Some("<p>b</p>"));
    }

    #[tokio::test]
    async fn test_same_payload_twice_is_idempotent() {
        let store = InMemoryBlockStore::new();
        let n = note(&store).await;
        let p = payload(n.id, "<p>a</p>", None);
        let a = store.upsert_fragment(&p).await.unwrap();
        let b = store.upsert_fragment(&p).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.list_fragments(n.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_note_rejected() {
        let store = InMemoryBlockStore::new();
        let err = store
            .upsert_fragment(&payload(99, "<p>a</p>", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NoteNotFound(_)));
    }

    #[tokio::test]
    async fn test_unknown_pointer_creates_fresh_fragment() {
        let store = InMemoryBlockStore::new();
        let n = note(&store).await;
        let f = store
            .upsert_fragment(&payload(n.id, "<p>a</p>", Some("gone")))
            .await
            .unwrap();
        assert_ne!(f.id, "gone");
        assert_eq!(store.fragment_count(), 1);
    }

    #[tokio::test]
    async fn test_pointer_into_other_note_conflicts() {
        let store = InMemoryBlockStore::new();
        let a = note(&store).await;
        let b = note(&store).await;
        let f = store.upsert_fragment(&payload(a.id, "x", None)).await.unwrap();
        let err = store
            .upsert_fragment(&payload(b.id, "y", Some(&f.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_seed_content_becomes_fragment() {
        let store = InMemoryBlockStore::new();
        let n = store
            .create_note(&NewNote {
                title: "Seeded".into(),
                content: Some("<p>seed</p>".into()),
            })
            .await
            .unwrap();
        let fragments = store.list_fragments(n.id).await.unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].content.text(), Some("<p>seed</p>"));
        assert!(fragments[0].metadata.as_ref().unwrap().last_edited_at().is_some());
    }

    #[tokio::test]
    async fn test_get_by_slug_and_rename() {
        let store = InMemoryBlockStore::new();
        let n = note(&store).await;
        let by_slug = store
            .get_note(&NoteKey::Slug(n.slug.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_slug.id, n.id);
        let renamed = store.rename_note(n.id, "Renamed").await.unwrap();
        assert_eq!(renamed.title, "Renamed");
        assert!(store.rename_note(999, "x").await.is_err());
    }
}
