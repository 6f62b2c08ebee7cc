//! SQLite-backed [`BlockStore`] implementation.
//!
//! Notes live in `notes`, fragments in `blocks`. Listing order follows the
//! `blocks.seq` rowid, i.e. insertion order. Timestamps are stored as Unix
//! milliseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use note_sync_core::models::{
    Fragment, FragmentContent, FragmentMetadata, NewNote, Note, NoteId, NoteKey, SavePayload,
};
use note_sync_core::store::{
    derived_fragment_id, note_slug, seed_payload, validate_payload, validate_title, BlockStore,
    StoreError, StoreResult,
};

/// SQLite implementation of the [`BlockStore`] trait.
pub struct SqliteBlockStore {
    pool: SqlitePool,
}

impl SqliteBlockStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.into())
}

fn json_error(e: serde_json::Error) -> StoreError {
    StoreError::Backend(e.into())
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn row_to_note(row: &SqliteRow) -> StoreResult<Note> {
    Ok(Note {
        id: row.try_get("id").map_err(backend)?,
        slug: row.try_get("slug").map_err(backend)?,
        title: row.try_get("title").map_err(backend)?,
        content: row.try_get("content").map_err(backend)?,
        created_at: from_millis(row.try_get("created_at").map_err(backend)?),
        updated_at: from_millis(row.try_get("updated_at").map_err(backend)?),
    })
}

fn row_to_fragment(row: &SqliteRow) -> StoreResult<Fragment> {
    let content_json: String = row.try_get("content_json").map_err(backend)?;
    // Rows written by hand may hold bare markup rather than JSON.
    let content = serde_json::from_str::<FragmentContent>(&content_json)
        .unwrap_or(FragmentContent::Plain(content_json));
    let metadata_json: Option<String> = row.try_get("metadata_json").map_err(backend)?;
    let metadata = metadata_json.and_then(|raw| serde_json::from_str::<FragmentMetadata>(&raw).ok());

    Ok(Fragment {
        id: row.try_get("id").map_err(backend)?,
        note_id: row.try_get("note_id").map_err(backend)?,
        slug: row.try_get("slug").map_err(backend)?,
        content,
        block_type: row.try_get("block_type").map_err(backend)?,
        order: row.try_get("order_index").map_err(backend)?,
        metadata,
        created_at: from_millis(row.try_get("created_at").map_err(backend)?),
        updated_at: from_millis(row.try_get("updated_at").map_err(backend)?),
    })
}

const FRAGMENT_COLUMNS: &str = "id, note_id, slug, content_json, block_type, order_index, metadata_json, created_at, updated_at";

#[async_trait]
impl BlockStore for SqliteBlockStore {
    async fn create_note(&self, new: &NewNote) -> StoreResult<Note> {
        validate_title(&new.title)?;
        let now = Utc::now().timestamp_millis();
        let slug = note_slug(&new.title);
        let content = new.content.clone().unwrap_or_default();

        let result = sqlx::query(
            "INSERT INTO notes (slug, title, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&slug)
        .bind(&new.title)
        .bind(&content)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        let note = Note {
            id: result.last_insert_rowid(),
            slug,
            title: new.title.clone(),
            content,
            created_at: from_millis(now),
            updated_at: from_millis(now),
        };

        if !note.content.is_empty() {
            self.upsert_fragment(&seed_payload(note.id, &note.content))
                .await?;
        }
        Ok(note)
    }

    async fn get_note(&self, key: &NoteKey) -> StoreResult<Option<Note>> {
        let row = match key {
            NoteKey::Id(id) => {
                sqlx::query("SELECT id, slug, title, content, created_at, updated_at FROM notes WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
            }
            NoteKey::Slug(slug) => {
                sqlx::query("SELECT id, slug, title, content, created_at, updated_at FROM notes WHERE slug = ?")
                    .bind(slug)
                    .fetch_optional(&self.pool)
                    .await
            }
        }
        .map_err(backend)?;

        row.as_ref().map(row_to_note).transpose()
    }

    async fn rename_note(&self, id: NoteId, title: &str) -> StoreResult<Note> {
        validate_title(title)?;
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query("UPDATE notes SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NoteNotFound(id.to_string()));
        }
        self.get_note(&NoteKey::Id(id))
            .await?
            .ok_or_else(|| StoreError::NoteNotFound(id.to_string()))
    }

    async fn upsert_fragment(&self, payload: &SavePayload) -> StoreResult<Fragment> {
        validate_payload(payload)?;
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let note_exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM notes WHERE id = ?")
            .bind(payload.note_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        if !note_exists {
            return Err(StoreError::NoteNotFound(payload.note_id.to_string()));
        }

        let mut target: Option<String> = None;
        if let Some(id) = payload.id.as_deref() {
            let owner: Option<i64> = sqlx::query_scalar("SELECT note_id FROM blocks WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
            match owner {
                Some(owner) if owner != payload.note_id => {
                    return Err(StoreError::Conflict(format!(
                        "fragment {} belongs to note {}",
                        id, owner
                    )));
                }
                Some(_) => target = Some(id.to_string()),
                None => {}
            }
        }

        let derived = derived_fragment_id(payload.note_id, &payload.slug);
        let content_json =
            serde_json::to_string(&FragmentContent::Plain(payload.content.clone())).map_err(json_error)?;
        let metadata_json = serde_json::to_string(&payload.metadata).map_err(json_error)?;
        let now = Utc::now().timestamp_millis();

        let updated = sqlx::query(
            r#"
            UPDATE blocks SET content_json = ?, block_type = ?, order_index = ?,
                              metadata_json = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&content_json)
        .bind(&payload.block_type)
        .bind(payload.order)
        .bind(&metadata_json)
        .bind(now)
        .bind(target.as_deref().unwrap_or(&derived))
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let id = match target {
            Some(id) => id,
            None => {
                if updated.rows_affected() == 0 {
                    sqlx::query(
                        r#"
                        INSERT INTO blocks (id, note_id, slug, content_json, block_type,
                                            order_index, metadata_json, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&derived)
                    .bind(payload.note_id)
                    .bind(&payload.slug)
                    .bind(&content_json)
                    .bind(&payload.block_type)
                    .bind(payload.order)
                    .bind(&metadata_json)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend)?;
                }
                derived
            }
        };

        let row = sqlx::query(&format!("SELECT {} FROM blocks WHERE id = ?", FRAGMENT_COLUMNS))
            .bind(&id)
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        let fragment = row_to_fragment(&row)?;

        tx.commit().await.map_err(backend)?;
        Ok(fragment)
    }

    async fn list_fragments(&self, note_id: NoteId) -> StoreResult<Vec<Fragment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM blocks WHERE note_id = ? ORDER BY seq ASC",
            FRAGMENT_COLUMNS
        ))
        .bind(note_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_fragment).collect()
    }
}
