//! Save coordinator: turns debounced content into fragment upserts.
//!
//! [`SaveCoordinator::save_content`] is the only write path. For each call it:
//!
//! 1. validates the input (note id present, content non-empty), else
//!    returns [`SaveOutcome::Skipped`] without touching the network;
//! 2. skips the write when the content matches what was last applied and
//!    nothing is in flight ([`SaveOutcome::Unchanged`]);
//! 3. reads the client save pointer (`lastBlockId-<noteId>`) and, if set,
//!    sends it as `payload.id` so the store updates that fragment in place;
//! 4. tags the dispatch with a per-note sequence number;
//! 5. on response, discards it as stale if it is superseded, otherwise
//!    overwrites the pointer with the returned fragment id, or records the
//!    error.
//!
//! Responses may arrive in any order. A success is stale once a newer save
//! has been applied; it must not move the pointer back. A failure is stale
//! once any newer save has been dispatched; it must not surface an error.
//! Discarding a stale response also forgets the applied content hash, so
//! the next save of that content is written rather than deduplicated.
//!
//! ```text
//! dispatch A(seq 1) ─┐
//! dispatch B(seq 2) ─┼─▶ B ok → applied = 2, pointer = B.id
//!                    └─▶ A ok → 1 < 2 → stale, dropped
//! ```
//!
//! Failures never retry here. The next debounced save is the retry path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use note_sync_core::extract::content_type_of;
use note_sync_core::models::{Fragment, FragmentMetadata, NoteId, SavePayload, TEXT_BLOCK_TYPE};
use note_sync_core::pointer::{pointer_key, PointerStore};

use crate::gateway::{GatewayError, PersistenceGateway};

/// User-visible save state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveStatus {
    pub is_saving: bool,
    pub error: Option<String>,
    pub last_saved_at: Option<DateTime<Utc>>,
}

/// Why a save was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingNoteId,
    MissingContent,
}

/// Result of one [`SaveCoordinator::save_content`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Skipped(SkipReason),
    /// Content equals the last applied save; no request was sent.
    Unchanged,
    Saved(Fragment),
    /// The response arrived after a newer save had been applied.
    Stale { seq: u64 },
    Failed(GatewayError),
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved(_))
    }
}

#[derive(Debug, Default)]
struct NoteState {
    /// Sequence number of the latest dispatch.
    dispatched: u64,
    /// Sequence number of the latest response that was applied.
    applied: u64,
    in_flight: usize,
    last_applied_hash: Option<String>,
}

/// Serializes saves per note and owns the client save pointers.
pub struct SaveCoordinator {
    gateway: Arc<dyn PersistenceGateway>,
    pointers: Arc<dyn PointerStore>,
    notes: Mutex<HashMap<NoteId, NoteState>>,
    status: watch::Sender<SaveStatus>,
}

impl SaveCoordinator {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, pointers: Arc<dyn PointerStore>) -> Self {
        let (status, _) = watch::channel(SaveStatus::default());
        Self {
            gateway,
            pointers,
            notes: Mutex::new(HashMap::new()),
            status,
        }
    }

    /// Snapshot of the current save state.
    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.subscribe()
    }

    /// The fragment id the next save of `note_id` would update.
    pub fn pointer(&self, note_id: NoteId) -> Option<String> {
        match self.pointers.get(&pointer_key(note_id)) {
            Ok(pointer) => pointer,
            Err(e) => {
                warn!(note_id, error = %e, "failed to read save pointer");
                None
            }
        }
    }

    /// Saves `content` as the current state of `note_id`.
    pub async fn save_content(&self, note_id: Option<NoteId>, content: Option<&str>) -> SaveOutcome {
        let Some(note_id) = note_id else {
            debug!("save skipped: no note id");
            return SaveOutcome::Skipped(SkipReason::MissingNoteId);
        };
        let Some(content) = content.filter(|c| !c.is_empty()) else {
            debug!(note_id, "save skipped: no content");
            return SaveOutcome::Skipped(SkipReason::MissingContent);
        };

        let hash = content_hash(content);
        let pointer = self.pointer(note_id);

        let seq = {
            let mut notes = self.notes.lock().unwrap_or_else(PoisonError::into_inner);
            let state = notes.entry(note_id).or_default();
            if pointer.is_some()
                && state.in_flight == 0
                && state.last_applied_hash.as_deref() == Some(hash.as_str())
            {
                debug!(note_id, "save skipped: content unchanged");
                return SaveOutcome::Unchanged;
            }
            state.dispatched += 1;
            state.in_flight += 1;
            state.dispatched
        };
        self.status.send_modify(|s| s.is_saving = true);

        let payload = SavePayload {
            content: content.to_string(),
            note_id,
            slug: SavePayload::fresh_slug(),
            metadata: FragmentMetadata::new(content_type_of(content), Utc::now()),
            block_type: TEXT_BLOCK_TYPE.to_string(),
            order: 0,
            id: pointer,
        };
        debug!(note_id, seq, update = payload.id.is_some(), "dispatching save");

        let result = self.gateway.upsert(&payload).await;
        self.settle(note_id, seq, hash, result)
    }

    /// Applies or discards a response. Runs under the state lock so
    /// pointer writes happen in the same order as sequence checks.
    fn settle(
        &self,
        note_id: NoteId,
        seq: u64,
        hash: String,
        result: Result<Fragment, GatewayError>,
    ) -> SaveOutcome {
        let mut notes = self.notes.lock().unwrap_or_else(PoisonError::into_inner);
        let state = notes.entry(note_id).or_default();
        state.in_flight = state.in_flight.saturating_sub(1);
        // A success only loses to a newer applied save; a failure loses to
        // any newer dispatch, since that save supersedes it either way.
        let stale = match &result {
            Ok(_) => seq < state.applied,
            Err(_) => seq < state.dispatched,
        };

        let outcome = match result {
            _ if stale => {
                debug!(note_id, seq, applied = state.applied, "discarding stale save response");
                // The discarded write may have landed after the applied one,
                // so the store no longer provably holds the applied content.
                state.last_applied_hash = None;
                SaveOutcome::Stale { seq }
            }
            Ok(fragment) => {
                state.applied = seq;
                state.last_applied_hash = Some(hash);
                if let Err(e) = self.pointers.set(&pointer_key(note_id), &fragment.id) {
                    warn!(note_id, error = %e, "saved but failed to persist save pointer");
                }
                info!(note_id, seq, fragment = %fragment.id, "saved");
                SaveOutcome::Saved(fragment)
            }
            Err(e) => {
                warn!(note_id, seq, transient = e.is_transient(), error = %e, "save failed");
                SaveOutcome::Failed(e)
            }
        };

        let saving = notes.values().any(|s| s.in_flight > 0);
        self.status.send_modify(|s| {
            s.is_saving = saving;
            match &outcome {
                SaveOutcome::Saved(_) => {
                    s.error = None;
                    s.last_saved_at = Some(Utc::now());
                }
                SaveOutcome::Failed(e) => s.error = Some(format!("Save failed: {}", e)),
                _ => {}
            }
        });
        outcome
    }
}

/// Hex SHA-256 of content, used for write dedupe.
fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
