//! Edit sessions: the write pipeline for one open note.
//!
//! ```text
//! editor change ─▶ ContentExtractor ─▶ Debouncer ─▶ save loop ─▶ SaveCoordinator ─▶ gateway
//! ```
//!
//! [`SyncClient`] is the process-wide hub. It owns the coordinator,
//! gateway and extractor, plus a guard ensuring a note's change listener
//! is attached at most once. [`SyncClient::open`] bootstraps the editor and
//! attaches the listener. The returned [`EditSession`] detaches it when
//! closed or dropped.
//!
//! The save loop awaits each save before taking the next emission, so the
//! debounced path never has two saves in flight for the same note. Values
//! emitted while a save is running are superseded by the newest one, not
//! queued.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use note_sync_core::extract::ContentExtractor;
use note_sync_core::models::NoteId;
use note_sync_core::pointer::PointerStore;

use crate::bootstrap::{BootstrapOutcome, BootstrapReconciler, EditorSurface, Readiness};
use crate::coordinator::{SaveCoordinator, SaveStatus};
use crate::debounce::{Debouncer, DEFAULT_WINDOW};
use crate::gateway::{GatewayError, PersistenceGateway};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("note {0} already has an open edit session")]
    AlreadyOpen(NoteId),

    #[error("bootstrap failed: {0}")]
    Bootstrap(#[from] GatewayError),
}

/// Process-wide sync hub.
pub struct SyncClient {
    gateway: Arc<dyn PersistenceGateway>,
    coordinator: Arc<SaveCoordinator>,
    extractor: ContentExtractor,
    window: Duration,
    attached: Arc<Mutex<HashSet<NoteId>>>,
}

impl SyncClient {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        pointers: Arc<dyn PointerStore>,
        extractor: ContentExtractor,
    ) -> Self {
        let coordinator = Arc::new(SaveCoordinator::new(gateway.clone(), pointers));
        Self {
            gateway,
            coordinator,
            extractor,
            window: DEFAULT_WINDOW,
            attached: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Overrides the debounce quiescence window.
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.gateway
    }

    pub fn coordinator(&self) -> &Arc<SaveCoordinator> {
        &self.coordinator
    }

    pub fn extractor(&self) -> &ContentExtractor {
        &self.extractor
    }

    /// Whether `note_id` currently has an attached change listener.
    pub fn is_open(&self, note_id: NoteId) -> bool {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&note_id)
    }

    /// Extracts and saves `markup` immediately, bypassing the debouncer.
    pub async fn save_now(&self, note_id: NoteId, markup: &str) -> crate::coordinator::SaveOutcome {
        let extracted = self.extractor.extract(markup);
        if extracted.fell_back {
            warn!(note_id, "markup could not be parsed; saving empty paragraph");
        }
        self.coordinator
            .save_content(Some(note_id), Some(&extracted.content))
            .await
    }

    /// Opens an edit session: attaches the listener, seeds the editor, and
    /// starts the debounced save loop.
    pub async fn open(
        &self,
        note_id: NoteId,
        editor: &dyn EditorSurface,
        ready: &Readiness,
    ) -> Result<EditSession, SessionError> {
        let guard = AttachGuard::acquire(self.attached.clone(), note_id)?;

        let reconciler = BootstrapReconciler::new(self.gateway.clone());
        let bootstrap = reconciler.bootstrap(note_id, editor, ready).await?;

        let (debouncer, emissions, debounce_task) = Debouncer::spawn(self.window);
        let saver = tokio::spawn(save_loop(note_id, self.coordinator.clone(), emissions));
        debug!(note_id, window_ms = self.window.as_millis() as u64, "edit session open");

        Ok(EditSession {
            note_id,
            extractor: self.extractor.clone(),
            coordinator: self.coordinator.clone(),
            debouncer: Some(debouncer),
            debounce_task: Some(debounce_task),
            saver: Some(saver),
            bootstrap,
            _guard: guard,
        })
    }
}

/// Marks a note's listener as attached until dropped.
struct AttachGuard {
    attached: Arc<Mutex<HashSet<NoteId>>>,
    note_id: NoteId,
}

impl AttachGuard {
    fn acquire(attached: Arc<Mutex<HashSet<NoteId>>>, note_id: NoteId) -> Result<Self, SessionError> {
        let inserted = attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(note_id);
        if !inserted {
            return Err(SessionError::AlreadyOpen(note_id));
        }
        Ok(Self { attached, note_id })
    }
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        self.attached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.note_id);
    }
}

/// An open note: feed it editor changes, close it when done.
pub struct EditSession {
    note_id: NoteId,
    extractor: ContentExtractor,
    coordinator: Arc<SaveCoordinator>,
    debouncer: Option<Debouncer>,
    debounce_task: Option<JoinHandle<()>>,
    saver: Option<JoinHandle<()>>,
    bootstrap: BootstrapOutcome,
    _guard: AttachGuard,
}

impl EditSession {
    pub fn note_id(&self) -> NoteId {
        self.note_id
    }

    /// What bootstrap loaded into the editor.
    pub fn bootstrap(&self) -> &BootstrapOutcome {
        &self.bootstrap
    }

    pub fn status(&self) -> SaveStatus {
        self.coordinator.status()
    }

    /// Records an editor change. The save happens after the quiescence window.
    pub fn on_change(&self, markup: &str) {
        let extracted = self.extractor.extract(markup);
        if extracted.fell_back {
            warn!(note_id = self.note_id, "markup could not be parsed; using empty paragraph");
        }
        if let Some(debouncer) = &self.debouncer {
            debouncer.push(extracted.content);
        }
    }

    /// Saves any pending change now and waits for it.
    pub async fn close(mut self) {
        // Dropping the last handle flushes the pending value.
        self.debouncer.take();
        if let Some(task) = self.debounce_task.take() {
            let _ = task.await;
        }
        if let Some(saver) = self.saver.take() {
            let _ = saver.await;
        }
        debug!(note_id = self.note_id, "edit session closed");
    }
}

async fn save_loop(
    note_id: NoteId,
    coordinator: Arc<SaveCoordinator>,
    mut emissions: mpsc::UnboundedReceiver<String>,
) {
    while let Some(mut content) = emissions.recv().await {
        while let Ok(newer) = emissions.try_recv() {
            content = newer;
        }
        coordinator.save_content(Some(note_id), Some(&content)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::SaveOutcome;
    use crate::gateway::StoreGateway;
    use note_sync_core::extract::EMPTY_PARAGRAPH;
    use note_sync_core::models::NewNote;
    use note_sync_core::pointer::{pointer_key, MemoryPointerStore};
    use note_sync_core::store::memory::InMemoryBlockStore;
    use note_sync_core::store::BlockStore;

    struct NullEditor;

    impl EditorSurface for NullEditor {
        fn set_content(&self, _: &str) {}
    }

    async fn client() -> (Arc<InMemoryBlockStore>, Arc<MemoryPointerStore>, SyncClient, NoteId) {
        let store = Arc::new(InMemoryBlockStore::new());
        let note = store
            .create_note(&NewNote {
                title: "Session".into(),
                content: None,
            })
            .await
            .unwrap();
        let pointers = Arc::new(MemoryPointerStore::new());
        let client = SyncClient::new(
            Arc::new(StoreGateway::new(store.clone())),
            pointers.clone(),
            ContentExtractor::default(),
        )
        .with_window(Duration::from_millis(50));
        (store, pointers, client, note.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_burst_saves_once() {
        let (store, pointers, client, note_id) = client().await;
        let session = client
            .open(note_id, &NullEditor, &Readiness::ready())
            .await
            .unwrap();
        for text in ["<p data-id=\"1\">H</p>", "<p data-id=\"2\">Hi</p>", "<p data-id=\"3\">Hi!</p>"] {
            session.on_change(text);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        let fragments = store.list_fragments(note_id).await.unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].content.text(), Some("<p>Hi!</p>"));
        assert_eq!(
            pointers.get(&pointer_key(note_id)).unwrap().as_deref(),
            Some(fragments[0].id.as_str())
        );
        session.close().await;
    }

    #[tokio::test]
    async fn test_close_flushes_pending_change() {
        let (store, _, client, note_id) = client().await;
        let client = client.with_window(Duration::from_secs(3600));
        let session = client
            .open(note_id, &NullEditor, &Readiness::ready())
            .await
            .unwrap();
        session.on_change("<p>last words</p>");
        session.close().await;
        let fragments = store.list_fragments(note_id).await.unwrap();
        assert_eq!(fragments[0].content.text(), Some("<p>last words</p>"));
    }

    #[tokio::test]
    async fn test_listener_attaches_once() {
        let (_, _, client, note_id) = client().await;
        let ready = Readiness::ready();
        let session = client.open(note_id, &NullEditor, &ready).await.unwrap();
        assert!(client.is_open(note_id));
        assert!(matches!(
            client.open(note_id, &NullEditor, &ready).await,
            Err(SessionError::AlreadyOpen(_))
        ));
        session.close().await;
        assert!(!client.is_open(note_id));
        let reopened = client.open(note_id, &NullEditor, &ready).await.unwrap();
        drop(reopened);
        assert!(!client.is_open(note_id));
    }

    #[tokio::test]
    async fn test_unknown_note_opens_empty() {
        let (_, _, client, _) = client().await;
        let session = client
            .open(404, &NullEditor, &Readiness::ready())
            .await
            .unwrap();
        assert_eq!(session.bootstrap(), &BootstrapOutcome::Empty);
        session.close().await;
        assert!(!client.is_open(404));
    }

    #[tokio::test]
    async fn test_save_now_normalizes_empty_document() {
        let (store, _, client, note_id) = client().await;
        let outcome = client.save_now(note_id, "<p data-id=\"x\"></p>").await;
        assert!(matches!(outcome, SaveOutcome::Saved(_)));
        let fragments = store.list_fragments(note_id).await.unwrap();
        assert_eq!(fragments[0].content.text(), Some(EMPTY_PARAGRAPH));
    }
}
