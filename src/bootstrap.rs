//! Bootstrap reconciliation: seed the live editor from stored fragments.
//!
//! On open, every fragment of the note is fetched and the most recently
//! edited one is selected (see [`note_sync_core::reconcile`]). Its content
//! is fed to the editor once the editor signals readiness, and at most once
//! per [`BootstrapReconciler`].
//!
//! Readiness is an explicit signal ([`Readiness`]) rather than a fixed
//! delay: the editor side calls [`Readiness::mark_ready`] when it can accept
//! content, and bootstrap awaits it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use note_sync_core::models::{Fragment, NoteId};
use note_sync_core::reconcile::select_latest_readable;

use crate::gateway::{GatewayResult, PersistenceGateway};

/// The live editing surface, as seen by this crate.
///
/// Implemented by whatever hosts the editor: a UI bridge, a file, a test
/// recorder. Calls are synchronous.
pub trait EditorSurface: Send + Sync {
    /// Replaces the editor's document.
    fn set_content(&self, content: &str);
}

/// One-shot "editor is ready" signal.
///
/// Cloned handles share state; once marked ready it stays ready.
#[derive(Clone, Debug)]
pub struct Readiness {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// A signal that is already set.
    pub fn ready() -> Self {
        let signal = Self::new();
        signal.mark_ready();
        signal
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`mark_ready`](Self::mark_ready) has been called.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

/// What bootstrap did to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The editor received the content of `fragment_id`.
    Seeded { fragment_id: String, content: String },
    /// No usable fragment; the editor keeps its default empty state.
    Empty,
    /// This reconciler already seeded the editor.
    AlreadySeeded,
}

/// Selects and applies a note's initial content.
pub struct BootstrapReconciler {
    gateway: Arc<dyn PersistenceGateway>,
    seeded: AtomicBool,
}

impl BootstrapReconciler {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            seeded: AtomicBool::new(false),
        }
    }

    /// Fetches a note's fragments and returns the most recent readable one.
    pub async fn select(&self, note_id: NoteId) -> GatewayResult<Option<Fragment>> {
        let fragments = self.gateway.list_fragments(note_id).await?;
        debug!(note_id, count = fragments.len(), "fetched fragments");
        Ok(select_latest_readable(&fragments).cloned())
    }

    /// Seeds `editor` with the note's latest content once it is ready.
    pub async fn bootstrap(
        &self,
        note_id: NoteId,
        editor: &dyn EditorSurface,
        ready: &Readiness,
    ) -> GatewayResult<BootstrapOutcome> {
        if self.seeded.load(Ordering::SeqCst) {
            return Ok(BootstrapOutcome::AlreadySeeded);
        }

        let Some(fragment) = self.select(note_id).await? else {
            debug!(note_id, "no readable fragments; leaving editor empty");
            return Ok(BootstrapOutcome::Empty);
        };
        let content = fragment.content.text().unwrap_or_default().to_string();

        ready.wait().await;
        if self.seeded.swap(true, Ordering::SeqCst) {
            return Ok(BootstrapOutcome::AlreadySeeded);
        }
        editor.set_content(&content);
        info!(note_id, fragment = %fragment.id, "editor seeded");

        Ok(BootstrapOutcome::Seeded {
            fragment_id: fragment.id,
            content,
        })
    }
}
