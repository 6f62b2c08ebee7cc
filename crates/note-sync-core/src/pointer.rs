//! Client save pointer slot.
//!
//! The save coordinator remembers, per note, the fragment it last wrote so
//! the next save updates that fragment in place. The remembered ids live in
//! a durable key-value slot keyed `lastBlockId-<noteId>`. The slot is a
//! trait so the CLI can back it with a file and tests with a map.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;

use crate::models::NoteId;

/// Key under which a note's last fragment id is stored.
pub fn pointer_key(note_id: NoteId) -> String {
    format!("lastBlockId-{}", note_id)
}

/// Durable string key-value slot.
///
/// Calls are synchronous, like browser local storage. Implementations
/// must be `Send + Sync`; the coordinator shares one across tasks.
pub trait PointerStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory [`PointerStore`] for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryPointerStore {
    slots: RwLock<HashMap<String, String>>,
}

impl MemoryPointerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored pointers.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PointerStore for MemoryPointerStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_key_format() {
        assert_eq!(pointer_key(42), "lastBlockId-42");
    }

    #[test]
    fn test_memory_store_overwrites() {
        let store = MemoryPointerStore::new();
        assert!(store.get("k").unwrap().is_none());
        store.set("k", "a").unwrap();
        store.set("k", "b").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("b"));
        assert_eq!(store.len(), 1);
    }
}
