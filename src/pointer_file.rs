//! File-backed [`PointerStore`].
//!
//! Pointers are kept as a flat JSON object (`{"lastBlockId-7": "7-ab12…"}`)
//! so they survive across CLI invocations. The whole map is cached in
//! memory and rewritten on every `set` through a temp file plus rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};

use note_sync_core::pointer::PointerStore;

pub struct FilePointerStore {
    path: PathBuf,
    slots: Mutex<BTreeMap<String, String>>,
}

impl FilePointerStore {
    /// Opens the pointer file, starting empty if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let slots = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read pointer file: {}", path.display()))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid pointer file: {}", path.display()))?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            slots: Mutex::new(slots),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, slots: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(slots)?)?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to write pointer file: {}", self.path.display()))?;
        Ok(())
    }
}

impl PointerStore for FilePointerStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slots.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.insert(key.to_string(), value.to_string());
        self.persist(&slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use note_sync_core::pointer::pointer_key;
    use tempfile::TempDir;

    #[test]
    fn test_pointers_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("pointers.json");

        let store = FilePointerStore::open(&path).unwrap();
        assert_eq!(store.get(&pointer_key(1)).unwrap(), None);
        store.set(&pointer_key(1), "1-abc").unwrap();
        store.set(&pointer_key(2), "2-def").unwrap();
        store.set(&pointer_key(1), "1-xyz").unwrap();

        let reopened = FilePointerStore::open(&path).unwrap();
        assert_eq!(reopened.get("lastBlockId-1").unwrap().as_deref(), Some("1-xyz"));
        assert_eq!(reopened.get("lastBlockId-2").unwrap().as_deref(), Some("2-def"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pointers.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(FilePointerStore::open(&path).is_err());
    }

    #[test]
    fn test_empty_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pointers.json");
        std::fs::write(&path, "").unwrap();
        let store = FilePointerStore::open(&path).unwrap();
        assert_eq!(store.get("lastBlockId-1").unwrap(), None);
    }
}
