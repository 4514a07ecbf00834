//! Durable key/value collaborator interface.
//!
//! The save queue needs only three operations over string keys: `get`, `set`,
//! `remove`. Anything that can do that durably can back the queue; the crate
//! ships [`MemoryKv`] for tests and non-durable contexts and a RocksDB
//! implementation in [`super::rocks`].

use std::collections::HashMap;
use std::sync::Mutex;

/// Key/value backend errors.
#[derive(Debug, Clone)]
pub enum KvError {
    /// The backing store failed (I/O error, quota exceeded, ...).
    Backend(String),
    /// A stored value could not be decoded.
    Corrupt(String),
}

impl std::fmt::Display for KvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KvError::Backend(e) => write!(f, "Storage backend error: {e}"),
            KvError::Corrupt(e) => write!(f, "Corrupt stored value: {e}"),
        }
    }
}

impl std::error::Error for KvError {}

/// Minimal durable key/value store over string keys.
pub trait KeyValue: Send + Sync {
    /// Read a value, `None` if absent (or unreadable — implementations log).
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Write a value.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError>;

    /// Remove a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), KvError>;
}

/// In-memory key/value store.
///
/// Not durable across processes; used by tests and by hosts that run without
/// local storage for the lifetime of the process.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValue for MemoryKv {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        self.lock().insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), KvError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_kv_set_get() {
        let kv = MemoryKv::new();
        assert!(kv.get("missing").is_none());

        kv.set("a", b"value").unwrap();
        assert_eq!(kv.get("a"), Some(b"value".to_vec()));
        assert_eq!(kv.len(), 1);
    }

    #[test]
    fn test_memory_kv_overwrite() {
        let kv = MemoryKv::new();
        kv.set("a", b"one").unwrap();
        kv.set("a", b"two").unwrap();
        assert_eq!(kv.get("a"), Some(b"two".to_vec()));
        assert_eq!(kv.len(), 1);
    }

    #[test]
    fn test_memory_kv_remove() {
        let kv = MemoryKv::new();
        kv.set("a", b"value").unwrap();
        kv.remove("a").unwrap();
        assert!(kv.get("a").is_none());

        // Removing an absent key is fine.
        kv.remove("a").unwrap();
        assert!(kv.is_empty());
    }

    #[test]
    fn test_kv_error_display() {
        let err = KvError::Backend("disk full".into());
        assert!(err.to_string().contains("disk full"));

        let err = KvError::Corrupt("bad json".into());
        assert!(err.to_string().contains("Corrupt"));
    }
}
