//! Durable mirror of the save queue and per-project state snapshots.
//!
//! Architecture:
//! ```text
//! ┌──────────────┐   pending queue    ┌───────────────┐
//! │  SaveQueue   │ ─────────────────► │ OfflineStore  │
//! │ (in-memory)  │   state snapshots  │ (best-effort) │
//! └──────────────┘                    └───────┬───────┘
//!                                             │ dyn KeyValue
//!                               ┌─────────────┴─────────────┐
//!                               │ "savequeue/pending"        │
//!                               │   — full serialized queue  │
//!                               │ "savequeue/snapshot/<id>"  │
//!                               │   — one state per project  │
//!                               └───────────────────────────┘
//! ```
//!
//! Every operation is total: with no backing store configured, reads return
//! empty/absent and writes are no-ops, and the queue keeps working purely
//! in-memory for the lifetime of the process. Backend failures and corrupt
//! payloads are logged and swallowed, never propagated.

pub mod kv;
pub mod rocks;

pub use kv::{KeyValue, KvError, MemoryKv};
pub use rocks::{RocksConfig, RocksKv};

use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

use crate::diff::StateMap;
use crate::queue::SaveJob;

/// Fixed key holding the serialized pending queue.
pub const QUEUE_KEY: &str = "savequeue/pending";

/// Key prefix for per-project state snapshots.
pub const SNAPSHOT_PREFIX: &str = "savequeue/snapshot/";

/// Best-effort durable storage for the pending queue and snapshots.
///
/// Cloning is cheap; clones share the same backend.
#[derive(Clone)]
pub struct OfflineStore {
    kv: Option<Arc<dyn KeyValue>>,
}

impl OfflineStore {
    /// Store backed by the given key/value backend.
    pub fn new(kv: Arc<dyn KeyValue>) -> Self {
        Self { kv: Some(kv) }
    }

    /// Store for environments with no durable storage at all; every read
    /// returns empty/absent and every write is a no-op.
    pub fn disabled() -> Self {
        Self { kv: None }
    }

    /// Store backed by a fresh in-memory map (per-process durability only).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKv::new()))
    }

    /// Whether a backend is configured at all.
    pub fn is_durable(&self) -> bool {
        self.kv.is_some()
    }

    /// Load the persisted pending queue.
    ///
    /// Returns an empty queue if storage is absent, empty, or holds data
    /// that does not decode as a job sequence (logged as a warning).
    pub fn load_queue(&self) -> VecDeque<SaveJob> {
        let Some(kv) = &self.kv else {
            return VecDeque::new();
        };
        let Some(bytes) = kv.get(QUEUE_KEY) else {
            return VecDeque::new();
        };
        match serde_json::from_slice(&bytes) {
            Ok(queue) => queue,
            Err(e) => {
                log::warn!("discarding corrupt pending queue: {e}");
                VecDeque::new()
            }
        }
    }

    /// Best-effort write of the full queue under [`QUEUE_KEY`].
    pub fn persist_queue(&self, queue: &VecDeque<SaveJob>) {
        let Some(kv) = &self.kv else { return };
        match serde_json::to_vec(queue) {
            Ok(bytes) => {
                if let Err(e) = kv.set(QUEUE_KEY, &bytes) {
                    log::warn!("failed to persist pending queue: {e}");
                }
            }
            Err(e) => log::warn!("failed to serialize pending queue: {e}"),
        }
    }

    /// Best-effort write of a project's latest materialized state.
    pub fn save_snapshot(&self, project_id: Uuid, state: &StateMap) {
        let Some(kv) = &self.kv else { return };
        match serde_json::to_vec(state) {
            Ok(bytes) => {
                if let Err(e) = kv.set(&Self::snapshot_key(project_id), &bytes) {
                    log::warn!("failed to persist snapshot for project {project_id}: {e}");
                }
            }
            Err(e) => log::warn!("failed to serialize snapshot for project {project_id}: {e}"),
        }
    }

    /// Load a project's last persisted state, `None` if absent or unreadable.
    pub fn load_snapshot(&self, project_id: Uuid) -> Option<StateMap> {
        let kv = self.kv.as_ref()?;
        let bytes = kv.get(&Self::snapshot_key(project_id))?;
        match serde_json::from_slice(&bytes) {
            Ok(state) => Some(state),
            Err(e) => {
                log::warn!("discarding corrupt snapshot for project {project_id}: {e}");
                None
            }
        }
    }

    /// Remove the persisted queue (external teardown).
    pub fn clear_queue(&self) {
        let Some(kv) = &self.kv else { return };
        if let Err(e) = kv.remove(QUEUE_KEY) {
            log::warn!("failed to clear pending queue: {e}");
        }
    }

    /// Remove a project's snapshot (external teardown, e.g. project deletion).
    pub fn clear_snapshot(&self, project_id: Uuid) {
        let Some(kv) = &self.kv else { return };
        if let Err(e) = kv.remove(&Self::snapshot_key(project_id)) {
            log::warn!("failed to clear snapshot for project {project_id}: {e}");
        }
    }

    fn snapshot_key(project_id: Uuid) -> String {
        format!("{SNAPSHOT_PREFIX}{project_id}")
    }
}
