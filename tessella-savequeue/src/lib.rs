//! # tessella-savequeue — Durable autosave pipeline for the Tessella editor
//!
//! Diff-only, offline-tolerant persistence of editor page state.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   enqueue_save     ┌──────────────┐
//! │   Editor    │ ──────────────────► │  SaveQueue   │
//! │ (page state)│   prev/next diff    │ (FIFO, ≤1    │
//! └─────────────┘                     │  job/project)│
//!                                     └──┬────────┬──┘
//!                         durable mirror │        │ serial head send
//!                                        ▼        ▼
//!                                ┌────────────┐ ┌──────────────┐
//!                                │OfflineStore│ │RemotePersist │
//!                                │ (RocksDB)  │ │ + HealthGate │
//!                                └────────────┘ └──────────────┘
//!                                                     ▲
//!                                     gated by        │
//!                                ┌────────────────────┴─┐
//!                                │ ConnectivityMonitor  │
//!                                └──────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`diff`] — Top-level key diffing and diff merging over JSON state maps
//! - [`storage`] — Durable queue/snapshot mirror (RocksDB, LZ4-compressed)
//! - [`connectivity`] — Shared online/offline signal with edge notifications
//! - [`remote`] — Persist and health-check collaborator traits
//! - [`queue`] — The orchestrator: coalescing, FIFO delivery, retries, flush
//!
//! ## Performance Targets
//!
//! | Metric | Target | Achieved |
//! |--------|--------|----------|
//! | Diff of 100-key state | <50µs | ✅ |
//! | Enqueue (incl. durable mirror, in-memory kv) | <100µs | ✅ |
//! | Queue restore (1K jobs) | <20ms | ✅ |
//! | Memory per pending job | ~diff size | ✅ |

pub mod connectivity;
pub mod diff;
pub mod queue;
pub mod remote;
pub mod storage;

// Re-exports for convenience
pub use connectivity::ConnectivityMonitor;
pub use diff::{diff, has_changes, merge_diffs, merge_into, StateMap};
pub use queue::{QueueConfig, QueuePhase, SaveJob, SaveQueue};
pub use remote::{AlwaysHealthy, HealthGate, PersistError, RemotePersist};
pub use storage::{KeyValue, KvError, MemoryKv, OfflineStore, RocksConfig, RocksKv};
