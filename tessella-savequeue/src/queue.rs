//! Save queue orchestrator: serial, diff-only delivery of editor saves.
//!
//! Owns the in-memory queue of pending writes and drives it through the
//! external collaborators:
//!
//! ```text
//! editor ──enqueue_save──► ┌───────────────┐       head job, serially
//!                          │   SaveQueue   │ ─────────────────────────►
//!   diff + coalesce        │  (FIFO queue) │   RemotePersist collaborator
//!                          └───┬───────┬───┘
//!            durable mirror    │       │ online? healthy?
//!                              ▼       ▼
//!                      OfflineStore   ConnectivityMonitor + HealthGate
//! ```
//!
//! Queue state machine (per queue, not per job):
//! ```text
//! Idle ──(non-empty enqueue)──► Processing
//! Processing ──(queue empty)──► Idle
//! Processing ──(offline)──────► WaitingOffline ──(reconnect)──► Processing
//! Processing ──(unhealthy or ──► WaitingRetry ──(fixed delay)─► Processing
//!               send failed)
//! ```
//!
//! Delivery guarantees:
//!
//! | Invariant            | Mechanism                                     |
//! |----------------------|-----------------------------------------------|
//! | Single-flight        | one `tokio::sync::Mutex` pass guard            |
//! | ≤1 job per project   | enqueue coalesces into the existing job        |
//! | Strict FIFO          | merge never re-orders; only success pops head  |
//! | Crash survival       | mirror written to OfflineStore under the queue |
//! |                      | lock, so storage never reorders behind memory  |
//! | No job ever dropped  | failed sends keep the head verbatim, unbounded |
//! |                      | retries with fixed backoff                     |
//!
//! Retries are deliberately fixed-delay, not exponential: an autosave queue
//! favors eventual delivery over bounded latency. The one accepted data-loss
//! mode is the durable store being wiped underneath the process.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::connectivity::ConnectivityMonitor;
use crate::diff::{self, StateMap};
use crate::remote::{HealthGate, RemotePersist};
use crate::storage::OfflineStore;

/// One pending write for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveJob {
    /// Target document; unique key within the queue.
    pub project_id: Uuid,
    /// Top-level keys changed since the last snapshot, with their new values.
    pub diff: StateMap,
    /// Epoch milliseconds of the last merge into this job.
    pub timestamp: u64,
}

impl SaveJob {
    fn new(project_id: Uuid, diff: StateMap) -> Self {
        Self {
            project_id,
            diff,
            timestamp: epoch_millis(),
        }
    }

    /// Merge freshly changed keys into this job and bump its timestamp.
    ///
    /// The bump is strictly monotonic even when two merges land within the
    /// same millisecond, so a merge is always observable.
    fn coalesce(&mut self, overlay: &StateMap) {
        diff::merge_into(&mut self.diff, overlay);
        self.timestamp = epoch_millis().max(self.timestamp + 1);
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// What the queue is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePhase {
    /// Queue is empty.
    Idle,
    /// A pass is sending the head job.
    Processing,
    /// Offline; resumes on the next connectivity-restored event.
    WaitingOffline,
    /// Backend unhealthy or last send failed; retry timer armed.
    WaitingRetry,
}

/// Queue timing configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Delay before retrying after an unhealthy probe or a failed send.
    pub retry_delay: Duration,
    /// Delay between successive jobs, to avoid bursting the backend.
    pub inter_job_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            inter_job_delay: Duration::from_millis(100),
        }
    }
}

impl QueueConfig {
    /// Config for testing (tight delays).
    pub fn for_testing() -> Self {
        Self {
            retry_delay: Duration::from_millis(20),
            inter_job_delay: Duration::from_millis(1),
        }
    }
}

/// A cancellable one-shot timer driving a deferred queue pass.
///
/// Replacing or dropping it aborts the pending task, so shutdown and tests
/// never race a wall-clock delay.
struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    fn after<F>(delay: Duration, job: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        });
        Self { handle }
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Outcome of one processing pass over the queue head.
enum PassOutcome {
    /// Nothing queued.
    Empty,
    /// Connectivity is down; parked until reconnect.
    Offline,
    /// Health gate refused; retry later.
    Unhealthy,
    /// Head job delivered; `more` is whether jobs remain.
    Sent { more: bool },
    /// Send failed; head kept verbatim, retry later.
    Failed,
}

struct Inner {
    queue: StdMutex<VecDeque<SaveJob>>,
    store: OfflineStore,
    remote: Arc<dyn RemotePersist>,
    health: Arc<dyn HealthGate>,
    connectivity: ConnectivityMonitor,
    /// Single-flight pass guard: held for the duration of one pass.
    flight: AsyncMutex<()>,
    phase: watch::Sender<QueuePhase>,
    last_error: watch::Sender<Option<String>>,
    /// The queue's one pending timer (retry or inter-job delay).
    scheduled: StdMutex<Option<ScheduledTask>>,
    config: QueueConfig,
}

/// The editor save queue.
///
/// Constructed once per process and passed by handle to every call site;
/// cloning is cheap and all clones drive the same queue. Must be created
/// inside a tokio runtime (processing runs on spawned tasks).
#[derive(Clone)]
pub struct SaveQueue {
    inner: Arc<Inner>,
}

impl SaveQueue {
    /// Create a queue, restoring any pending jobs persisted by a previous
    /// process, and start watching for connectivity-restored events.
    pub fn new(
        store: OfflineStore,
        remote: Arc<dyn RemotePersist>,
        health: Arc<dyn HealthGate>,
        connectivity: ConnectivityMonitor,
        config: QueueConfig,
    ) -> Self {
        let restored = store.load_queue();
        if !restored.is_empty() {
            log::info!("restored {} pending save job(s) from storage", restored.len());
        }

        let (phase, _) = watch::channel(QueuePhase::Idle);
        let (last_error, _) = watch::channel(None);

        let inner = Arc::new(Inner {
            queue: StdMutex::new(restored),
            store,
            remote,
            health,
            connectivity,
            flight: AsyncMutex::new(()),
            phase,
            last_error,
            scheduled: StdMutex::new(None),
            config,
        });

        Inner::spawn_reconnect_watcher(&inner);

        let queue = Self { inner };
        if queue.queue_len() > 0 {
            queue.trigger();
        }
        queue
    }

    /// Queue the changes between `prev` and `next` for `project_id`.
    ///
    /// An empty diff is a silent no-op. Otherwise the diff is coalesced into
    /// the project's existing pending job or appended as a new one, the queue
    /// and the project snapshot are mirrored to storage, and processing is
    /// triggered asynchronously. Never blocks on the network and never
    /// returns an error; delivery failures surface via [`Self::last_error`].
    pub fn enqueue_save(&self, project_id: Uuid, prev: Option<&StateMap>, next: &StateMap) {
        let changed = diff::diff(prev, next);
        if !diff::has_changes(&changed) {
            return;
        }

        {
            // Mirror writes happen under the queue lock: concurrent enqueues
            // must not land their mirrors in storage out of order.
            let mut queue = self.inner.lock_queue();
            match queue.iter_mut().find(|job| job.project_id == project_id) {
                Some(job) => job.coalesce(&changed),
                None => queue.push_back(SaveJob::new(project_id, changed)),
            }
            self.inner.store.persist_queue(&queue);
            // Snapshot advances unconditionally, independent of remote
            // success, so the next diff is computed against what the queue
            // already knows.
            self.inner.store.save_snapshot(project_id, next);
        }

        self.trigger();
    }

    /// [`Self::enqueue_save`] with the stored snapshot as the baseline.
    ///
    /// This is the restart path: after a reload the caller has `next` but the
    /// last materialized state lives in the offline store.
    pub fn enqueue_from_snapshot(&self, project_id: Uuid, next: &StateMap) {
        let baseline = self.inner.store.load_snapshot(project_id);
        self.enqueue_save(project_id, baseline.as_ref(), next);
    }

    /// Run one processing pass if none is underway.
    ///
    /// Re-entrant calls return immediately; at most one pass (and therefore
    /// at most one remote persist call) runs at a time.
    pub async fn process_queue(&self) {
        Inner::process(&self.inner).await;
    }

    /// Drain the queue before the process may terminate.
    ///
    /// Waits for any in-flight pass to finish, cancels pending timers, then
    /// drives passes back-to-back (skipping the inter-job delay) until the
    /// queue is empty. Returns whether it ended up empty: `false` means the
    /// network or backend is still unavailable and pending jobs remain — by
    /// design there is no deadline escalation, the retry timer is simply
    /// re-armed in case the process lives on.
    pub async fn flush_queue(&self) -> bool {
        let inner = &self.inner;
        let _flight = inner.flight.lock().await;
        inner.cancel_scheduled();

        loop {
            match Inner::run_pass(inner).await {
                PassOutcome::Empty | PassOutcome::Sent { more: false } => return true,
                PassOutcome::Sent { more: true } => continue,
                PassOutcome::Offline => return false,
                PassOutcome::Unhealthy | PassOutcome::Failed => {
                    Inner::schedule_pass(inner, inner.config.retry_delay);
                    return false;
                }
            }
        }
    }

    /// Discard a project's pending job and snapshot (project teardown).
    ///
    /// Must not be issued concurrently with that project's in-flight send;
    /// the outcome of that race is best-effort (the send may still land).
    pub fn drop_project(&self, project_id: Uuid) {
        let mut queue = self.inner.lock_queue();
        queue.retain(|job| job.project_id != project_id);
        self.inner.store.persist_queue(&queue);
        self.inner.store.clear_snapshot(project_id);
    }

    /// Discard all pending jobs, in memory and in the durable mirror.
    pub fn clear(&self) {
        let mut queue = self.inner.lock_queue();
        queue.clear();
        self.inner.store.clear_queue();
    }

    /// Number of pending jobs.
    pub fn queue_len(&self) -> usize {
        self.inner.lock_queue().len()
    }

    /// Whether no jobs are pending.
    pub fn is_empty(&self) -> bool {
        self.inner.lock_queue().is_empty()
    }

    /// The pending (not yet delivered) diff for a project, if any.
    pub fn pending_diff(&self, project_id: Uuid) -> Option<StateMap> {
        self.inner
            .lock_queue()
            .iter()
            .find(|job| job.project_id == project_id)
            .map(|job| job.diff.clone())
    }

    /// Project IDs in delivery order.
    pub fn pending_projects(&self) -> Vec<Uuid> {
        self.inner.lock_queue().iter().map(|job| job.project_id).collect()
    }

    /// Current phase of the queue state machine.
    pub fn phase(&self) -> QueuePhase {
        *self.inner.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn watch_phase(&self) -> watch::Receiver<QueuePhase> {
        self.inner.phase.subscribe()
    }

    /// Most recent delivery error, cleared on the next successful send.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.borrow().clone()
    }

    /// Watch delivery errors (for UI feedback).
    pub fn watch_last_error(&self) -> watch::Receiver<Option<String>> {
        self.inner.last_error.subscribe()
    }

    /// The underlying offline store.
    pub fn store(&self) -> &OfflineStore {
        &self.inner.store
    }

    /// The connectivity signal this queue reacts to.
    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.inner.connectivity
    }

    /// Spawn an asynchronous processing trigger; never blocks the caller.
    fn trigger(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            Inner::process(&inner).await;
        });
    }
}

impl Inner {
    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<SaveJob>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_phase(&self, phase: QueuePhase) {
        self.phase.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }

    fn cancel_scheduled(&self) {
        let mut slot = self.scheduled.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = None;
    }

    /// Arm the queue's timer for a deferred pass, replacing any pending one.
    fn schedule_pass(inner: &Arc<Inner>, delay: Duration) {
        let weak = Arc::downgrade(inner);
        let task = ScheduledTask::after(delay, async move {
            if let Some(inner) = weak.upgrade() {
                Inner::process(&inner).await;
            }
        });
        let mut slot = inner.scheduled.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(task);
    }

    /// Re-trigger processing on every offline→online edge.
    fn spawn_reconnect_watcher(inner: &Arc<Inner>) {
        let weak = Arc::downgrade(inner);
        let mut rx = inner.connectivity.subscribe();
        tokio::spawn(async move {
            let mut was_online = *rx.borrow();
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                let reconnected = online && !was_online;
                was_online = online;
                if !reconnected {
                    continue;
                }
                let Some(inner) = weak.upgrade() else { break };
                log::debug!("connectivity restored, resuming save queue");
                Inner::process(&inner).await;
            }
        });
    }

    /// Run one guarded pass and arm any follow-up timer it calls for.
    async fn process(inner: &Arc<Inner>) {
        let Ok(_flight) = inner.flight.try_lock() else {
            // A pass is already in flight; it will handle the queue.
            return;
        };

        match Self::run_pass(inner).await {
            PassOutcome::Empty | PassOutcome::Offline | PassOutcome::Sent { more: false } => {}
            PassOutcome::Sent { more: true } => {
                Self::schedule_pass(inner, inner.config.inter_job_delay);
            }
            PassOutcome::Unhealthy | PassOutcome::Failed => {
                Self::schedule_pass(inner, inner.config.retry_delay);
            }
        }
    }

    /// One pass: gate checks, then attempt delivery of the head job.
    ///
    /// Caller must hold the flight guard.
    async fn run_pass(inner: &Arc<Inner>) -> PassOutcome {
        let head = inner.lock_queue().front().cloned();
        let Some(job) = head else {
            inner.set_phase(QueuePhase::Idle);
            return PassOutcome::Empty;
        };

        if !inner.connectivity.is_online() {
            inner.set_phase(QueuePhase::WaitingOffline);
            return PassOutcome::Offline;
        }

        if !inner.health.ensure_healthy().await {
            inner.set_phase(QueuePhase::WaitingRetry);
            return PassOutcome::Unhealthy;
        }

        inner.set_phase(QueuePhase::Processing);
        match inner.remote.persist(job.project_id, &job.diff).await {
            Ok(()) => {
                let more = {
                    let mut queue = inner.lock_queue();
                    Self::settle_delivered(&mut queue, &job);
                    inner.store.persist_queue(&queue);
                    !queue.is_empty()
                };
                inner.last_error.send_replace(None);
                if !more {
                    inner.set_phase(QueuePhase::Idle);
                }
                PassOutcome::Sent { more }
            }
            Err(err) => {
                log::warn!("save for project {} failed: {err}", job.project_id);
                inner.health.mark_unhealthy();
                inner.last_error.send_replace(Some(err.to_string()));
                inner.set_phase(QueuePhase::WaitingRetry);
                PassOutcome::Failed
            }
        }
    }

    /// Remove what `sent` delivered from the queue head.
    ///
    /// If an enqueue coalesced into the head while its diff was in flight
    /// (observable via the timestamp bump), only the keys that went out with
    /// their delivered values are dropped; anything merged since stays queued
    /// for the next pass.
    fn settle_delivered(queue: &mut VecDeque<SaveJob>, sent: &SaveJob) {
        let Some(head) = queue.front_mut() else { return };
        if head.project_id != sent.project_id {
            // The head was dropped (project teardown) while in flight.
            return;
        }
        if head.timestamp == sent.timestamp {
            queue.pop_front();
            return;
        }
        head.diff.retain(|key, value| sent.diff.get(key) != Some(value));
        if head.diff.is_empty() {
            queue.pop_front();
        }
    }
}
