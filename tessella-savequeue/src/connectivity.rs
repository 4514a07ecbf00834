//! Online/offline signal for the save queue.
//!
//! A thin wrapper around a `tokio::sync::watch` channel of `bool`. The host
//! application feeds the signal (browser online events, a reachability probe,
//! whatever it has); the queue only ever reads the current value and reacts
//! to offline→online transitions.

use std::sync::Arc;
use tokio::sync::watch;

/// Current connectivity signal plus change notifications.
///
/// Cloning is cheap and all clones share the same signal.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    signal: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial signal value.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { signal: Arc::new(tx) }
    }

    /// Current signal value.
    pub fn is_online(&self) -> bool {
        *self.signal.borrow()
    }

    /// Update the signal. Setting the same value twice emits no event.
    pub fn set_online(&self, online: bool) {
        self.signal.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                log::debug!("connectivity changed: online={online}");
                *current = online;
                true
            }
        });
    }

    /// Subscribe to signal changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}
