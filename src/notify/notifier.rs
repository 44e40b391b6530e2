//! Notification transports.

use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicU32, Ordering};

use axerrno::{ax_err, AxResult};
use spin::RwLock;

use super::registration::ClientId;

/// Delivers a readiness notification to a registered client.
///
/// **Contract:**
/// - `notify()` is called from the timer callback and must never block.
/// - One call per firing. Whether repeated deliveries coalesce is up to the
///   transport.
pub trait ClientNotifier: Send + Sync {
    /// Tell `client` that a readiness event occurred.
    fn notify(&self, client: ClientId) -> AxResult;
}

/// A transport that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl ClientNotifier for NullNotifier {
    fn notify(&self, client: ClientId) -> AxResult {
        trace!("dropping notification for client {:?}", client);
        Ok(())
    }
}

/// Per-client pending notification counters.
///
/// Each delivery increments the client's counter. The client side drains it
/// with [`take`](Self::take), the way a signal handler would observe
/// pending signals.
pub struct SignalFlags {
    pending: RwLock<BTreeMap<ClientId, AtomicU32>>,
}

impl SignalFlags {
    /// Create an empty set of counters.
    pub fn new() -> Self {
        Self {
            pending: RwLock::new(BTreeMap::new()),
        }
    }

    /// Prepare a counter for `client` so that deliveries never allocate.
    pub fn register(&self, client: ClientId) {
        self.pending
            .write()
            .entry(client)
            .or_insert_with(|| AtomicU32::new(0));
    }

    /// Drop the counter for `client`.
    pub fn unregister(&self, client: ClientId) {
        self.pending.write().remove(&client);
    }

    /// Returns and clears the number of deliveries since the last call.
    pub fn take(&self, client: ClientId) -> u32 {
        self.pending
            .read()
            .get(&client)
            .map_or(0, |count| count.swap(0, Ordering::AcqRel))
    }

    /// Number of deliveries since the last `take`, without clearing.
    pub fn peek(&self, client: ClientId) -> u32 {
        self.pending
            .read()
            .get(&client)
            .map_or(0, |count| count.load(Ordering::Acquire))
    }
}

impl Default for SignalFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientNotifier for SignalFlags {
    fn notify(&self, client: ClientId) -> AxResult {
        let pending = self.pending.read();
        match pending.get(&client) {
            Some(count) => {
                count.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            None => ax_err!(NotFound, "client has no signal slot"),
        }
    }
}
