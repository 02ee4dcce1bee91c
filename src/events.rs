//! Purchase outcome notifications.
//!
//! There is no process-global notification center: the bus is an explicitly
//! constructed broadcast channel the coordinator and store write to and any
//! number of collaborators (UI, analytics) subscribe to. Delivery is
//! best-effort fan-out: slow subscribers can lag and miss events, nothing is
//! persisted.

use tokio::sync::broadcast;

/// A purchase outcome, delivered to every subscriber.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A product identifier became entitled (verification succeeded and the
    /// flag was durably recorded). Emitted once per newly entitled product.
    PurchaseCompleted { product_id: String },

    /// A transaction failed for a reason other than user cancellation.
    PurchaseFailed {
        product_id: String,
        error_code: Option<i64>,
    },
}

/// Broadcast fan-out for [`StoreEvent`]s.
///
/// Cloning the bus clones the sender; all clones feed the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// Create a bus that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a new subscriber. Only events emitted after this call are
    /// delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers. A bus with no subscribers
    /// drops the event silently.
    pub fn emit(&self, event: StoreEvent) {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!("event dropped (no subscribers): {:?}", e.0);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(32)
    }
}
