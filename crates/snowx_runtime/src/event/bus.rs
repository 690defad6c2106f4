//! The single bounded event queue every callback publishes to.

use tokio::sync::{Mutex, Semaphore, mpsc};

use super::{Event, Output};

/// Global bounded multi-producer queue of [`Event`]s.
///
/// Publishing waits while the queue is full. The distributor is the only
/// reader in a running host.
pub struct EventBus {
    tx: mpsc::Sender<Event>,
    rx: Mutex<mpsc::Receiver<Event>>,
}

impl EventBus {
    /// Creates a bus holding up to `capacity` events (`0` for unbounded).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            Semaphore::MAX_PERMITS
        } else {
            capacity
        };
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Publishes one event, waiting for room.
    pub async fn publish(&self, event: impl Into<Event>) {
        // The receiver lives as long as the bus, so the channel never closes.
        let _ = self.tx.send(event.into()).await;
    }

    /// Publishes one event without waiting; returns false if the bus is full.
    pub fn try_publish(&self, event: impl Into<Event>) -> bool {
        self.tx.try_send(event.into()).is_ok()
    }

    /// Publishes every event of `output`, in order.
    pub async fn publish_output(&self, output: Output) {
        for event in output.into_events() {
            self.publish(event).await;
        }
    }

    /// Receives the next event.
    pub async fn recv(&self) -> Option<Event> {
        self.rx.lock().await.recv().await
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Returns true if no event is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("len", &self.len())
            .field("capacity", &self.tx.max_capacity())
            .finish()
    }
}
