//! Type-aware fan-out from the global bus to per-owner queues.
//!
//! The [`Distributor`] is a [`ProducerConsumerWorker`] whose producer reads
//! the [`EventBus`] and whose consumer copies each event into every owner
//! queue subscribed to a supertype of the event's kind. The set of target
//! queues is cached per concrete kind; any subscription change drops the
//! cache.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use snowx_system::worker::ProducerConsumerWorker;
use tokio::sync::{Semaphore, mpsc};

use super::{Event, EventBus, EventKind};

struct Route {
    kinds: Vec<&'static EventKind>,
    tx: mpsc::Sender<Event>,
    queue: EventQueue,
}

#[derive(Default)]
struct Routes {
    queue_capacity: usize,
    by_owner: RwLock<HashMap<String, Route>>,
    cache: Mutex<HashMap<&'static EventKind, Vec<mpsc::Sender<Event>>>>,
}

impl Routes {
    fn targets(&self, kind: &'static EventKind) -> Vec<mpsc::Sender<Event>> {
        let mut cache = self.cache.lock();
        cache
            .entry(kind)
            .or_insert_with(|| {
                self.by_owner
                    .read()
                    .values()
                    .filter(|route| kind.is_any_of(&route.kinds))
                    .map(|route| route.tx.clone())
                    .collect()
            })
            .clone()
    }

    async fn fan_out(&self, event: Event) {
        let targets = self.targets(event.kind());
        join_all(targets.iter().map(|tx| tx.send(event.clone()))).await;
    }
}

/// Receiving end of one owner's filtered queue.
#[derive(Clone)]
pub struct EventQueue {
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Event>>>,
}

impl EventQueue {
    /// Receives the next routed event; `None` once the owner is unsubscribed
    /// and the queue is drained.
    pub async fn recv(&self) -> Option<Event> {
        self.rx.lock().await.recv().await
    }
}

/// Fan-out worker between the bus and owner queues.
pub struct Distributor {
    routes: Arc<Routes>,
    worker: ProducerConsumerWorker<Event>,
}

impl Distributor {
    /// Creates a stopped distributor reading from `bus`.
    ///
    /// `queue_capacity` bounds each owner queue and `buffer_capacity` bounds
    /// the worker's in-flight fan-outs; `0` means unbounded for both.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, queue_capacity: usize, buffer_capacity: usize) -> Self {
        let routes = Arc::new(Routes {
            queue_capacity: if queue_capacity == 0 {
                Semaphore::MAX_PERMITS
            } else {
                queue_capacity
            },
            ..Routes::default()
        });

        let consumer_routes = Arc::clone(&routes);
        let worker = ProducerConsumerWorker::new(
            Arc::new(move || {
                let bus = Arc::clone(&bus);
                async move { bus.recv().await }.boxed()
            }),
            Arc::new(move |event: Event| {
                let routes = Arc::clone(&consumer_routes);
                async move { routes.fan_out(event).await }.boxed()
            }),
            buffer_capacity,
        );

        Self { routes, worker }
    }

    /// Returns the queue of `owner`, creating it filtered to `kinds` and
    /// their subtypes.
    ///
    /// An owner that already has a queue gets that queue back; `kinds` is
    /// ignored until the owner is unsubscribed.
    pub fn subscribe(&self, owner: &str, kinds: Vec<&'static EventKind>) -> EventQueue {
        let mut by_owner = self.routes.by_owner.write();
        if let Some(route) = by_owner.get(owner) {
            tracing::debug!(owner, "distributor queue reused");
            return route.queue.clone();
        }

        let (tx, rx) = mpsc::channel(self.routes.queue_capacity);
        let queue = EventQueue {
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        };
        by_owner.insert(
            owner.to_string(),
            Route {
                kinds,
                tx,
                queue: queue.clone(),
            },
        );
        drop(by_owner);

        self.routes.cache.lock().clear();
        tracing::debug!(owner, "distributor queue created");
        queue
    }

    /// Releases the queue of `owner`. Returns false if there was none.
    pub fn unsubscribe(&self, owner: &str) -> bool {
        let removed = self.routes.by_owner.write().remove(owner).is_some();
        if removed {
            self.routes.cache.lock().clear();
            tracing::debug!(owner, "distributor queue released");
        }
        removed
    }

    /// Returns true if `owner` has a queue.
    #[must_use]
    pub fn is_subscribed(&self, owner: &str) -> bool {
        self.routes.by_owner.read().contains_key(owner)
    }

    /// Owners with a queue, sorted.
    #[must_use]
    pub fn owners(&self) -> Vec<String> {
        let mut owners: Vec<String> = self.routes.by_owner.read().keys().cloned().collect();
        owners.sort_unstable();
        owners
    }

    /// Releases every queue.
    pub fn clear(&self) {
        self.routes.by_owner.write().clear();
        self.routes.cache.lock().clear();
    }

    /// Returns true while events are being distributed.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// Starts distributing events.
    pub fn start(&self) {
        if self.worker.is_running() {
            tracing::warn!("Distributor is already running.");
            return;
        }
        self.worker.start();
        tracing::info!("Distributor started.");
    }

    /// Stops distributing and releases every queue.
    pub async fn stop(&self, force: bool) {
        if !self.worker.is_running() {
            tracing::warn!("Distributor is not running.");
            return;
        }
        self.worker.stop(force).await;
        self.clear();
        tracing::info!(force, "Distributor stopped.");
    }
}

impl core::fmt::Debug for Distributor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Distributor")
            .field("owners", &self.owners())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::kind::BASE_EVENT;
    use core::time::Duration;

    static MESSAGE: EventKind = EventKind::new("DistMessage", &BASE_EVENT);
    static GROUP: EventKind = EventKind::new("DistGroupMessage", &MESSAGE);
    static NOTICE: EventKind = EventKind::new("DistNotice", &BASE_EVENT);

    async fn next(queue: &EventQueue) -> Option<Event> {
        tokio::time::timeout(Duration::from_millis(50), queue.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn routes_subtypes_to_supertype_subscribers() {
        let bus = Arc::new(EventBus::new(16));
        let distributor = Distributor::new(Arc::clone(&bus), 16, 16);
        let messages = distributor.subscribe("chat", vec![&MESSAGE]);
        let notices = distributor.subscribe("audit", vec![&NOTICE]);
        distributor.start();

        bus.publish(Event::custom(&GROUP, "hi")).await;

        let delivered = next(&messages).await.expect("subtype reaches supertype queue");
        assert_eq!(delivered.kind(), &GROUP);
        assert!(next(&notices).await.is_none());

        distributor.stop(false).await;
        assert!(distributor.owners().is_empty());
    }

    #[tokio::test]
    async fn cache_is_dropped_when_subscriptions_change() {
        let bus = Arc::new(EventBus::new(16));
        let distributor = Distributor::new(Arc::clone(&bus), 16, 16);
        distributor.start();

        let first = distributor.subscribe("a", vec![&NOTICE]);
        bus.publish(Event::custom(&NOTICE, ())).await;
        assert!(next(&first).await.is_some());

        let second = distributor.subscribe("b", vec![&BASE_EVENT]);
        bus.publish(Event::custom(&NOTICE, ())).await;
        assert!(next(&first).await.is_some());
        assert!(next(&second).await.is_some());

        assert!(distributor.unsubscribe("a"));
        assert!(!distributor.unsubscribe("a"));
        distributor.stop(true).await;
    }

    #[tokio::test]
    async fn subscribing_twice_keeps_the_first_queue() {
        let bus = Arc::new(EventBus::new(16));
        let distributor = Distributor::new(Arc::clone(&bus), 16, 16);
        distributor.start();

        let first = distributor.subscribe("chat", vec![&MESSAGE]);
        let again = distributor.subscribe("chat", vec![&NOTICE]);
        assert_eq!(distributor.owners(), ["chat"]);

        bus.publish(Event::custom(&NOTICE, ())).await;
        assert!(next(&again).await.is_none());

        bus.publish(Event::custom(&MESSAGE, ())).await;
        assert!(next(&first).await.is_some());

        bus.publish(Event::custom(&MESSAGE, ())).await;
        assert!(next(&again).await.is_some());

        distributor.stop(false).await;
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let bus = Arc::new(EventBus::new(4));
        let distributor = Distributor::new(bus, 4, 4);
        distributor.stop(false).await;
        distributor.start();
        distributor.start();
        assert!(distributor.is_running());
        distributor.stop(false).await;
        assert!(!distributor.is_running());
    }
}
