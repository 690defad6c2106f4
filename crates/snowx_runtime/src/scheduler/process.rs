use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use hashbrown::HashMap;
use parking_lot::Mutex;
use snowx_system::worker::ProducerConsumerWorker;

use super::SchedulerItem;
use crate::callback::{CallbackItem, Context};
use crate::event::{Event, EventKind};
use crate::runtime::Services;

/// Subscribed callbacks plus a per-kind cache of which of them match.
struct Handlers {
    owner: String,
    services: Services,
    subscribed: Vec<(&'static EventKind, Arc<CallbackItem>)>,
    matches: Mutex<HashMap<&'static EventKind, Vec<Arc<CallbackItem>>>>,
}

impl Handlers {
    fn matching(&self, kind: &'static EventKind) -> Vec<Arc<CallbackItem>> {
        self.matches
            .lock()
            .entry(kind)
            .or_insert_with(|| {
                self.subscribed
                    .iter()
                    .filter(|(subscription, _)| kind.is_a(subscription))
                    .map(|(_, item)| Arc::clone(item))
                    .collect()
            })
            .clone()
    }

    async fn dispatch(&self, event: Event) {
        let handlers = self.matching(event.kind());
        join_all(handlers.iter().map(|item| {
            item.invoke(Context::new(
                &self.owner,
                Some(event.clone()),
                self.services.clone(),
            ))
        }))
        .await;
    }
}

/// Runs an owner's process callbacks for every event routed to it.
///
/// On start the item subscribes a distributor queue to the union of its
/// callbacks' kinds, then a worker pulls events from that queue and invokes
/// every callback subscribed to a supertype of each event's kind.
pub struct ProcessScheduling {
    owner: String,
    callbacks: Vec<Arc<CallbackItem>>,
    services: Services,
    worker: Option<ProducerConsumerWorker<Event>>,
}

#[async_trait]
impl SchedulerItem for ProcessScheduling {
    type Config = ();
    type Output = ();

    fn create(
        owner: &str,
        callbacks: Vec<Arc<CallbackItem>>,
        services: Services,
        _config: &(),
    ) -> Self {
        Self {
            owner: owner.to_string(),
            callbacks,
            services,
            worker: None,
        }
    }

    fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }

        let subscribed: Vec<(&'static EventKind, Arc<CallbackItem>)> = self
            .callbacks
            .iter()
            .filter_map(|item| Some((item.subscription()?, Arc::clone(item))))
            .collect();
        if subscribed.is_empty() {
            return;
        }

        let mut kinds: Vec<&'static EventKind> = Vec::new();
        for (kind, _) in &subscribed {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }

        let queue = self.services.distributor().subscribe(&self.owner, kinds);
        let handlers = Arc::new(Handlers {
            owner: self.owner.clone(),
            services: self.services.clone(),
            subscribed,
            matches: Mutex::new(HashMap::new()),
        });

        let worker = ProducerConsumerWorker::new(
            Arc::new(move || {
                let queue = queue.clone();
                async move {
                    match queue.recv().await {
                        Some(event) => Some(event),
                        // Released queue: park until the worker is stopped.
                        None => futures::future::pending().await,
                    }
                }
                .boxed()
            }),
            Arc::new(move |event: Event| {
                let handlers = Arc::clone(&handlers);
                async move { handlers.dispatch(event).await }.boxed()
            }),
            self.services.limits().process_event_queue,
        );
        worker.start();
        self.worker = Some(worker);
    }

    async fn stop(&mut self, force: bool) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.stop(force).await;
        self.services.distributor().unsubscribe(&self.owner);
    }
}
