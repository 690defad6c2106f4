//! Bounded producer/consumer pipeline with graceful and forced shutdown.
//!
//! A [`ProducerConsumerWorker`] runs two tasks:
//!
//! - the **producer loop** repeatedly awaits the producer function. Every
//!   `Some(item)` spawns a consumer task for that item and enqueues the task
//!   handle on a bounded queue (the producer waits while the queue is full).
//!   `None` results are skipped.
//! - the **consumer loop** dequeues task handles and awaits them one by one,
//!   in the order they were enqueued.
//!
//! Consumer task bodies run concurrently with each other; only their joins
//! are ordered.
//!
//! # Shutdown
//!
//! - **Graceful** ([`stop(false)`](ProducerConsumerWorker::stop)): waits until
//!   the producer is not in the middle of enqueueing, pushes a sentinel so the
//!   consumer loop drains what is already queued and exits, then cancels the
//!   producer loop.
//! - **Forced** ([`stop(true)`](ProducerConsumerWorker::stop)): cancels both
//!   loops immediately.
//!
//! Either way, consumer tasks still sitting in the queue afterwards are
//! cancelled.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::lock::CompletionLock;

/// Async function yielding the next item, or `None` to skip a round.
pub type Producer<T> = Arc<dyn Fn() -> BoxFuture<'static, Option<T>> + Send + Sync>;

/// Async function handling one produced item.
pub type Consumer<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// A spawned consumer; cancelled if dropped before completion.
struct ConsumerTask(JoinHandle<()>);

impl Drop for ConsumerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

type Slot = Option<ConsumerTask>;

struct Running {
    run: Arc<AtomicBool>,
    lock: CompletionLock,
    queue: mpsc::Sender<Slot>,
    pending: Arc<tokio::sync::Mutex<mpsc::Receiver<Slot>>>,
    producer_loop: JoinHandle<()>,
    consumer_loop: JoinHandle<()>,
}

/// Generic bounded async pipeline.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use futures::FutureExt;
/// use snowx_system::worker::ProducerConsumerWorker;
///
/// # tokio_test::block_on(async {
/// let (tx, rx) = tokio::sync::mpsc::channel::<u32>(8);
/// let rx = Arc::new(tokio::sync::Mutex::new(rx));
///
/// let worker = ProducerConsumerWorker::new(
///     Arc::new(move || {
///         let rx = Arc::clone(&rx);
///         async move { rx.lock().await.recv().await }.boxed()
///     }),
///     Arc::new(|item: u32| async move { let _ = item * 2; }.boxed()),
///     16,
/// );
///
/// worker.start();
/// tx.send(21).await.unwrap();
/// worker.stop(false).await;
/// assert!(!worker.is_running());
/// # });
/// ```
pub struct ProducerConsumerWorker<T> {
    producer: Producer<T>,
    consumer: Consumer<T>,
    capacity: usize,
    running: Mutex<Option<Running>>,
}

impl<T: Send + 'static> ProducerConsumerWorker<T> {
    /// Creates a stopped worker.
    ///
    /// `capacity` bounds the queue of spawned-but-unjoined consumer tasks;
    /// `0` means unbounded.
    #[must_use]
    pub fn new(producer: Producer<T>, consumer: Consumer<T>, capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            Semaphore::MAX_PERMITS
        } else {
            capacity
        };
        Self {
            producer,
            consumer,
            capacity,
            running: Mutex::new(None),
        }
    }

    /// Returns true between [`start`](Self::start) and [`stop`](Self::stop).
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawns the producer and consumer loops. No-op if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }

        let run = Arc::new(AtomicBool::new(true));
        let lock = CompletionLock::new();
        let (queue, pending) = mpsc::channel::<Slot>(self.capacity);
        let pending = Arc::new(tokio::sync::Mutex::new(pending));

        let producer_loop = tokio::spawn(produce(
            Arc::clone(&run),
            Arc::clone(&self.producer),
            Arc::clone(&self.consumer),
            lock.clone(),
            queue.clone(),
        ));
        let consumer_loop = tokio::spawn(consume(Arc::clone(&run), Arc::clone(&pending)));

        *running = Some(Running {
            run,
            lock,
            queue,
            pending,
            producer_loop,
            consumer_loop,
        });
    }

    /// Stops the worker. No-op if not running.
    pub async fn stop(&self, force: bool) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let Running {
            run,
            lock,
            queue,
            pending,
            producer_loop,
            consumer_loop,
        } = running;

        run.store(false, Ordering::Release);

        if force {
            consumer_loop.abort();
        } else {
            lock.wait().await;
            // Wakes a consumer loop parked on an empty queue.
            let _ = queue.send(None).await;
        }
        producer_loop.abort();

        let _ = producer_loop.await;
        let _ = consumer_loop.await;

        let mut leftovers = pending.lock().await;
        while let Ok(slot) = leftovers.try_recv() {
            if let Some(mut task) = slot {
                task.0.abort();
                let _ = (&mut task.0).await;
            }
        }
    }
}

impl<T> Drop for ProducerConsumerWorker<T> {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.producer_loop.abort();
            running.consumer_loop.abort();
        }
    }
}

async fn produce<T: Send + 'static>(
    run: Arc<AtomicBool>,
    producer: Producer<T>,
    consumer: Consumer<T>,
    lock: CompletionLock,
    queue: mpsc::Sender<Slot>,
) {
    while run.load(Ordering::Acquire) {
        let Some(item) = producer().await else {
            tokio::task::yield_now().await;
            continue;
        };

        let _guard = lock.enter();
        let task = ConsumerTask(tokio::spawn(consumer(item)));
        if queue.send(Some(task)).await.is_err() {
            break;
        }
    }
}

async fn consume(run: Arc<AtomicBool>, pending: Arc<tokio::sync::Mutex<mpsc::Receiver<Slot>>>) {
    let mut pending = pending.lock_owned().await;
    loop {
        if !run.load(Ordering::Acquire) && pending.is_empty() {
            break;
        }

        match pending.recv().await {
            Some(Some(mut task)) => {
                if let Err(err) = (&mut task.0).await
                    && err.is_panic()
                {
                    tracing::error!("consumer task panicked");
                }
            }
            Some(None) => {}
            None => break,
        }
    }
}
