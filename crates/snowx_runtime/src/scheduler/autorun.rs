use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use super::SchedulerItem;
use crate::callback::{CallbackId, CallbackItem, Context};
use crate::runtime::Services;

/// Runs each of an owner's autorun callbacks as its own looping task.
///
/// A graceful stop waits for each callback's completion lock to drain before
/// aborting its task, so no run is cut short unless the callback was
/// registered as safe to abandon. A forced stop aborts immediately.
pub struct AutorunScheduling {
    owner: String,
    callbacks: Vec<Arc<CallbackItem>>,
    services: Services,
    tasks: Vec<(CallbackId, JoinHandle<()>)>,
}

#[async_trait]
impl SchedulerItem for AutorunScheduling {
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
            tasks: Vec::new(),
        }
    }

    fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }
        for item in &self.callbacks {
            let item = Arc::clone(item);
            let ctx = Context::new(&self.owner, None, self.services.clone());
            let id = item.id();
            let task = tokio::spawn(async move {
                if let Err(error) = item.invoke(ctx).await
                    && !error.is_cancelled()
                {
                    tracing::error!(callback = %item.label(), error = %error, "autorun callback ended");
                }
            });
            self.tasks.push((id, task));
        }
    }

    async fn stop(&mut self, force: bool) {
        for (id, task) in self.tasks.drain(..) {
            if !force {
                self.services.locks().wait(&id).await;
            }
            task.abort();
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{
        AutorunWrapper, Callback, CallbackError, CallbackType, EmptyTrigger, PassThroughExecutor,
    };
    use core::sync::atomic::{AtomicU32, Ordering};
    use core::time::Duration;

    fn sleeper(services: &Services, runs: &Arc<AtomicU32>) -> Arc<CallbackItem> {
        let runs = Arc::clone(runs);
        let callback = Callback::new("sleeper", move |_| {
            let runs = Arc::clone(&runs);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CallbackError>(())
            }
        });
        let lock = services.locks().get_lock(&callback.id(), false);
        Arc::new(CallbackItem::new(
            CallbackType::Autorun,
            "tester",
            callback,
            Arc::new(PassThroughExecutor),
            Arc::new(AutorunWrapper::new(Arc::new(EmptyTrigger), lock, false)),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn graceful_stop_lets_the_current_run_finish() {
        let services = Services::new(Default::default());
        let runs = Arc::new(AtomicU32::new(0));
        let mut item = AutorunScheduling::create(
            "tester",
            vec![sleeper(&services, &runs)],
            services.clone(),
            &(),
        );

        item.start();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let started = tokio::time::Instant::now();
        item.stop(false).await;
        assert!(started.elapsed() >= Duration::from_millis(99));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_stop_aborts_mid_run() {
        let services = Services::new(Default::default());
        let runs = Arc::new(AtomicU32::new(0));
        let mut item = AutorunScheduling::create(
            "tester",
            vec![sleeper(&services, &runs)],
            services.clone(),
            &(),
        );

        item.start();
        tokio::time::sleep(Duration::from_millis(1)).await;

        let started = tokio::time::Instant::now();
        item.stop(true).await;
        assert!(started.elapsed() < Duration::from_millis(10));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
