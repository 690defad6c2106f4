use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::task::JoinHandle;

use super::SchedulerItem;
use crate::callback::{CallbackItem, CallbackResult, Context};
use crate::runtime::Services;

/// How a single-execution batch runs its callbacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMethod {
    /// One after another, in registration order.
    #[default]
    Serial,
    /// All at once.
    Parallel,
}

/// Runs an owner's init or exit callbacks once, collecting one result each.
pub struct SingleExecution {
    owner: String,
    callbacks: Vec<Arc<CallbackItem>>,
    services: Services,
    method: ExecutionMethod,
    task: Option<JoinHandle<Vec<CallbackResult>>>,
}

async fn run_one(item: Arc<CallbackItem>, owner: String, services: Services) -> CallbackResult {
    let outcome = item.invoke(Context::new(&owner, None, services)).await;
    CallbackResult {
        item,
        ran_to_exit: true,
        outcome,
    }
}

async fn run_batch(
    owner: String,
    callbacks: Vec<Arc<CallbackItem>>,
    services: Services,
    method: ExecutionMethod,
) -> Vec<CallbackResult> {
    match method {
        ExecutionMethod::Parallel => {
            join_all(
                callbacks
                    .into_iter()
                    .map(|item| run_one(item, owner.clone(), services.clone())),
            )
            .await
        }
        ExecutionMethod::Serial => {
            let mut results = Vec::with_capacity(callbacks.len());
            for item in callbacks {
                results.push(run_one(item, owner.clone(), services.clone()).await);
            }
            results
        }
    }
}

#[async_trait]
impl SchedulerItem for SingleExecution {
    type Config = ExecutionMethod;
    type Output = Vec<CallbackResult>;

    fn create(
        owner: &str,
        callbacks: Vec<Arc<CallbackItem>>,
        services: Services,
        config: &ExecutionMethod,
    ) -> Self {
        Self {
            owner: owner.to_string(),
            callbacks,
            services,
            method: *config,
            task: None,
        }
    }

    fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        self.task = Some(tokio::spawn(run_batch(
            self.owner.clone(),
            self.callbacks.clone(),
            self.services.clone(),
            self.method,
        )));
    }

    async fn stop(&mut self, force: bool) -> Vec<CallbackResult> {
        let Some(task) = self.task.take() else {
            return Vec::new();
        };
        if force {
            task.abort();
        }
        match task.await {
            Ok(results) => results,
            Err(err) => {
                if err.is_panic() {
                    tracing::error!(owner = %self.owner, "single execution batch panicked");
                }
                Vec::new()
            }
        }
    }
}
