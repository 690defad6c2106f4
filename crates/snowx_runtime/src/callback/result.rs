//! Outcome of one callback in a single-execution batch.

use std::sync::Arc;

use super::{CallbackItem, ExecutionError};
use crate::event::Output;

/// Result record for one callback of an init or exit batch.
#[derive(Debug)]
pub struct CallbackResult {
    /// The callback that ran.
    pub item: Arc<CallbackItem>,
    /// False if the run was abandoned before finishing.
    pub ran_to_exit: bool,
    /// Output on success, the executor's error otherwise.
    pub outcome: Result<Output, ExecutionError>,
}

impl CallbackResult {
    /// Returns true if the callback finished and succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.ran_to_exit && self.outcome.is_ok()
    }

    /// Output of a successful run.
    #[must_use]
    pub fn payload(&self) -> Option<&Output> {
        self.outcome.as_ref().ok()
    }
}
