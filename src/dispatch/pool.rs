//! Fire-and-forget delivery through a caller-supplied executor

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::dispatch::{DispatchFn, DispatchTask, Dispatcher, ListenerFilter, Snapshot, TaskFailure};
use crate::error::Result;
use crate::executor::Executor;
use crate::types::Event;

/// Submits one independent task per filtered listener and returns without
/// waiting for any of them.
///
/// No ordering guarantee between listeners. The `fire` caller gets no
/// completion or failure signal: a listener error is logged here, anything
/// beyond that (thread death, task drops) is the executor's policy.
pub struct PoolDispatcher {
    executor: Arc<dyn Executor>,
}

impl PoolDispatcher {
    /// Create a pool dispatcher over the given executor
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Dispatcher for PoolDispatcher {
    async fn dispatch(
        &self,
        listeners: Snapshot,
        filter: ListenerFilter,
        event: Arc<dyn Event>,
        call: DispatchFn,
    ) -> Result<()> {
        for entry in listeners.iter() {
            if !filter(entry.as_ref()) {
                continue;
            }
            let task = DispatchTask::new(entry.clone(), event.clone(), call.clone());
            self.executor.execute(Box::new(move || {
                match task.run_caught() {
                    Ok(()) => {}
                    Err(TaskFailure::Error(err)) => {
                        warn!(error = %err, "Listener failed during pooled dispatch");
                    }
                    Err(TaskFailure::Panic(message)) => {
                        warn!(panic = %message, "Listener panicked during pooled dispatch");
                    }
                }
            }));
        }
        Ok(())
    }
}
