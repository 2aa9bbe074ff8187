//! Wait-for-completion delivery with an optional timeout

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::trace;

use crate::dispatch::{DispatchFn, DispatchTask, Dispatcher, ListenerFilter, Snapshot, TaskFailure};
use crate::error::{DispatchError, ErrorHandler, Result};
use crate::executor::Executor;
use crate::types::Event;

/// Submits one task per filtered listener to an executor, then waits for all
/// of them to finish before returning.
///
/// Without a timeout, `dispatch` resolves only once every task has completed
/// or failed. With a timeout, each still-pending task is waited on for at
/// most `max_wait`; when the wait elapses the timeout is reported to the
/// error handler and the next task is checked — the timed-out task itself is
/// never cancelled and still runs to completion on the executor.
///
/// Every per-task failure (listener error, panic, timeout) produces exactly
/// one error-handler call and never aborts collection of the remaining
/// results.
pub struct BlockingDispatcher {
    executor: Arc<dyn Executor>,
    max_wait: Option<Duration>,
    on_error: ErrorHandler,
}

impl BlockingDispatcher {
    /// Wait indefinitely for every task to complete
    pub fn new(executor: Arc<dyn Executor>, on_error: ErrorHandler) -> Self {
        Self {
            executor,
            max_wait: None,
            on_error,
        }
    }

    /// Wait up to `max_wait` per pending task
    pub fn with_timeout(
        executor: Arc<dyn Executor>,
        max_wait: Duration,
        on_error: ErrorHandler,
    ) -> Self {
        Self {
            executor,
            max_wait: Some(max_wait),
            on_error,
        }
    }
}

type Completion = oneshot::Receiver<std::result::Result<(), TaskFailure>>;

#[async_trait]
impl Dispatcher for BlockingDispatcher {
    async fn dispatch(
        &self,
        listeners: Snapshot,
        filter: ListenerFilter,
        event: Arc<dyn Event>,
        call: DispatchFn,
    ) -> Result<()> {
        let mut pending: Vec<Completion> = Vec::new();

        for entry in listeners.iter() {
            if !filter(entry.as_ref()) {
                continue;
            }
            let task = DispatchTask::new(entry.clone(), event.clone(), call.clone());
            let (done_tx, done_rx) = oneshot::channel();
            self.executor.execute(Box::new(move || {
                let _ = done_tx.send(task.run_caught());
            }));
            pending.push(done_rx);
        }

        trace!(tasks = pending.len(), "Waiting for dispatched tasks");

        for done_rx in pending {
            let outcome = match self.max_wait {
                Some(max_wait) => match tokio::time::timeout(max_wait, done_rx).await {
                    Ok(received) => received,
                    Err(_elapsed) => {
                        (self.on_error)(DispatchError::Timeout { timeout: max_wait });
                        continue;
                    }
                },
                None => done_rx.await,
            };

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(TaskFailure::Error(err))) => {
                    (self.on_error)(DispatchError::Listener(err.to_string()));
                }
                Ok(Err(TaskFailure::Panic(message))) => {
                    (self.on_error)(DispatchError::Panic(message));
                }
                Err(_closed) => {
                    (self.on_error)(DispatchError::Lost);
                }
            }
        }

        Ok(())
    }
}
