//! Dispatch strategies — pluggable delivery backends for the event bus
//!
//! A [`Dispatcher`] decides when and on which thread each matching listener
//! is invoked. The bus hands every strategy the same inputs: an immutable
//! snapshot of the listener set, a coarse eligibility filter, the event, and
//! a type-erased call that performs the fine-grained capability and guard
//! checks before invoking the caller's typed function. Strategies never need
//! to understand predicates or type descriptors, only "run this task, maybe
//! filtered".

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BoxError, Result};
use crate::types::{Event, Listener};

mod blocking;
mod pool;
mod queued;
mod synchronous;

pub use blocking::BlockingDispatcher;
pub use pool::PoolDispatcher;
pub use queued::{QueueConsumer, QueueDrain, QueuedDispatcher};
pub use synchronous::SyncDispatcher;

/// Immutable point-in-time copy of the listener set, shared with the
/// strategy for the duration of one `fire` call.
pub type Snapshot = Arc<Vec<Arc<dyn Listener>>>;

/// Coarse eligibility filter computed by the bus for one `fire` call.
pub type ListenerFilter = Box<dyn Fn(&dyn Listener) -> bool + Send + Sync>;

/// Type-erased listener invocation.
///
/// Re-checks capability and event type per entry and no-ops on a mismatch,
/// so strategies may run it against any snapshot entry that passed the
/// coarse filter.
pub type DispatchFn =
    Arc<dyn Fn(&dyn Listener, &dyn Event) -> std::result::Result<(), BoxError> + Send + Sync>;

/// A pluggable delivery strategy.
///
/// Postcondition shared by all strategies: every snapshot entry accepted by
/// the filter is offered to the call exactly once — never duplicated, never
/// silently dropped. The blocking strategy's timeout only stops the *wait*,
/// not the offered work.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Deliver one event to every filtered entry of the snapshot.
    ///
    /// Only [`SyncDispatcher`] ever returns an error; concurrent strategies
    /// report failures through their own channels (executor policy, error
    /// handler, or logs) and always return `Ok`.
    async fn dispatch(
        &self,
        listeners: Snapshot,
        filter: ListenerFilter,
        event: Arc<dyn Event>,
        call: DispatchFn,
    ) -> Result<()>;
}

/// The unit of work delivered to one listener: created per matching listener
/// per `fire` call, owned by whichever execution context runs it.
pub(crate) struct DispatchTask {
    listener: Arc<dyn Listener>,
    event: Arc<dyn Event>,
    call: DispatchFn,
}

impl DispatchTask {
    pub(crate) fn new(listener: Arc<dyn Listener>, event: Arc<dyn Event>, call: DispatchFn) -> Self {
        Self {
            listener,
            event,
            call,
        }
    }

    /// Invoke the listener, catching panics so worker loops survive them.
    pub(crate) fn run(self) -> std::result::Result<(), BoxError> {
        (self.call)(self.listener.as_ref(), self.event.as_ref())
    }

    /// Like [`run`](Self::run), but converts a panic into an error value.
    pub(crate) fn run_caught(self) -> std::result::Result<(), TaskFailure> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run())) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(TaskFailure::Error(err)),
            Err(payload) => Err(TaskFailure::Panic(panic_message(payload.as_ref()))),
        }
    }
}

/// Failure of one dispatch task.
pub(crate) enum TaskFailure {
    Error(BoxError),
    Panic(String),
}

/// Best-effort extraction of a panic payload message.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
