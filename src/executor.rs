//! Caller-supplied execution contexts for concurrent dispatch
//!
//! The pool and blocking strategies do not own threads. They hand each
//! dispatch task to an [`Executor`], and the executor's allocation policy
//! is opaque to this crate.

use tokio::runtime::Handle;

/// An independent unit of work submitted to an executor.
pub type Task = Box<dyn FnOnce() + Send>;

/// A sink for independent units of work.
///
/// Implementations decide when and on which thread a task runs. Tasks are
/// synchronous closures and may block, so executors backed by async runtimes
/// should route them to blocking-capable workers.
pub trait Executor: Send + Sync {
    /// Submit one task for execution
    fn execute(&self, task: Task);
}

/// Executor backed by a tokio runtime's blocking pool.
#[derive(Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Wrap an explicit runtime handle
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime of the calling context.
    ///
    /// Panics outside a tokio runtime, as [`Handle::current`] does.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) {
        self.handle.spawn_blocking(task);
    }
}

/// Executor that runs each task inline on the submitting thread.
///
/// Turns concurrent strategies into synchronous ones; mostly useful in tests
/// and in single-threaded embeddings.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}
