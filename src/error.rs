//! Error types for the notifier crate

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Boxed failure returned by a listener invocation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Callback receiving per-task failures from the blocking strategy.
///
/// Invoked once per failing or timed-out task. It may block; the blocking
/// dispatcher is already blocking its caller.
pub type ErrorHandler = Arc<dyn Fn(DispatchError) + Send + Sync>;

/// Errors produced while delivering an event
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A listener invocation returned an error
    #[error("Listener invocation failed: {0}")]
    Listener(String),

    /// A listener panicked inside a dispatch task
    #[error("Listener panicked: {0}")]
    Panic(String),

    /// The blocking strategy's wait bound elapsed before the task finished.
    ///
    /// The task itself keeps running on its executor; only the wait stops.
    #[error("Timed out after {timeout:?} waiting for a listener to complete")]
    Timeout {
        /// The configured maximum wait
        timeout: Duration,
    },

    /// A submitted task was dropped by its executor before producing a result
    #[error("Listener task was dropped before completion")]
    Lost,
}

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;
