//! # notifier
//!
//! Typed in-process event dispatch with pluggable delivery strategies.
//!
//! ## Overview
//!
//! `notifier` lets producers fire strongly-typed events at a
//! dynamically-registered set of listeners, while the delivery mechanism —
//! synchronous, pooled, blocking-with-timeout, or queued — stays pluggable
//! and independent of registration. Swap the [`Dispatcher`] without touching
//! producer or listener code.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::any::Any;
//! use notifier::{Event, EventBus, Listener};
//!
//! struct DeployFinished { succeeded: bool }
//! impl Event for DeployFinished {
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! struct DeployLog;
//! impl DeployLog {
//!     fn on_deploy(&self, event: &DeployFinished) {
//!         println!("deploy ok: {}", event.succeeded);
//!     }
//! }
//! impl Listener for DeployLog {
//!     fn as_any(&self) -> &dyn Any { self }
//! }
//!
//! # async fn example() -> notifier::Result<()> {
//! // Inline delivery on the firing task
//! let bus = EventBus::synchronous();
//! let registration = bus.register(DeployLog);
//!
//! bus.fire(DeployFinished { succeeded: true }, |listener: &DeployLog, event| {
//!     listener.on_deploy(event);
//!     Ok(())
//! })
//! .await?;
//!
//! registration.unregister();
//! # Ok(())
//! # }
//! ```
//!
//! ## Delivery strategies
//!
//! - **synchronous** — in order, on the firing task, fail-fast
//! - **pooled** — fire-and-forget tasks on a caller-supplied [`Executor`]
//! - **blocking** — waits for completion, optionally bounded per task
//! - **queued** — single-consumer drain, continuous or periodic-budgeted
//!
//! ## Architecture
//!
//! - [`EventBus`] — listener registry and the typed `fire` entry point
//! - [`Dispatcher`] trait — strategy deciding when and where listeners run
//! - [`Executor`] trait — caller-supplied concurrent execution context
//! - [`Event`] / [`Listener`] — marker traits for caller-defined types

pub mod bus;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod types;

// Re-export core types
pub use bus::{EventBus, Registration};
pub use dispatch::{
    BlockingDispatcher, Dispatcher, PoolDispatcher, QueueConsumer, QueueDrain, QueuedDispatcher,
    SyncDispatcher,
};
pub use error::{BoxError, DispatchError, ErrorHandler, Result};
pub use executor::{Executor, InlineExecutor, TokioExecutor};
pub use types::{Event, Listener};
