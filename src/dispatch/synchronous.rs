//! Synchronous in-order delivery on the caller's task

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::dispatch::{DispatchFn, Dispatcher, ListenerFilter, Snapshot};
use crate::error::{DispatchError, Result};
use crate::types::Event;

/// Delivers inline, in snapshot order, on the calling task.
///
/// `dispatch` returns only after every listener has run. This is the one
/// strategy with a strict caller-visible ordering guarantee, and the one
/// strategy that propagates listener failures: the first error aborts
/// delivery to the remaining listeners and is returned to the `fire` caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncDispatcher;

impl SyncDispatcher {
    /// Create a synchronous dispatcher
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dispatcher for SyncDispatcher {
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
            trace!("Delivering event inline");
            call(entry.as_ref(), event.as_ref())
                .map_err(|err| DispatchError::Listener(err.to_string()))?;
        }
        Ok(())
    }
}
