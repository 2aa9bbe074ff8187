//! Event bus — listener registry and the typed `fire` entry point
//!
//! [`EventBus`] owns a copy-on-write listener set and a pluggable
//! [`Dispatcher`]. Registration and unregistration never block a concurrent
//! [`fire`](EventBus::fire), and every `fire` operates on a stable
//! point-in-time snapshot of the set.

use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::runtime::Handle;
use tracing::{debug, trace};

use crate::dispatch::{
    BlockingDispatcher, DispatchFn, Dispatcher, ListenerFilter, PoolDispatcher, QueuedDispatcher,
    SyncDispatcher,
};
use crate::error::{BoxError, ErrorHandler, Result};
use crate::executor::Executor;
use crate::types::{same_entry, Event, Listener, Predicated};

/// Typed in-process event bus.
///
/// Producers fire strongly-typed events at the dynamically-registered
/// listener set; the configured [`Dispatcher`] decides when and where each
/// matching listener runs. Cloning yields another handle to the same bus.
///
/// ```rust
/// use std::any::Any;
/// use notifier::{Event, EventBus, Listener};
///
/// struct OrderPlaced { order_id: u64 }
/// impl Event for OrderPlaced {
///     fn as_any(&self) -> &dyn Any { self }
/// }
///
/// struct OrderLog;
/// impl OrderLog {
///     fn on_order(&self, event: &OrderPlaced) {
///         println!("order {}", event.order_id);
///     }
/// }
/// impl Listener for OrderLog {
///     fn as_any(&self) -> &dyn Any { self }
/// }
///
/// # async fn example() -> notifier::Result<()> {
/// let bus = EventBus::synchronous();
/// let registration = bus.register(OrderLog);
///
/// bus.fire(OrderPlaced { order_id: 7 }, |listener: &OrderLog, event| {
///     listener.on_order(event);
///     Ok(())
/// })
/// .await?;
///
/// registration.unregister();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<Shared>,
}

struct Shared {
    dispatcher: Box<dyn Dispatcher>,
    listeners: ArcSwap<Vec<Arc<dyn Listener>>>,
}

impl EventBus {
    /// Create a bus over an explicit dispatch strategy
    pub fn new(dispatcher: impl Dispatcher + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                dispatcher: Box::new(dispatcher),
                listeners: ArcSwap::from_pointee(Vec::new()),
            }),
        }
    }

    /// Bus delivering inline on the firing task, in order, fail-fast
    pub fn synchronous() -> Self {
        Self::new(SyncDispatcher::new())
    }

    /// Bus submitting fire-and-forget tasks to the given executor
    pub fn pooled(executor: Arc<dyn Executor>) -> Self {
        Self::new(PoolDispatcher::new(executor))
    }

    /// Bus that waits for every listener to complete before `fire` resolves
    pub fn blocking(executor: Arc<dyn Executor>, on_error: ErrorHandler) -> Self {
        Self::new(BlockingDispatcher::new(executor, on_error))
    }

    /// Like [`blocking`](Self::blocking), but each pending listener is
    /// waited on for at most `max_wait`
    pub fn blocking_with_timeout(
        executor: Arc<dyn Executor>,
        max_wait: Duration,
        on_error: ErrorHandler,
    ) -> Self {
        Self::new(BlockingDispatcher::with_timeout(executor, max_wait, on_error))
    }

    /// Bus draining all events in order on a dedicated background consumer
    pub fn queued(handle: &Handle) -> Self {
        Self::new(QueuedDispatcher::spawn_consumer(handle))
    }

    /// Bus draining queued events on a periodic timer, budgeted per period
    pub fn periodic(handle: &Handle, period: Duration) -> Self {
        Self::new(QueuedDispatcher::spawn_periodic(handle, period))
    }

    /// Add a listener to the live set. Never fails.
    ///
    /// Listeners added while a `fire` is in flight are not seen by that
    /// call; they receive deliveries from the next `fire` on.
    pub fn register<L: Listener>(&self, listener: L) -> Registration {
        self.insert(Arc::new(listener))
    }

    /// Add a listener gated on a per-event guard.
    ///
    /// The guard sees only the event; the listener is invoked for a
    /// matching `fire` only when the guard returns true.
    pub fn register_when<L, P>(&self, listener: L, guard: P) -> Registration
    where
        L: Listener,
        P: Fn(&dyn Event) -> bool + Send + Sync + 'static,
    {
        let inner: Arc<dyn Listener> = Arc::new(listener);
        self.insert(Arc::new(Predicated::new(inner, Box::new(guard))))
    }

    fn insert(&self, entry: Arc<dyn Listener>) -> Registration {
        self.shared.listeners.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(entry.clone());
            next
        });
        debug!(listeners = self.len(), "Listener registered");
        Registration {
            bus: Arc::downgrade(&self.shared),
            entry,
        }
    }

    /// Number of currently registered listeners
    pub fn len(&self) -> usize {
        self.shared.listeners.load().len()
    }

    /// True if no listeners are registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fire an event at every registered listener of type `L`.
    ///
    /// A consistent snapshot of the listener set is taken at call time and
    /// handed to the configured dispatcher together with `call`, which is
    /// invoked once per matching listener. Guarded listeners registered via
    /// [`register_when`](Self::register_when) are additionally filtered by
    /// their guard.
    ///
    /// Only the synchronous strategy surfaces listener failures here; all
    /// concurrent strategies resolve with `Ok(())` as soon as delivery has
    /// been arranged.
    pub async fn fire<L, E, F>(&self, event: E, call: F) -> Result<()>
    where
        L: Listener,
        E: Event,
        F: Fn(&L, &E) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let snapshot = self.shared.listeners.load_full();
        let filter: ListenerFilter =
            Box::new(|entry: &dyn Listener| entry.is::<L>() || entry.is::<Predicated>());
        let event: Arc<dyn Event> = Arc::new(event);
        let call = typed_call::<L, E, F>(call);

        trace!(candidates = snapshot.len(), "Dispatching event");
        self.shared
            .dispatcher
            .dispatch(snapshot, filter, event, call)
            .await
    }
}

/// Type-erased invocation that re-checks capability, event type, and guard
/// per entry, exactly once per delivery.
fn typed_call<L, E, F>(call: F) -> DispatchFn
where
    L: Listener,
    E: Event,
    F: Fn(&L, &E) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(move |entry: &dyn Listener, event: &dyn Event| {
        let Some(typed_event) = event.downcast_ref::<E>() else {
            return Ok(());
        };
        if let Some(predicated) = entry.downcast_ref::<Predicated>() {
            if let Some(inner) = predicated.inner.as_ref().downcast_ref::<L>() {
                if (predicated.guard)(event) {
                    return call(inner, typed_event);
                }
            }
            Ok(())
        } else if let Some(listener) = entry.downcast_ref::<L>() {
            call(listener, typed_event)
        } else {
            Ok(())
        }
    })
}

/// Handle to one registered listener.
///
/// Holds a non-owning reference to the bus: dropping the bus while
/// registrations are still around is fine, and their
/// [`unregister`](Self::unregister) becomes a no-op.
pub struct Registration {
    bus: Weak<Shared>,
    entry: Arc<dyn Listener>,
}

impl Registration {
    /// Remove the registered listener from the live set.
    ///
    /// Idempotent: a second call, or a call after the bus has been dropped,
    /// does nothing. A `fire` snapshot taken before this call still
    /// delivers to the listener.
    pub fn unregister(&self) {
        let Some(shared) = self.bus.upgrade() else {
            return;
        };
        shared.listeners.rcu(|current| {
            current
                .iter()
                .filter(|existing| !same_entry(existing, &self.entry))
                .cloned()
                .collect::<Vec<_>>()
        });
        debug!("Listener unregistered");
    }
}
