//! Core event and listener types
//!
//! Events and listeners are arbitrary caller-defined types. The bus never
//! inspects them beyond runtime type identity, so both traits are thin
//! markers exposing an [`Any`] view for dispatch-time matching.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A typed event payload.
///
/// Events are immutable from the bus's point of view: dispatch hands
/// shared references to listeners and never mutates the payload.
///
/// Implementations only need to surface `self` as [`Any`]:
///
/// ```rust
/// use std::any::Any;
/// use notifier::Event;
///
/// struct OrderPlaced { pub order_id: u64 }
///
/// impl Event for OrderPlaced {
///     fn as_any(&self) -> &dyn Any { self }
/// }
/// ```
pub trait Event: Send + Sync + 'static {
    /// Runtime type view used for dispatch-time matching
    fn as_any(&self) -> &dyn Any;
}

/// An opaque listener identity.
///
/// The bus stores listeners without inspecting them; whether a listener can
/// handle a given event is decided by its concrete type, requested at
/// [`fire`](crate::EventBus::fire) time.
pub trait Listener: Send + Sync + 'static {
    /// Runtime type view used for capability matching
    fn as_any(&self) -> &dyn Any;
}

impl dyn Event {
    /// Returns true if the event's concrete type is `T`
    pub fn is<T: Event>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcast the event to its concrete type
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}

impl dyn Listener {
    /// Returns true if the listener's concrete type is `T`
    pub fn is<T: Listener>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Downcast the listener to its concrete type
    pub fn downcast_ref<T: Listener>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}

/// Guard predicate attached to a registered listener.
pub type Guard = Box<dyn Fn(&dyn Event) -> bool + Send + Sync>;

/// A listener wrapped with a per-event guard.
///
/// Stored in the registry in place of the wrapped listener. It matches a
/// requested capability if the wrapped listener does, and actual invocation
/// is additionally gated on the guard holding for the event. For
/// unregistration, its identity is the wrapped listener's.
pub(crate) struct Predicated {
    pub(crate) inner: Arc<dyn Listener>,
    pub(crate) guard: Guard,
}

impl Predicated {
    pub(crate) fn new(inner: Arc<dyn Listener>, guard: Guard) -> Self {
        Self { inner, guard }
    }
}

impl Listener for Predicated {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for Predicated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicated").finish_non_exhaustive()
    }
}

/// Identity of a registry entry, unwrapping guards on both sides.
pub(crate) fn same_entry(a: &Arc<dyn Listener>, b: &Arc<dyn Listener>) -> bool {
    let a = unwrap_entry(a);
    let b = unwrap_entry(b);
    Arc::ptr_eq(a, b)
}

fn unwrap_entry(entry: &Arc<dyn Listener>) -> &Arc<dyn Listener> {
    match entry.as_ref().downcast_ref::<Predicated>() {
        Some(predicated) => &predicated.inner,
        None => entry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;

    impl Event for Ping {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Default)]
    struct PingListener;

    impl Listener for PingListener {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn listener_downcast_matches_concrete_type() {
        let listener: Arc<dyn Listener> = Arc::new(PingListener);
        assert!(listener.as_ref().is::<PingListener>());
        assert!(listener.as_ref().downcast_ref::<PingListener>().is_some());
    }

    #[test]
    fn predicated_identity_is_the_wrapped_listener() {
        let inner: Arc<dyn Listener> = Arc::new(PingListener);
        let wrapped: Arc<dyn Listener> =
            Arc::new(Predicated::new(inner.clone(), Box::new(|_| true)));
        let other: Arc<dyn Listener> = Arc::new(PingListener);

        assert!(same_entry(&wrapped, &inner));
        assert!(same_entry(&wrapped, &wrapped));
        assert!(!same_entry(&wrapped, &other));
    }

    #[test]
    fn guard_sees_the_event() {
        let inner: Arc<dyn Listener> = Arc::new(PingListener);
        let predicated = Predicated::new(inner, Box::new(|event| event.is::<Ping>()));
        assert!((predicated.guard)(&Ping));
    }
}
