//! In-process event bus.
//!
//! Topics are types, so a listener for [`Connected`] can only ever be handed
//! a [`SessionHandle`](crate::session::SessionHandle):
//!
//! ```rust,ignore
//! use chatwire::bus::{EventBus, MessageReceived};
//!
//! let bus = EventBus::new();
//! bus.subscribe::<MessageReceived, _>(|event| {
//!     println!("{}: {:?}", event.session, event.content.text());
//!     Ok(())
//! });
//! ```
//!
//! Delivery is synchronous and in registration order. A listener that fails
//! or panics is logged and skipped; the publisher and later listeners are
//! unaffected. Nothing survives a restart.

mod topics;

pub use topics::{
    CallReceived, Connected, ContactsUpdated, Disconnected, GroupUpdated, MessageReceived,
};

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Result;

/// A bus topic with a fixed payload type.
pub trait Topic: 'static {
    /// What listeners receive
    type Payload: Send + Sync + 'static;
    /// Topic name for logs
    const NAME: &'static str;
}

/// Payload tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<P> {
    /// Originating session
    pub session: String,
    /// Topic payload
    pub payload: P,
}

impl<P> Event<P> {
    /// Create event
    pub fn new(session: impl Into<String>, payload: P) -> Self {
        Self {
            session: session.into(),
            payload,
        }
    }
}

impl<P> Deref for Event<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.payload
    }
}

/// Handle for removing a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Outcome of one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Listeners that returned `Ok`
    pub delivered: usize,
    /// Listeners that returned `Err` or panicked
    pub failed: usize,
}

type Listener<P> = Arc<dyn Fn(&Event<P>) -> Result<()> + Send + Sync>;

struct Slot<P> {
    listeners: Vec<(SubscriptionId, Listener<P>)>,
}

impl<P> Default for Slot<P> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Inner {
    slots: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    next_id: AtomicU64,
}

/// Typed publish/subscribe hub. Clones share listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics = self
            .inner
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("EventBus").field("topics", &topics).finish()
    }
}

impl EventBus {
    /// Create bus with no listeners
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for topic `T`.
    pub fn subscribe<T, F>(&self, listener: F) -> SubscriptionId
    where
        T: Topic,
        F: Fn(&Event<T::Payload>) -> Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut slots = self
            .inner
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let slot = slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Slot::<T::Payload>::default()));
        if let Some(slot) = slot.downcast_mut::<Slot<T::Payload>>() {
            slot.listeners.push((id, Arc::new(listener)));
        }
        id
    }

    /// Remove a listener. Returns false if it was not registered on `T`.
    pub fn unsubscribe<T: Topic>(&self, id: SubscriptionId) -> bool {
        let mut slots = self
            .inner
            .slots
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(slot) = slots
            .get_mut(&TypeId::of::<T>())
            .and_then(|s| s.downcast_mut::<Slot<T::Payload>>())
        else {
            return false;
        };
        let before = slot.listeners.len();
        slot.listeners.retain(|(existing, _)| *existing != id);
        slot.listeners.len() != before
    }

    /// Number of listeners on `T`
    pub fn listener_count<T: Topic>(&self) -> usize {
        self.snapshot::<T>().len()
    }

    /// Listeners registered at this instant. The lock is released before delivery.
    fn snapshot<T: Topic>(&self) -> Vec<Listener<T::Payload>> {
        self.inner
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .and_then(|s| s.downcast_ref::<Slot<T::Payload>>())
            .map(|slot| slot.listeners.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }

    /// Deliver `event` to every listener on `T`, in registration order.
    pub fn publish<T: Topic>(&self, event: &Event<T::Payload>) -> Delivery {
        let mut delivery = Delivery::default();
        for listener in self.snapshot::<T>() {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    tracing::warn!(topic = T::NAME, session = %event.session, "listener failed: {e}");
                },
                Err(_) => {
                    delivery.failed += 1;
                    tracing::error!(topic = T::NAME, session = %event.session, "listener panicked");
                },
            }
        }
        delivery
    }

    /// Wrap `payload` for `session` and publish it.
    pub fn emit<T: Topic>(&self, session: &str, payload: T::Payload) -> Delivery {
        self.publish::<T>(&Event::new(session, payload))
    }
}
