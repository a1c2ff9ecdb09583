//! # Event Bus
//!
//! Typed publish/subscribe used by both simulators. Every payload type implements [`Event`],
//! which maps each payload variant to a `Kind` key; handlers subscribe per `Kind`.
//!
//! Delivery is synchronous: [`EventBus::publish`] runs every handler registered for the
//! payload's kind, in registration order, before returning. A handler that returns an error
//! or panics is logged and skipped; the remaining handlers still run.

use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::{
    any::Any,
    fmt::Debug,
    hash::Hash,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, error};

/// Payload that can be delivered through an [`EventBus`].
pub trait Event: Send + Sync + 'static {
    /// Subscription key, typically a field-less mirror of the payload enum.
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Failure reported by a [`Handler`]. Never propagates past the bus.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Registered callback. Identity (for [`EventBus::unsubscribe`]) is the `Arc` allocation.
pub type Handler<E> = Arc<dyn Fn(&E) -> Result<(), HandlerError> + Send + Sync>;

/// Convenience constructor for a [`Handler`].
pub fn handler<E, F>(f: F) -> Handler<E>
where
    E: Event,
    F: Fn(&E) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Result of a single [`EventBus::publish`] call.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct PublishOutcome {
    pub delivered: usize,
    pub failed: usize,
}

/// Registry of handlers per event kind.
pub struct EventBus<E: Event> {
    handlers: RwLock<FnvHashMap<E::Kind, Vec<Handler<E>>>>,
}

impl<E: Event> EventBus<E> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(FnvHashMap::default()),
        }
    }

    /// Register `handler` for `kind`. The same handler may be registered more than once, in
    /// which case it is invoked once per registration.
    pub fn subscribe(&self, kind: E::Kind, handler: Handler<E>) {
        self.handlers.write().entry(kind).or_default().push(handler);
    }

    /// Remove the first registration of `handler` for `kind`.
    ///
    /// Returns `false` if no such registration existed.
    pub fn unsubscribe(&self, kind: E::Kind, handler: &Handler<E>) -> bool {
        let mut handlers = self.handlers.write();
        let Some(registered) = handlers.get_mut(&kind) else {
            return false;
        };

        match registered.iter().position(|h| Arc::ptr_eq(h, handler)) {
            Some(index) => {
                registered.remove(index);
                if registered.is_empty() {
                    handlers.remove(&kind);
                }
                true
            }
            None => false,
        }
    }

    /// Number of registrations for `kind`.
    pub fn handler_count(&self, kind: E::Kind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler registered for `event.kind()` at the time of the call.
    pub fn publish(&self, event: &E) -> PublishOutcome {
        let kind = event.kind();

        // Snapshot so handlers may (un)subscribe re-entrantly without deadlocking
        let handlers = match self.handlers.read().get(&kind) {
            Some(handlers) => handlers.clone(),
            None => return PublishOutcome::default(),
        };

        let mut outcome = PublishOutcome::default();
        for handler in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => outcome.delivered += 1,
                Ok(Err(err)) => {
                    outcome.failed += 1;
                    error!(?kind, %err, "event handler failed");
                }
                Err(panic) => {
                    outcome.failed += 1;
                    error!(
                        ?kind,
                        panic = panic_message(panic.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }

        debug!(
            ?kind,
            delivered = outcome.delivered,
            failed = outcome.failed,
            "published event"
        );
        outcome
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_map()
            .entries(handlers.iter().map(|(kind, list)| (kind, list.len())))
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Ping {
        A(u32),
        B,
    }

    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    enum PingKind {
        A,
        B,
    }

    impl Event for Ping {
        type Kind = PingKind;

        fn kind(&self) -> Self::Kind {
            match self {
                Ping::A(_) => PingKind::A,
                Ping::B => PingKind::B,
            }
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Handler<Ping> {
        let log = Arc::clone(log);
        handler(move |event: &Ping| {
            log.lock().push(format!("{tag}:{event:?}"));
            Ok(())
        })
    }

    #[test]
    fn test_publish_invokes_handlers_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(PingKind::A, recorder(&log, "first"));
        bus.subscribe(PingKind::A, recorder(&log, "second"));
        bus.subscribe(PingKind::B, recorder(&log, "other"));

        let outcome = bus.publish(&Ping::A(7));

        assert_eq!(outcome, PublishOutcome { delivered: 2, failed: 0 });
        assert_eq!(*log.lock(), vec!["first:A(7)", "second:A(7)"]);
    }

    #[test]
    fn test_duplicate_subscription_fires_twice_and_unsubscribe_removes_one() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler = recorder(&log, "dup");

        bus.subscribe(PingKind::B, Arc::clone(&handler));
        bus.subscribe(PingKind::B, Arc::clone(&handler));
        bus.publish(&Ping::B);
        assert_eq!(log.lock().len(), 2);

        assert!(bus.unsubscribe(PingKind::B, &handler));
        assert_eq!(bus.handler_count(PingKind::B), 1);

        bus.publish(&Ping::B);
        assert_eq!(log.lock().len(), 3);
    }

    #[test]
    fn test_unsubscribe_unknown_handler_is_noop() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let registered = recorder(&log, "kept");
        let stranger = recorder(&log, "stranger");

        bus.subscribe(PingKind::A, Arc::clone(&registered));

        assert!(!bus.unsubscribe(PingKind::A, &stranger));
        assert!(!bus.unsubscribe(PingKind::B, &registered));
        assert_eq!(bus.handler_count(PingKind::A), 1);
    }

    #[test]
    fn test_failing_handlers_do_not_stop_delivery() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.subscribe(
            PingKind::A,
            handler(|_: &Ping| Err(HandlerError::new("bad subscriber"))),
        );
        bus.subscribe(
            PingKind::A,
            handler(|_: &Ping| -> Result<(), HandlerError> { panic!("boom") }),
        );
        bus.subscribe(PingKind::A, recorder(&log, "survivor"));

        let outcome = bus.publish(&Ping::A(1));

        assert_eq!(outcome, PublishOutcome { delivered: 1, failed: 2 });
        assert_eq!(*log.lock(), vec!["survivor:A(1)"]);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus: EventBus<Ping> = EventBus::default();
        assert_eq!(bus.publish(&Ping::B), PublishOutcome::default());
    }

    #[test]
    fn test_handler_may_unsubscribe_during_publish() {
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<Mutex<Option<Handler<Ping>>>> = Arc::new(Mutex::new(None));

        let once = {
            let bus = Arc::clone(&bus);
            let slot = Arc::clone(&slot);
            let log = Arc::clone(&log);
            handler(move |event: &Ping| {
                log.lock().push(format!("once:{event:?}"));
                if let Some(me) = slot.lock().take() {
                    bus.unsubscribe(PingKind::A, &me);
                }
                Ok(())
            })
        };
        *slot.lock() = Some(Arc::clone(&once));
        bus.subscribe(PingKind::A, once);

        bus.publish(&Ping::A(1));
        bus.publish(&Ping::A(2));

        assert_eq!(*log.lock(), vec!["once:A(1)"]);
    }
}
