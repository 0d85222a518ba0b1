//! Handler registry
//!
//! Append-only table from event kind to async callbacks, in registration order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use parking_lot::RwLock;

use super::RegistrationError;
use crate::events::{DispatchEvent, Event, EventKind, EventRegistry};

/// Type-erased handler invoked with the shared decoded event
pub(crate) type Callback = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Registered user handlers, keyed by event kind
pub struct HandlerRegistry {
    events: Arc<EventRegistry>,
    handlers: RwLock<HashMap<EventKind, Vec<Callback>>>,
}

impl HandlerRegistry {
    pub fn new(events: Arc<EventRegistry>) -> Self {
        Self {
            events,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register an async handler; the kind comes from the parameter type
    ///
    /// Fails, and leaves the table unchanged, if the event registry cannot
    /// decode that kind.
    pub fn add<E, F, Fut>(&self, handler: F) -> Result<(), RegistrationError>
    where
        E: DispatchEvent,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if !self.events.contains(E::KIND) {
            let err = RegistrationError::UndecodableKind(E::KIND);
            tracing::error!(kind = %E::KIND, error = %err, "Rejected handler registration");
            return Err(err);
        }

        let callback: Callback = Arc::new(move |event: Arc<Event>| match E::extract(&event) {
            Some(payload) => handler(payload.clone()).boxed(),
            None => future::ready(()).boxed(),
        });

        self.handlers
            .write()
            .entry(E::KIND)
            .or_default()
            .push(callback);

        tracing::debug!(kind = %E::KIND, "Registered handler");
        Ok(())
    }

    /// Snapshot of the handlers for a kind, so no lock is held while they run
    pub(crate) fn handlers_for(&self, kind: EventKind) -> Vec<Callback> {
        self.handlers
            .read()
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of handlers registered for a kind
    pub fn count(&self, kind: EventKind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Total number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}
