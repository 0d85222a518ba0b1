//! Event dispatch pipeline
//!
//! Decodes dispatch frames, applies the built-in handlers inline, then fans
//! the event out to user handlers on their own tasks. Concurrent handler
//! execution is bounded by a semaphore; the caller never waits on a handler.

use std::sync::Arc;

use tokio::sync::Semaphore;

use super::{ClientCache, HandlerRegistry};
use crate::connection::SessionStore;
use crate::events::{Event, EventError, EventRegistry};
use crate::protocol::Envelope;

pub struct Dispatcher {
    events: Arc<EventRegistry>,
    handlers: Arc<HandlerRegistry>,
    cache: Arc<ClientCache>,
    session: Arc<SessionStore>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        events: Arc<EventRegistry>,
        handlers: Arc<HandlerRegistry>,
        cache: Arc<ClientCache>,
        session: Arc<SessionStore>,
        max_concurrent_handlers: usize,
    ) -> Self {
        Self {
            events,
            handlers,
            cache,
            session,
            permits: Arc::new(Semaphore::new(max_concurrent_handlers.max(1))),
        }
    }

    /// Decode a dispatch envelope and hand it to every interested handler
    ///
    /// Returns the decoded event. Must be called from within a tokio runtime.
    pub fn dispatch(&self, envelope: &Envelope) -> Result<Arc<Event>, EventError> {
        let event = self.events.decode(envelope)?;
        self.cache.apply(&event, &self.session);

        let event = Arc::new(event);
        let handlers = self.handlers.handlers_for(event.kind());

        tracing::debug!(
            event = %event.kind(),
            seq = ?envelope.s,
            handlers = handlers.len(),
            "Dispatching event"
        );

        for handler in handlers {
            let event = Arc::clone(&event);
            let permits = Arc::clone(&self.permits);
            tokio::spawn(async move {
                // Closed only if the semaphore is dropped, which never happens while tasks hold it
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                handler(event).await;
            });
        }

        Ok(event)
    }

    /// Handler invocations currently allowed to start
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}
