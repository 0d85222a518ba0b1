//! Event registry
//!
//! Maps dispatch names to the payload types this client decodes. Built once
//! when the client is constructed and shared with the dispatcher.

use std::collections::BTreeSet;

use super::{Event, EventKind};
use crate::protocol::Envelope;

/// Event decode errors
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("dispatch frame has no event name")]
    MissingName,

    #[error("unknown event: {name}")]
    UnknownEvent {
        name: String,
        /// Undecoded payload
        raw: String,
    },

    #[error("failed to decode {kind} payload: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Set of event kinds the dispatcher will decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRegistry {
    kinds: BTreeSet<EventKind>,
}

impl EventRegistry {
    /// Registry covering every known kind
    pub fn new() -> Self {
        Self::with_kinds(EventKind::ALL)
    }

    /// Registry covering only the given kinds
    pub fn with_kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    #[inline]
    pub fn contains(&self, kind: EventKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Resolve a wire name to a registered kind
    pub fn lookup(&self, name: &str) -> Option<EventKind> {
        EventKind::from_name(name).filter(|kind| self.contains(*kind))
    }

    /// Decode a dispatch envelope into a typed event
    pub fn decode(&self, envelope: &Envelope) -> Result<Event, EventError> {
        let name = envelope.event_name().ok_or(EventError::MissingName)?;
        let kind = self
            .lookup(name)
            .ok_or_else(|| EventError::UnknownEvent {
                name: name.to_string(),
                raw: envelope.raw_payload().to_string(),
            })?;

        Event::decode_as(kind, envelope.raw_payload())
            .map_err(|source| EventError::Payload { kind, source })
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
