//! Typed dispatch events
//!
//! `Event` is the sum of every payload type the client can decode. Each
//! payload type knows its own kind through `DispatchEvent`, which is what lets
//! handler registration infer the kind from a closure's parameter type.

use serde::de::DeserializeOwned;

use super::payloads::{
    ChannelCreateEvent, ChannelDeleteEvent, ChannelUpdateEvent, GuildCreateEvent,
    GuildDeleteEvent, GuildMemberAddEvent, GuildMemberRemoveEvent, GuildMemberUpdateEvent,
    GuildUpdateEvent, MessageCreateEvent, MessageDeleteEvent, MessageReactionAddEvent,
    MessageReactionRemoveEvent, MessageUpdateEvent, PresenceUpdateEvent, ReadyEvent,
    ResumedEvent, TypingStartEvent, UserUpdateEvent,
};
use super::EventKind;

/// A payload type bound to exactly one dispatch event kind
pub trait DispatchEvent: DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: EventKind;

    /// Borrow the payload out of a decoded event of the matching kind
    fn extract(event: &Event) -> Option<&Self>;
}

macro_rules! dispatch_events {
    ($($variant:ident => $payload:ty),* $(,)?) => {
        /// A decoded dispatch event
        #[derive(Debug, Clone, PartialEq)]
        pub enum Event {
            $($variant($payload),)*
        }

        impl Event {
            pub fn kind(&self) -> EventKind {
                match self {
                    $(Self::$variant(_) => EventKind::$variant,)*
                }
            }

            /// Decode raw JSON as the payload type of `kind`
            pub(crate) fn decode_as(kind: EventKind, raw: &str) -> Result<Self, serde_json::Error> {
                match kind {
                    $(EventKind::$variant => serde_json::from_str::<$payload>(raw).map(Self::$variant),)*
                }
            }
        }

        $(
            impl DispatchEvent for $payload {
                const KIND: EventKind = EventKind::$variant;

                fn extract(event: &Event) -> Option<&Self> {
                    match event {
                        Event::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$payload> for Event {
                fn from(payload: $payload) -> Self {
                    Self::$variant(payload)
                }
            }
        )*
    };
}

dispatch_events! {
    Ready => ReadyEvent,
    Resumed => ResumedEvent,
    GuildCreate => GuildCreateEvent,
    GuildUpdate => GuildUpdateEvent,
    GuildDelete => GuildDeleteEvent,
    ChannelCreate => ChannelCreateEvent,
    ChannelUpdate => ChannelUpdateEvent,
    ChannelDelete => ChannelDeleteEvent,
    MessageCreate => MessageCreateEvent,
    MessageUpdate => MessageUpdateEvent,
    MessageDelete => MessageDeleteEvent,
    MessageReactionAdd => MessageReactionAddEvent,
    MessageReactionRemove => MessageReactionRemoveEvent,
    GuildMemberAdd => GuildMemberAddEvent,
    GuildMemberUpdate => GuildMemberUpdateEvent,
    GuildMemberRemove => GuildMemberRemoveEvent,
    PresenceUpdate => PresenceUpdateEvent,
    TypingStart => TypingStartEvent,
    UserUpdate => UserUpdateEvent,
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind().as_str())
    }
}
