//! Gateway events
//!
//! Dispatch event kinds, their payloads, and the registry that decodes them.

mod event;
mod event_types;
mod payloads;
mod registry;

pub use event::{DispatchEvent, Event};
pub use event_types::EventKind;
pub use payloads::{
    ChannelCreateEvent, ChannelDeleteEvent, ChannelUpdateEvent, GuildCreateEvent,
    GuildDeleteEvent, GuildMemberAddEvent, GuildMemberRemoveEvent, GuildMemberUpdateEvent,
    GuildUpdateEvent, MessageCreateEvent, MessageDeleteEvent, MessageReactionAddEvent,
    MessageReactionRemoveEvent, MessageUpdateEvent, PartialUser, PresenceUpdateEvent, ReadyEvent,
    ResumedEvent, TypingStartEvent, UserUpdateEvent,
};
pub use registry::{EventError, EventRegistry};
