//! # eventide-core
//!
//! Wire entities and value objects shared by the gateway client.
//! This crate has no networking or runtime dependencies.

pub mod entities;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    Attachment, Channel, ChannelType, Emoji, Guild, GuildMember, Message, Role, UnavailableGuild,
    User,
};
pub use value_objects::{Intents, Snowflake, SnowflakeParseError};
