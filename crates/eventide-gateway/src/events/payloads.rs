//! Event payload definitions
//!
//! One type per dispatch event. Events whose payload is a whole entity wrap it
//! and deref to it.

use std::ops::Deref;

use chrono::{DateTime, Utc};
use eventide_core::{Channel, Emoji, Guild, GuildMember, Message, Snowflake, UnavailableGuild, User};
use serde::{Deserialize, Deserializer, Serialize};

use crate::protocol::Activity;

macro_rules! entity_event {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl Deref for $name {
            type Target = $inner;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$name> for $inner {
            fn from(event: $name) -> Self {
                event.0
            }
        }
    };
}

// === Connection Events ===

/// READY event payload
///
/// Sent after successful Identify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyEvent {
    /// Gateway protocol version
    pub v: u8,

    /// Current user
    pub user: User,

    /// Guilds the user is in; they arrive later as GUILD_CREATE
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,

    /// Session ID for resuming
    pub session_id: String,

    /// Gateway URL to use when resuming
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_gateway_url: Option<String>,

    /// `[shard_id, shard_count]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
}

/// RESUMED event payload
///
/// Carries nothing useful; `d` may be an object or null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ResumedEvent {}

impl<'de> Deserialize<'de> for ResumedEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde::de::IgnoredAny::deserialize(deserializer)?;
        Ok(Self {})
    }
}

// === Guild Events ===

entity_event!(
    /// GUILD_CREATE: lazy-loaded after READY, or a newly joined guild
    GuildCreateEvent(Guild)
);

entity_event!(GuildUpdateEvent(Guild));

entity_event!(
    /// GUILD_DELETE: `unavailable` false means the user left or was removed
    GuildDeleteEvent(UnavailableGuild)
);

// === Channel Events ===

entity_event!(ChannelCreateEvent(Channel));
entity_event!(ChannelUpdateEvent(Channel));
entity_event!(ChannelDeleteEvent(Channel));

// === Message Events ===

entity_event!(MessageCreateEvent(Message));

/// MESSAGE_UPDATE payload; only the changed fields are guaranteed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdateEvent {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub author: Option<User>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub edited_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeleteEvent {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
}

// === Reaction Events ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReactionAddEvent {
    pub user_id: Snowflake,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub member: Option<GuildMember>,
    pub emoji: Emoji,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReactionRemoveEvent {
    pub user_id: Snowflake,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub emoji: Emoji,
}

// === Member Events ===

/// GUILD_MEMBER_ADD: a member object plus the guild it joined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildMemberAddEvent {
    pub guild_id: Snowflake,
    #[serde(flatten)]
    pub member: GuildMember,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildMemberUpdateEvent {
    pub guild_id: Snowflake,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    pub user: User,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildMemberRemoveEvent {
    pub guild_id: Snowflake,
    pub user: User,
}

// === Presence Events ===

/// Presence updates only guarantee the user ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialUser {
    pub id: Snowflake,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdateEvent {
    pub user: PartialUser,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingStartEvent {
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub user_id: Snowflake,
    /// Unix time in seconds
    pub timestamp: u64,
    #[serde(default)]
    pub member: Option<GuildMember>,
}

// === User Events ===

entity_event!(UserUpdateEvent(User));
