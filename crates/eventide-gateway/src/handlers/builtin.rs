//! Built-in state handlers
//!
//! Keep the client's view of the current user and its guilds up to date.
//! They run before any user handler sees the event.

use dashmap::DashMap;
use eventide_core::{Guild, Snowflake, User};
use parking_lot::RwLock;

use crate::client::resolver::with_gateway_query;
use crate::connection::SessionStore;
use crate::events::{Event, EventKind};

/// Cached client-observable state
#[derive(Debug, Default)]
pub struct ClientCache {
    user: RwLock<Option<User>>,
    guilds: DashMap<Snowflake, Guild>,
}

impl ClientCache {
    /// Kinds the built-in handlers consume; always decoded
    pub const TRACKED: [EventKind; 6] = [
        EventKind::Ready,
        EventKind::Resumed,
        EventKind::GuildCreate,
        EventKind::GuildUpdate,
        EventKind::GuildDelete,
        EventKind::UserUpdate,
    ];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_user(&self) -> Option<User> {
        self.user.read().clone()
    }

    pub fn guild(&self, id: Snowflake) -> Option<Guild> {
        self.guilds.get(&id).map(|g| g.value().clone())
    }

    pub fn guilds(&self) -> Vec<Guild> {
        self.guilds.iter().map(|g| g.value().clone()).collect()
    }

    pub fn guild_count(&self) -> usize {
        self.guilds.len()
    }

    /// Apply an event to the cache and session
    pub(crate) fn apply(&self, event: &Event, session: &SessionStore) {
        match event {
            Event::Ready(ready) => {
                *self.user.write() = Some(ready.user.clone());
                session.set_session_id(ready.session_id.clone());
                session.set_resume_gateway_url(
                    ready.resume_gateway_url.as_deref().map(with_gateway_query),
                );
                tracing::info!(
                    session_id = %ready.session_id,
                    user = %ready.user.tag(),
                    guilds = ready.guilds.len(),
                    "Session ready"
                );
            }
            Event::UserUpdate(user) => {
                *self.user.write() = Some(user.0.clone());
            }
            Event::GuildCreate(guild) => self.upsert_guild(guild),
            Event::GuildUpdate(guild) => self.upsert_guild(guild),
            Event::GuildDelete(deleted) => {
                self.guilds.remove(&deleted.id);
                tracing::debug!(
                    guild_id = %deleted.id,
                    unavailable = deleted.unavailable,
                    "Guild removed"
                );
            }
            _ => {}
        }
    }

    fn upsert_guild(&self, guild: &Guild) {
        self.guilds.insert(guild.id, guild.clone());
        tracing::debug!(guild_id = %guild.id, name = %guild.name, "Guild cached");
    }
}
