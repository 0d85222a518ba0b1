//! User entity - an account as seen over the gateway

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// User object carried by READY, USER_UPDATE, messages and members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub email: Option<String>,
}

impl User {
    /// Create a user with only the required fields set
    pub fn new(id: Snowflake, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            discriminator: "0".to_string(),
            global_name: None,
            avatar: None,
            bot: false,
            system: false,
            verified: None,
            email: None,
        }
    }

    /// Get the full tag: username#discriminator, or just the username for
    /// accounts migrated off discriminators
    pub fn tag(&self) -> String {
        if self.discriminator.is_empty() || self.discriminator == "0" {
            self.username.clone()
        } else {
            format!("{}#{}", self.username, self.discriminator)
        }
    }

    /// Name shown in clients
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }

    /// Get avatar path or default avatar path
    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => format!("/avatars/{}/{}.png", self.id, hash),
            None => format!("/embed/avatars/{}.png", self.default_avatar_index()),
        }
    }

    fn default_avatar_index(&self) -> u64 {
        match self.discriminator.parse::<u64>() {
            Ok(0) | Err(_) => (self.id.into_inner() >> 22) % 6,
            Ok(d) => d % 5,
        }
    }

    #[inline]
    pub fn is_bot(&self) -> bool {
        self.bot
    }
}
