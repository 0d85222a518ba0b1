//! Role entity - a guild role

use serde::{Deserialize, Serialize};

use crate::value_objects::Snowflake;

/// Role object as embedded in guild payloads
///
/// Permissions are kept as the raw decimal string the gateway sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub permissions: String,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub mentionable: bool,
}

impl Role {
    /// Parse the permission bitmask, zero when absent or malformed
    pub fn permission_bits(&self) -> u64 {
        self.permissions.parse().unwrap_or(0)
    }

    /// The @everyone role shares its ID with the guild
    pub fn is_everyone(&self, guild_id: Snowflake) -> bool {
        self.id == guild_id
    }
}
