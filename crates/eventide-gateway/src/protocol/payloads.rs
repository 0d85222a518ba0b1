//! Handshake and control payloads
//!
//! Bodies carried in the `d` field of non-dispatch frames.

use std::time::Duration;

use eventide_common::{ClientConfig, ConnectionProperties};
use eventide_core::Intents;
use serde::{Deserialize, Serialize};

/// Payload for op 10 (Hello)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    #[serde(default)]
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    /// Used when the server omits the interval or sends zero
    pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 41_250;

    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }

    /// Heartbeat period, never zero
    pub fn interval(&self) -> Duration {
        let ms = if self.heartbeat_interval == 0 {
            Self::DEFAULT_HEARTBEAT_INTERVAL
        } else {
            self.heartbeat_interval
        };
        Duration::from_millis(ms)
    }
}

impl Default for HelloPayload {
    fn default() -> Self {
        Self::with_interval(Self::DEFAULT_HEARTBEAT_INTERVAL)
    }
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub token: String,
    pub intents: Intents,
    pub properties: ConnectionProperties,
    /// Whether dispatch payloads may arrive zlib-compressed
    #[serde(default)]
    pub compress: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub large_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub shard: Option<[u32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub presence: Option<PresenceUpdatePayload>,
}

impl IdentifyPayload {
    /// Build from client configuration
    pub fn from_config(config: &ClientConfig, presence: Option<PresenceUpdatePayload>) -> Self {
        Self {
            token: config.token.clone(),
            intents: config.intents,
            properties: config.properties.clone(),
            compress: config.compress,
            large_threshold: config.large_threshold,
            shard: config.shard,
            presence,
        }
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    pub token: String,
    pub session_id: String,
    /// Last sequence number received, zero if none
    pub seq: u64,
}

/// Online status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Online,
    /// Do not disturb
    Dnd,
    Idle,
    /// Shown as offline
    Invisible,
    Offline,
}

/// Activity shown under the bot's name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    /// 0 playing, 1 streaming, 2 listening, 3 watching, 5 competing
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub url: Option<String>,
}

impl Activity {
    pub fn playing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 0,
            url: None,
        }
    }

    pub fn listening(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 2,
            url: None,
        }
    }

    pub fn watching(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: 3,
            url: None,
        }
    }
}

/// Payload for op 3 (Presence Update), also embedded in Identify
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PresenceUpdatePayload {
    /// Unix millis when the client went idle
    pub since: Option<u64>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    pub status: Status,
    #[serde(default)]
    pub afk: bool,
}

impl PresenceUpdatePayload {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.activities.push(activity);
        self
    }
}
