//! Gateway client configuration
//!
//! Built in code through the builder methods, or loaded from `EVENTIDE_*`
//! environment variables (a `.env` file is honoured).

use std::env;
use std::time::Duration;

use eventide_core::Intents;
use serde::{Deserialize, Serialize};

const TOKEN_PREFIX: &str = "Bot ";
const LIBRARY_NAME: &str = "eventide";

/// Connection properties reported in the Identify payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    #[serde(rename = "$os")]
    pub os: String,
    #[serde(rename = "$browser")]
    pub browser: String,
    #[serde(rename = "$device")]
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: env::consts::OS.to_string(),
            browser: LIBRARY_NAME.to_string(),
            device: LIBRARY_NAME.to_string(),
        }
    }
}

impl ConnectionProperties {
    #[must_use]
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    #[must_use]
    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = browser.into();
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }
}

/// Everything the gateway client needs to open and keep a session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bot token, always carrying the `Bot ` prefix
    pub token: String,
    pub intents: Intents,
    /// Ask the gateway for zlib-compressed payloads
    pub compress: bool,
    pub properties: ConnectionProperties,
    /// Member count above which offline members are not sent (50-250)
    pub large_threshold: Option<u32>,
    /// `[shard_id, shard_count]`
    pub shard: Option<[u32; 2]>,
    /// REST base used to look up the gateway URL
    pub api_base: String,
    /// Fixed gateway URL; skips the REST lookup when set
    pub gateway_url: Option<String>,
    /// Bound on the dial and on each handshake read
    pub handshake_timeout: Duration,
    /// Upper bound on handler invocations running at once
    pub max_concurrent_handlers: usize,
    /// Timeout for the gateway URL lookup
    pub http_timeout: Duration,
}

// Default value functions
fn default_api_base() -> String {
    "https://discord.com/api/v9".to_string()
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_concurrent_handlers() -> usize {
    128
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Prefix a raw token with `Bot ` unless it already has it
fn normalize_token(token: &str) -> String {
    let token = token.trim();
    if token.starts_with(TOKEN_PREFIX) {
        token.to_string()
    } else {
        format!("{TOKEN_PREFIX}{token}")
    }
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the token
    pub fn new(token: impl AsRef<str>) -> Self {
        Self {
            token: normalize_token(token.as_ref()),
            intents: Intents::default(),
            compress: true,
            properties: ConnectionProperties::default(),
            large_threshold: None,
            shard: None,
            api_base: default_api_base(),
            gateway_url: None,
            handshake_timeout: default_handshake_timeout(),
            max_concurrent_handlers: default_max_concurrent_handlers(),
            http_timeout: default_http_timeout(),
        }
    }

    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = intents;
        self
    }

    #[must_use]
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: ConnectionProperties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn with_large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = Some(threshold.clamp(50, 250));
        self
    }

    #[must_use]
    pub fn with_shard(mut self, id: u32, count: u32) -> Self {
        self.shard = Some([id, count]);
        self
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Zero is raised to one so handlers can always make progress
    #[must_use]
    pub fn with_max_concurrent_handlers(mut self, max: usize) -> Self {
        self.max_concurrent_handlers = max.max(1);
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `EVENTIDE_TOKEN` is missing or a variable is malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key/value source; `from_env` passes the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("EVENTIDE_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingVar("EVENTIDE_TOKEN"))?;

        let mut config = Self::new(token);

        if let Some(bits) = parse_var::<u64>(&lookup, "EVENTIDE_INTENTS")? {
            config.intents = Intents::from_bits_retain(bits);
        }
        if let Some(raw) = lookup("EVENTIDE_COMPRESS") {
            config.compress = parse_bool(&raw)
                .ok_or(ConfigError::InvalidValue("EVENTIDE_COMPRESS", raw))?;
        }
        if let Some(url) = lookup("EVENTIDE_GATEWAY_URL").filter(|u| !u.is_empty()) {
            config = config.with_gateway_url(url);
        }
        if let Some(base) = lookup("EVENTIDE_API_BASE").filter(|u| !u.is_empty()) {
            config = config.with_api_base(base);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "EVENTIDE_HANDSHAKE_TIMEOUT_MS")? {
            config.handshake_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var::<usize>(&lookup, "EVENTIDE_MAX_CONCURRENT_HANDLERS")? {
            config = config.with_max_concurrent_handlers(max);
        }
        if let Some(threshold) = parse_var::<u32>(&lookup, "EVENTIDE_LARGE_THRESHOLD")? {
            config = config.with_large_threshold(threshold);
        }

        Ok(config)
    }

    /// Token with the `Bot ` prefix removed, for log-safe display
    pub fn redacted_token(&self) -> String {
        let raw = self.token.trim_start_matches(TOKEN_PREFIX);
        let visible: String = raw.chars().take(4).collect();
        format!("{visible}***")
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
