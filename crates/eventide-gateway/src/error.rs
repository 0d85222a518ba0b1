//! Gateway client errors

use eventide_common::ConfigError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::protocol::{DecodeError, GatewayCloseCode};

/// Errors surfaced by `connect`, `disconnect` and command sends
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway lookup failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway lookup returned {status}: {body}")]
    Rest { status: u16, body: String },

    #[error("WebSocket transport error: {0}")]
    Transport(Box<tungstenite::Error>),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Timed out waiting for {0}")]
    HandshakeTimeout(&'static str),

    #[error("Gateway closed the connection ({code}): {reason}")]
    ClosedByServer { code: u16, reason: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Another connect is already in progress")]
    AlreadyConnecting,
}

impl From<tungstenite::Error> for GatewayError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::ConnectionClosed
            }
            other => Self::Transport(Box::new(other)),
        }
    }
}

impl GatewayError {
    /// Gateway close code carried by a server close, if any
    pub fn close_code(&self) -> Option<GatewayCloseCode> {
        match self {
            Self::ClosedByServer { code, .. } => GatewayCloseCode::from_u16(*code),
            _ => None,
        }
    }

    /// Whether retrying the same connect can never succeed
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Rest { status: 401 | 403, .. })
            || self.close_code().is_some_and(|code| !code.should_reconnect())
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
