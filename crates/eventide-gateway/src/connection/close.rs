//! Close reasons and close notification

use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

/// Why a connection generation was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Requested by the user, or the session cannot continue; terminal
    Normal,
    /// Internal reconnect; a new connection follows and resumes the session
    ServiceRestart,
}

impl CloseReason {
    /// WebSocket close code sent to the server
    pub fn close_code(self) -> CloseCode {
        match self {
            Self::Normal => CloseCode::Normal,
            Self::ServiceRestart => CloseCode::Restart,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Normal)
    }

    pub(crate) fn frame(self) -> CloseFrame<'static> {
        CloseFrame {
            code: self.close_code(),
            reason: match self {
                Self::Normal => "normal closure".into(),
                Self::ServiceRestart => "reconnecting".into(),
            },
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::ServiceRestart => f.write_str("service restart"),
        }
    }
}

/// Fan-out of close reasons to any number of observers
///
/// Observers that subscribe after a close do not see it.
#[derive(Debug, Clone)]
pub struct CloseNotifier {
    tx: broadcast::Sender<CloseReason>,
}

impl CloseNotifier {
    const CAPACITY: usize = 16;

    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(Self::CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CloseReason> {
        self.tx.subscribe()
    }

    /// Broadcast a close; having no observers is fine
    pub fn notify(&self, reason: CloseReason) {
        let receivers = self.tx.send(reason).unwrap_or(0);
        tracing::debug!(reason = %reason, receivers, "Close broadcast");
    }
}

impl Default for CloseNotifier {
    fn default() -> Self {
        Self::new()
    }
}
