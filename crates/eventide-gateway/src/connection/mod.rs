//! Gateway connection management
//!
//! The live socket, session state that outlives it, the heartbeat loop, the
//! handshake, and close notification.

mod close;
mod connection;
mod handshake;
pub(crate) mod heartbeat;
mod session;

pub use close::{CloseNotifier, CloseReason};
pub use connection::Connection;
pub(crate) use connection::{WsSink, WsSource, WsStream};
pub(crate) use handshake::Handshake;
pub use handshake::HandshakeState;
pub use session::SessionStore;
