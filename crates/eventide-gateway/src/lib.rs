//! # eventide-gateway
//!
//! Persistent client for a real-time chat gateway: handshake, heartbeat,
//! resume and typed event dispatch over one WebSocket connection.

pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod handlers;
pub mod protocol;

pub use client::resolver::{GatewayUrlResolver, HttpGatewayResolver, StaticGatewayUrl};
pub use client::{Client, ClientBuilder};
pub use connection::CloseReason;
pub use error::{GatewayError, GatewayResult};
pub use events::{DispatchEvent, Event, EventKind, EventRegistry};
pub use handlers::RegistrationError;
