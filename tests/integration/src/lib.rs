//! Integration test utilities for the gateway client
//!
//! A scripted mock gateway plus frame fixtures, used to drive a real client
//! over a loopback WebSocket.

pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
