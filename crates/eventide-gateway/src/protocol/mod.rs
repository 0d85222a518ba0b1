//! Gateway protocol definitions
//!
//! Op codes, close codes, frame shapes, payloads and the frame codec.

pub mod codec;
mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::GatewayCloseCode;
pub use codec::{DecodeError, FrameKind, Inbound};
pub use messages::{Command, Envelope};
pub use opcodes::OpCode;
pub use payloads::{
    Activity, HelloPayload, IdentifyPayload, PresenceUpdatePayload, ResumePayload, Status,
};
