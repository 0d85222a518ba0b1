//! Frame codec
//!
//! Text frames carry JSON. Binary frames carry zlib-compressed JSON and are
//! inflated before parsing.

use std::io::Read;

use flate2::read::ZlibDecoder;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::{Command, Envelope};

/// How the frame's bytes were framed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

/// Frame decode errors
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("zlib decompression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("malformed gateway payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// A decoded WebSocket message
#[derive(Debug)]
pub enum Inbound {
    /// A gateway frame
    Payload(Envelope),
    /// Ping/pong or raw frames; tungstenite answers pings itself
    Control,
    /// The peer closed the socket
    Closed(Option<CloseFrame<'static>>),
}

/// Decode raw frame bytes into an envelope
pub fn decode(kind: FrameKind, bytes: &[u8]) -> Result<Envelope, DecodeError> {
    match kind {
        FrameKind::Text => Ok(serde_json::from_slice(bytes)?),
        FrameKind::Binary => {
            let inflated = inflate(bytes)?;
            Ok(serde_json::from_slice(&inflated)?)
        }
    }
}

fn inflate(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(bytes.len() * 4);
    ZlibDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(DecodeError::Compression)?;
    Ok(out)
}

/// Decode a WebSocket message
pub fn decode_message(message: Message) -> Result<Inbound, DecodeError> {
    match message {
        Message::Text(text) => decode(FrameKind::Text, text.as_bytes()).map(Inbound::Payload),
        Message::Binary(bytes) => decode(FrameKind::Binary, &bytes).map(Inbound::Payload),
        Message::Close(frame) => Ok(Inbound::Closed(frame)),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(Inbound::Control),
    }
}

/// Encode an outbound command as a text frame; outbound frames are never compressed
pub fn encode(command: &Command) -> Result<Message, serde_json::Error> {
    command.to_json().map(Message::Text)
}
