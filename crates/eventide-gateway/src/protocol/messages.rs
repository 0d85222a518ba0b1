//! Gateway message format
//!
//! Every frame, in either direction, is `{"op", "d", "s", "t"}`. Inbound
//! frames keep `d` as raw JSON until the receiver knows its type.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use super::{IdentifyPayload, OpCode, PresenceUpdatePayload, ResumePayload};

/// Inbound gateway frame with a lazily decoded payload
#[derive(Debug, Deserialize)]
pub struct Envelope {
    /// Operation code
    pub op: OpCode,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default)]
    pub s: Option<u64>,

    /// Event name (only for op=0 Dispatch)
    #[serde(default)]
    pub t: Option<String>,

    /// Undecoded event data
    #[serde(default)]
    pub d: Option<Box<RawValue>>,
}

impl Envelope {
    #[inline]
    pub fn is_dispatch(&self) -> bool {
        self.op == OpCode::Dispatch
    }

    pub fn event_name(&self) -> Option<&str> {
        self.t.as_deref()
    }

    /// Raw JSON text of `d`, `null` when absent
    pub fn raw_payload(&self) -> &str {
        self.d.as_deref().map_or("null", RawValue::get)
    }

    /// Decode `d` into the given type
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.raw_payload())
    }

    /// Whether an Invalid Session (op=9) says the session may be resumed
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.payload::<Option<bool>>().ok().flatten().unwrap_or(false))
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.t, self.s) {
            (Some(t), Some(s)) => write!(f, "{} {t} #{s}", self.op),
            (Some(t), None) => write!(f, "{} {t}", self.op),
            _ => write!(f, "{}", self.op),
        }
    }
}

/// Outbound gateway command
#[derive(Debug, Clone)]
pub enum Command {
    /// op=1, carries the last sequence or null
    Heartbeat(Option<u64>),
    /// op=2
    Identify(IdentifyPayload),
    /// op=3
    PresenceUpdate(PresenceUpdatePayload),
    /// op=6
    Resume(ResumePayload),
}

#[derive(Serialize)]
struct Outbound<'a, T: Serialize> {
    op: OpCode,
    d: &'a T,
}

impl Command {
    pub fn op(&self) -> OpCode {
        match self {
            Self::Heartbeat(_) => OpCode::Heartbeat,
            Self::Identify(_) => OpCode::Identify,
            Self::PresenceUpdate(_) => OpCode::PresenceUpdate,
            Self::Resume(_) => OpCode::Resume,
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let op = self.op();
        match self {
            Self::Heartbeat(seq) => serde_json::to_string(&Outbound { op, d: seq }),
            Self::Identify(p) => serde_json::to_string(&Outbound { op, d: p }),
            Self::PresenceUpdate(p) => serde_json::to_string(&Outbound { op, d: p }),
            Self::Resume(p) => serde_json::to_string(&Outbound { op, d: p }),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Heartbeat(Some(seq)) => write!(f, "{} seq={seq}", self.op()),
            Self::Resume(p) => write!(f, "{} session={} seq={}", self.op(), p.session_id, p.seq),
            _ => write!(f, "{}", self.op()),
        }
    }
}
