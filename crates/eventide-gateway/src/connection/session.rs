//! Session state shared across connection generations
//!
//! Survives reconnects so the next handshake can resume. Only an explicit
//! reset clears it.

use parking_lot::RwLock;

use crate::protocol::ResumePayload;

#[derive(Debug, Default, Clone)]
struct SessionState {
    session_id: Option<String>,
    last_sequence: Option<u64>,
    gateway_url: Option<String>,
    resume_gateway_url: Option<String>,
}

/// Session ID, last sequence and gateway URLs
#[derive(Debug, Default)]
pub struct SessionStore {
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.read().session_id.clone()
    }

    pub fn set_session_id(&self, session_id: impl Into<String>) {
        self.state.write().session_id = Some(session_id.into());
    }

    /// Whether the next handshake should resume
    pub fn can_resume(&self) -> bool {
        self.state.read().session_id.is_some()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.state.read().last_sequence
    }

    /// Record the sequence of the dispatch frame just processed
    pub fn set_sequence(&self, seq: u64) {
        self.state.write().last_sequence = Some(seq);
    }

    pub fn gateway_url(&self) -> Option<String> {
        self.state.read().gateway_url.clone()
    }

    pub fn set_gateway_url(&self, url: impl Into<String>) {
        self.state.write().gateway_url = Some(url.into());
    }

    pub fn resume_gateway_url(&self) -> Option<String> {
        self.state.read().resume_gateway_url.clone()
    }

    pub fn set_resume_gateway_url(&self, url: Option<String>) {
        self.state.write().resume_gateway_url = url;
    }

    /// URL for the next dial: the resume URL while a session is resumable,
    /// otherwise the cached gateway URL
    pub fn dial_url(&self) -> Option<String> {
        let state = self.state.read();
        match (&state.session_id, &state.resume_gateway_url) {
            (Some(_), Some(resume)) => Some(resume.clone()),
            _ => state.gateway_url.clone(),
        }
    }

    /// Resume body for the cached session, if there is one
    pub fn resume_payload(&self, token: &str) -> Option<ResumePayload> {
        let state = self.state.read();
        state.session_id.as_ref().map(|session_id| ResumePayload {
            token: token.to_string(),
            session_id: session_id.clone(),
            seq: state.last_sequence.unwrap_or(0),
        })
    }

    /// Forget the session so the next handshake identifies from scratch
    ///
    /// The cached gateway URL is kept.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.session_id = None;
        state.last_sequence = None;
        state.resume_gateway_url = None;
    }
}
