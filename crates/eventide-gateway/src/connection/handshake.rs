//! Identify/resume handshake
//!
//! hello (op 10) -> identify or resume -> first dispatch. Any socket error,
//! undecodable frame or timeout before the first dispatch aborts the connect.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::timeout;

use super::connection::WsSource;
use super::{Connection, SessionStore};
use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{codec, Command, Envelope, HelloPayload, IdentifyPayload, Inbound, OpCode};

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    SocketOpen,
    HelloReceived,
    Identifying,
    Resuming,
    AwaitingFirstDispatch,
    SteadyState,
}

impl HandshakeState {
    /// Whether `next` is a legal successor
    fn allows(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::SocketOpen)
                | (Self::SocketOpen, Self::HelloReceived)
                | (Self::HelloReceived, Self::Identifying | Self::Resuming)
                | (Self::Identifying | Self::Resuming, Self::AwaitingFirstDispatch)
                | (Self::AwaitingFirstDispatch, Self::SteadyState)
        )
    }
}

/// What the handshake produced
#[derive(Debug)]
pub(crate) struct HandshakeOutcome {
    pub hello: HelloPayload,
    /// First frame after identify/resume; must still be dispatched
    pub first: Envelope,
    pub resumed: bool,
}

/// The two frames that open a session
///
/// Identify is chosen when no session is cached, resume otherwise.
pub(crate) fn opening_command(session: &SessionStore, identify: &IdentifyPayload) -> Command {
    match session.resume_payload(&identify.token) {
        Some(resume) => Command::Resume(resume),
        None => Command::Identify(identify.clone()),
    }
}

pub(crate) struct Handshake<'a> {
    connection: &'a Connection,
    stream: &'a mut WsSource,
    read_timeout: Duration,
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    /// Start from a freshly dialed socket
    pub fn new(
        connection: &'a Connection,
        stream: &'a mut WsSource,
        read_timeout: Duration,
    ) -> Self {
        let mut handshake = Self {
            connection,
            stream,
            read_timeout,
            state: HandshakeState::Idle,
        };
        handshake.advance(HandshakeState::SocketOpen);
        handshake
    }

    fn advance(&mut self, next: HandshakeState) {
        debug_assert!(self.state.allows(next), "{:?} -> {next:?}", self.state);
        tracing::trace!(
            generation = self.connection.generation(),
            from = ?self.state,
            to = ?next,
            "Handshake transition"
        );
        self.state = next;
    }

    /// Drive the handshake to steady state
    pub async fn run(
        mut self,
        session: &SessionStore,
        identify: &IdentifyPayload,
    ) -> GatewayResult<HandshakeOutcome> {
        let hello_frame = self.next_envelope("hello").await?;
        let hello = if hello_frame.op == OpCode::Hello {
            hello_frame
                .payload::<HelloPayload>()
                .map_err(|e| GatewayError::Handshake(format!("malformed hello: {e}")))?
        } else {
            tracing::warn!(op = %hello_frame.op, "Expected hello as first frame, continuing");
            HelloPayload::default()
        };
        self.advance(HandshakeState::HelloReceived);

        let command = opening_command(session, identify);
        let resumed = matches!(command, Command::Resume(_));
        self.advance(if resumed {
            HandshakeState::Resuming
        } else {
            HandshakeState::Identifying
        });

        tracing::info!(
            generation = self.connection.generation(),
            command = %command,
            heartbeat_interval_ms = hello.interval().as_millis() as u64,
            "Opening session"
        );
        self.connection.send(&command).await?;
        self.advance(HandshakeState::AwaitingFirstDispatch);

        let first = self.next_envelope("first dispatch").await?;
        let expected = if resumed { "RESUMED" } else { "READY" };
        match first.event_name() {
            Some(name) if name == expected => {}
            other => tracing::warn!(
                expected,
                op = %first.op,
                event = ?other,
                "Unexpected first frame after handshake, continuing"
            ),
        }
        self.advance(HandshakeState::SteadyState);

        Ok(HandshakeOutcome {
            hello,
            first,
            resumed,
        })
    }

    /// Read the next gateway frame, skipping control frames
    async fn next_envelope(&mut self, stage: &'static str) -> GatewayResult<Envelope> {
        loop {
            let message = timeout(self.read_timeout, self.stream.next())
                .await
                .map_err(|_| GatewayError::HandshakeTimeout(stage))?
                .ok_or(GatewayError::ConnectionClosed)??;

            match codec::decode_message(message)? {
                Inbound::Payload(envelope) => return Ok(envelope),
                Inbound::Control => continue,
                Inbound::Closed(Some(frame)) => {
                    return Err(GatewayError::ClosedByServer {
                        code: frame.code.into(),
                        reason: frame.reason.into_owned(),
                    })
                }
                Inbound::Closed(None) => return Err(GatewayError::ConnectionClosed),
            }
        }
    }
}
