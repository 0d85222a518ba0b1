//! One live gateway socket
//!
//! A `Connection` is one generation of the socket. Reconnecting creates a new
//! one; loops that captured an old generation compare against the live slot
//! before acting on a read failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::SinkExt;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::CloseReason;
use crate::error::GatewayResult;
use crate::protocol::{codec, Command};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsSource = SplitStream<WsStream>;

#[derive(Debug, Default)]
struct HeartbeatStats {
    last_sent: Option<Instant>,
    last_ack: Option<Instant>,
    /// False between a heartbeat send and its ACK
    acked: bool,
    latency: Option<Duration>,
}

/// Write half of the socket plus per-generation state
pub struct Connection {
    generation: u64,

    /// The transport forbids concurrent writers
    sink: tokio::sync::Mutex<WsSink>,

    /// Cancelled when this generation is closed; observed by its loops
    closed: CancellationToken,

    heartbeat: Mutex<HeartbeatStats>,

    opened_at: Instant,
}

impl Connection {
    pub(crate) fn new(generation: u64, sink: WsSink) -> Arc<Self> {
        Arc::new(Self {
            generation,
            sink: tokio::sync::Mutex::new(sink),
            closed: CancellationToken::new(),
            heartbeat: Mutex::new(HeartbeatStats {
                acked: true,
                ..HeartbeatStats::default()
            }),
            opened_at: Instant::now(),
        })
    }

    /// Monotonic generation number, starting at 1
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once this generation has been closed
    pub(crate) async fn cancelled(&self) {
        self.closed.cancelled().await;
    }

    /// Encode and send a command
    pub(crate) async fn send(&self, command: &Command) -> GatewayResult<()> {
        let message = codec::encode(command)?;
        tracing::trace!(generation = self.generation, command = %command, "Sending");
        self.sink.lock().await.send(message).await?;
        Ok(())
    }

    /// Stop this generation's loops, send a close frame and shut the socket
    ///
    /// A socket the peer already closed is not an error.
    pub(crate) async fn close(&self, reason: CloseReason) -> GatewayResult<()> {
        self.closed.cancel();

        let mut sink = self.sink.lock().await;
        let sent = sink.send(Message::Close(Some(reason.frame()))).await;
        let closed = sink.close().await;

        match sent.and(closed) {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mark a heartbeat as sent; returns whether the previous one was acknowledged
    pub(crate) fn record_heartbeat_sent(&self) -> bool {
        let mut stats = self.heartbeat.lock();
        let previous_acked = stats.acked;
        stats.last_sent = Some(Instant::now());
        stats.acked = false;
        previous_acked
    }

    /// Record a heartbeat ACK and return the round-trip time
    pub(crate) fn record_heartbeat_ack(&self) -> Option<Duration> {
        let mut stats = self.heartbeat.lock();
        let now = Instant::now();
        stats.last_ack = Some(now);
        stats.acked = true;
        stats.latency = stats.last_sent.map(|sent| now.saturating_duration_since(sent));
        stats.latency
    }

    /// Round-trip time of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        self.heartbeat.lock().latency
    }

    /// Time since the last heartbeat ACK
    pub fn time_since_ack(&self) -> Option<Duration> {
        self.heartbeat.lock().last_ack.map(|at| at.elapsed())
    }

    /// Get connection age
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("generation", &self.generation)
            .field("closed", &self.is_closed())
            .field("latency", &self.latency())
            .field("age", &self.age())
            .finish()
    }
}
