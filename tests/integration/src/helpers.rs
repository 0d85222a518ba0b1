//! Test helpers for integration tests
//!
//! A scripted mock gateway: an axum server exposing the WebSocket endpoint
//! and the REST gateway lookup on a loopback port. Each accepted socket is
//! handed to the test, which plays the server side frame by frame.

use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use eventide_common::ClientConfig;
use eventide_gateway::Client;
use flate2::{write::ZlibEncoder, Compression};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::fixtures;

/// Token every test client is configured with
pub const TEST_TOKEN: &str = "test-token";

/// Upper bound on any single wait in a test
pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct MockState {
    sockets: mpsc::UnboundedSender<WebSocket>,
    ws_url: String,
}

/// Mock gateway server
pub struct MockGateway {
    pub addr: SocketAddr,
    sockets: mpsc::UnboundedReceiver<WebSocket>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    /// Start a mock gateway on an ephemeral port
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let (tx, sockets) = mpsc::unbounded_channel();
        let state = MockState {
            sockets: tx,
            ws_url: format!("ws://{addr}/gateway"),
        };

        let app = Router::new()
            .route("/gateway", get(upgrade))
            .route("/api/gateway", get(lookup))
            .with_state(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            sockets,
            _handle: handle,
        })
    }

    /// WebSocket URL of the mock
    pub fn ws_url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// REST base serving `GET /gateway`
    pub fn api_base(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    /// Client configuration pointing straight at the WebSocket endpoint
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(TEST_TOKEN)
            .with_gateway_url(self.ws_url())
            .with_handshake_timeout(WAIT)
    }

    pub fn client(&self) -> Result<Client> {
        Ok(Client::new(self.config())?)
    }

    /// Wait for the next client socket
    pub async fn accept(&mut self) -> Result<MockConnection> {
        let socket = tokio::time::timeout(WAIT, self.sockets.recv())
            .await
            .context("timed out waiting for a client connection")?
            .ok_or_else(|| anyhow!("mock gateway stopped"))?;
        Ok(MockConnection { socket })
    }

    /// Assert that no client connects within `window`
    pub async fn expect_no_connection(&mut self, window: Duration) -> Result<()> {
        match tokio::time::timeout(window, self.sockets.recv()).await {
            Err(_) => Ok(()),
            Ok(Some(_)) => bail!("unexpected client connection"),
            Ok(None) => bail!("mock gateway stopped"),
        }
    }
}

async fn upgrade(State(state): State<MockState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let _ = state.sockets.send(socket);
    })
}

async fn lookup(State(state): State<MockState>, headers: HeaderMap) -> impl IntoResponse {
    let expected = format!("Bot {TEST_TOKEN}");
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);

    if authorized {
        (StatusCode::OK, Json(json!({ "url": state.ws_url })))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "401: Unauthorized", "code": 0 })),
        )
    }
}

/// Server side of one client socket
pub struct MockConnection {
    socket: WebSocket,
}

impl MockConnection {
    /// Send a JSON frame as text
    pub async fn send_json(&mut self, value: Value) -> Result<()> {
        self.socket.send(Message::Text(value.to_string())).await?;
        Ok(())
    }

    /// Send a JSON frame zlib-compressed in a binary message
    pub async fn send_zlib(&mut self, value: Value) -> Result<()> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(value.to_string().as_bytes())?;
        self.socket.send(Message::Binary(encoder.finish()?)).await?;
        Ok(())
    }

    pub async fn hello(&mut self, interval_ms: u64) -> Result<()> {
        self.send_json(fixtures::hello(interval_ms)).await
    }

    pub async fn dispatch(&mut self, event: &str, seq: u64, d: Value) -> Result<()> {
        self.send_json(fixtures::dispatch(event, seq, d)).await
    }

    /// Close with a gateway close code
    pub async fn close(&mut self, code: u16, reason: &'static str) -> Result<()> {
        self.socket
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })))
            .await?;
        Ok(())
    }

    /// Next JSON frame from the client
    pub async fn recv_json(&mut self) -> Result<Value> {
        loop {
            let message = tokio::time::timeout(WAIT, self.socket.recv())
                .await
                .context("timed out waiting for a client frame")?
                .ok_or_else(|| anyhow!("client socket ended"))??;

            match message {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(frame) => {
                    bail!("client closed the socket: {:?}", frame.map(|f| f.code))
                }
                _ => continue,
            }
        }
    }

    /// Next frame with the given op code; other frames are skipped
    pub async fn recv_op(&mut self, op: u64) -> Result<Value> {
        loop {
            let frame = self.recv_json().await?;
            if frame["op"] == op {
                return Ok(frame);
            }
        }
    }

    /// Wait for the client's close frame; returns its code
    ///
    /// `None` if the socket ended without one.
    pub async fn expect_close(&mut self) -> Result<Option<u16>> {
        loop {
            let next = tokio::time::timeout(WAIT, self.socket.recv())
                .await
                .context("timed out waiting for the client to close")?;
            match next {
                Some(Ok(Message::Close(frame))) => return Ok(frame.map(|f| f.code)),
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return Ok(None),
            }
        }
    }

    /// Hello, expect identify, answer READY with sequence 1
    ///
    /// Returns the identify frame.
    pub async fn accept_identify(&mut self, session_id: &str) -> Result<Value> {
        self.hello(fixtures::SLOW_HEARTBEAT_MS).await?;
        let identify = self.recv_json().await?;
        if identify["op"] != 2 {
            bail!("expected identify, got {identify}");
        }
        self.dispatch("READY", 1, fixtures::ready(session_id)).await?;
        Ok(identify)
    }

    /// Hello, expect resume, answer RESUMED with the given sequence
    ///
    /// Returns the resume frame.
    pub async fn accept_resume(&mut self, seq: u64) -> Result<Value> {
        self.hello(fixtures::SLOW_HEARTBEAT_MS).await?;
        let resume = self.recv_json().await?;
        if resume["op"] != 6 {
            bail!("expected resume, got {resume}");
        }
        self.dispatch("RESUMED", seq, Value::Null).await?;
        Ok(resume)
    }
}

/// Connect a client and complete a fresh identify with the given session ID
pub async fn connect_client(
    gateway: &mut MockGateway,
    client: &Client,
    session_id: &str,
) -> Result<MockConnection> {
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut connection = gateway.accept().await?;
    connection.accept_identify(session_id).await?;
    connecting.await??;
    Ok(connection)
}

/// Poll `check` until it holds
pub async fn eventually(what: &str, check: impl Fn() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}
