//! Listen loop
//!
//! One loop per connection generation. Reads frames in arrival order, routes
//! them by op code, and decides what happens when the socket goes away.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

use super::supervisor::ClientInner;
use crate::connection::{heartbeat, CloseReason, Connection, WsSource};
use crate::protocol::{codec, Command, Envelope, GatewayCloseCode, Inbound, OpCode};

/// Why a loop generation stopped reading
#[derive(Debug)]
enum Exit {
    /// The generation was closed by someone else
    Cancelled,
    /// Read error or end of stream
    Lost,
    /// The server sent a close frame
    ClosedByServer(Option<CloseFrame<'static>>),
    /// Op 7
    ReconnectRequested,
}

pub(crate) async fn run(
    inner: Arc<ClientInner>,
    connection: Arc<Connection>,
    mut stream: WsSource,
    reconnect_requested: bool,
) {
    let generation = connection.generation();
    tracing::debug!(generation, "Listen loop started");

    let exit = if reconnect_requested {
        Exit::ReconnectRequested
    } else {
        read_until_exit(&inner, &connection, &mut stream).await
    };

    tracing::debug!(generation, exit = ?exit, "Listen loop stopped");
    handle_exit(inner, connection, exit).await;
}

async fn read_until_exit(
    inner: &ClientInner,
    connection: &Connection,
    stream: &mut WsSource,
) -> Exit {
    let generation = connection.generation();
    loop {
        let next = tokio::select! {
            biased;
            () = connection.cancelled() => break Exit::Cancelled,
            next = stream.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::warn!(generation, error = %e, "Error reading gateway frame");
                break Exit::Lost;
            }
            None => {
                tracing::warn!(generation, "Gateway stream ended");
                break Exit::Lost;
            }
        };

        match codec::decode_message(message) {
            Ok(Inbound::Payload(envelope)) => {
                if route(inner, connection, &envelope).await {
                    break Exit::ReconnectRequested;
                }
            }
            Ok(Inbound::Control) => {}
            Ok(Inbound::Closed(frame)) => break Exit::ClosedByServer(frame),
            Err(e) => tracing::error!(generation, error = %e, "Skipping undecodable frame"),
        }
    }
}

/// Act on one decoded frame; returns true when the server asked for a reconnect
pub(crate) async fn route(
    inner: &ClientInner,
    connection: &Connection,
    envelope: &Envelope,
) -> bool {
    let generation = connection.generation();
    tracing::trace!(generation, frame = %envelope, payload = envelope.raw_payload(), "Received");

    match envelope.op {
        OpCode::Dispatch => inner.handle_dispatch(envelope),
        OpCode::Heartbeat => {
            tracing::debug!(generation, "Heartbeat requested by gateway");
            heartbeat::send(connection, &inner.session).await;
        }
        OpCode::HeartbeatAck => {
            let latency = connection.record_heartbeat_ack();
            tracing::debug!(generation, latency = ?latency, "Heartbeat acknowledged");
        }
        OpCode::InvalidSession => {
            let resumable = envelope.as_invalid_session().unwrap_or(false);
            tracing::warn!(generation, resumable, "Invalid session, identifying again");
            if let Err(e) = connection
                .send(&Command::Identify(inner.identify.clone()))
                .await
            {
                tracing::error!(generation, error = %e, "Failed to send identify");
            }
        }
        OpCode::Reconnect => {
            tracing::info!(generation, "Gateway requested reconnect");
            return true;
        }
        op => tracing::warn!(generation, op = %op, "Ignoring unexpected op code"),
    }
    false
}

async fn handle_exit(inner: Arc<ClientInner>, connection: Arc<Connection>, exit: Exit) {
    let generation = connection.generation();

    match exit {
        Exit::Cancelled => return,
        Exit::Lost | Exit::ReconnectRequested => {}
        Exit::ClosedByServer(frame) => {
            let code = frame.as_ref().map(|f| u16::from(f.code));
            let gateway_code = code.and_then(GatewayCloseCode::from_u16);
            tracing::warn!(
                generation,
                code = ?code,
                reason = frame.as_ref().map_or("", |f| &*f.reason),
                description = gateway_code.map(GatewayCloseCode::description),
                server_resumable = gateway_code.map(GatewayCloseCode::can_resume),
                "Gateway closed the connection"
            );

            if let Some(gateway_code) = gateway_code.filter(|c| !c.should_reconnect()) {
                if inner.is_current(&connection) {
                    tracing::error!(
                        generation,
                        code = %gateway_code,
                        "Close code is terminal, not reconnecting"
                    );
                    if let Err(e) = inner.close(CloseReason::Normal).await {
                        tracing::debug!(error = %e, "Error closing after terminal close code");
                    }
                }
                return;
            }
        }
    }

    if !inner.is_current(&connection) {
        tracing::debug!(generation, "Connection superseded, exiting without reconnect");
        return;
    }

    if let Err(e) = Arc::clone(&inner).reconnect(Some(connection)).await {
        tracing::error!(generation, error = %e, "Reconnect failed, giving up");
    }
}
