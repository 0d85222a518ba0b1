//! Heartbeat loop
//!
//! Sends op 1 with the last seen sequence every interval until the connection
//! generation is closed. Send failures are logged only; a dead socket is
//! detected by the listen loop's read path.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::{Connection, SessionStore};
use crate::protocol::Command;

/// Start the heartbeat loop for a connection generation
pub(crate) fn spawn(
    connection: Arc<Connection>,
    session: Arc<SessionStore>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(run(connection, session, period))
}

async fn run(connection: Arc<Connection>, session: Arc<SessionStore>, period: Duration) {
    // The first beat is due one full period after hello
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(
        generation = connection.generation(),
        interval_ms = period.as_millis() as u64,
        "Heartbeat loop started"
    );

    loop {
        tokio::select! {
            biased;
            () = connection.cancelled() => break,
            _ = ticker.tick() => send(&connection, &session).await,
        }
    }

    tracing::debug!(generation = connection.generation(), "Heartbeat loop stopped");
}

/// Send one heartbeat carrying the current last sequence
///
/// Also used for out-of-band beats requested by the server.
pub(crate) async fn send(connection: &Connection, session: &SessionStore) {
    let seq = session.last_sequence();

    if !connection.record_heartbeat_sent() {
        tracing::warn!(
            generation = connection.generation(),
            since_last_ack = ?connection.time_since_ack(),
            "Previous heartbeat was not acknowledged"
        );
    }

    match connection.send(&Command::Heartbeat(seq)).await {
        Ok(()) => {
            tracing::debug!(generation = connection.generation(), seq = ?seq, "Heartbeat sent");
        }
        Err(e) => tracing::warn!(
            generation = connection.generation(),
            error = %e,
            "Failed to send heartbeat"
        ),
    }
}
