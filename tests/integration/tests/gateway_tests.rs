//! Gateway client integration tests
//!
//! Each test drives a real client against the scripted mock gateway on a
//! loopback port; no external services are needed.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::{Duration, Instant};

use eventide_core::{Intents, Snowflake};
use eventide_gateway::events::{GuildCreateEvent, MessageCreateEvent};
use eventide_gateway::protocol::{Activity, PresenceUpdatePayload, Status};
use eventide_gateway::{Client, CloseReason, GatewayError};
use integration_tests::*;
use serde_json::{json, Value};
use tokio::sync::{broadcast::error::TryRecvError, mpsc};

type TestResult = anyhow::Result<()>;

/// Forward the ID of every MESSAGE_CREATE to a channel
fn message_ids(client: &Client) -> mpsc::UnboundedReceiver<Snowflake> {
    let (tx, rx) = mpsc::unbounded_channel();
    client
        .add_handler(move |msg: MessageCreateEvent| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg.id);
            }
        })
        .unwrap();
    rx
}

async fn next_id(rx: &mut mpsc::UnboundedReceiver<Snowflake>) -> anyhow::Result<Snowflake> {
    tokio::time::timeout(WAIT, rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("handler channel closed"))
}

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_identify_then_ready() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut conn = gateway.accept().await?;
    let identify = conn.accept_identify("abc").await?;
    connecting.await??;

    let d = &identify["d"];
    assert_eq!(d["token"], "Bot test-token");
    assert_eq!(d["intents"], Intents::default().bits());
    assert_eq!(d["properties"]["$browser"], "eventide");
    assert_eq!(d["compress"], true);

    assert!(client.is_connected());
    assert_eq!(client.session_id().as_deref(), Some("abc"));
    assert_eq!(client.last_sequence(), Some(1));
    assert_eq!(client.generation(), Some(1));

    let user = client.current_user().expect("user cached from READY");
    assert_eq!(user.username, "eventide-bot");
    assert!(user.bot);
    Ok(())
}

#[tokio::test]
async fn test_compressed_frames() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut ids = message_ids(&client);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut conn = gateway.accept().await?;
    conn.send_zlib(hello(SLOW_HEARTBEAT_MS)).await?;
    conn.recv_op(2).await?;
    conn.send_zlib(dispatch("READY", 1, ready("zz"))).await?;
    connecting.await??;

    conn.send_zlib(dispatch("MESSAGE_CREATE", 2, message(42, "packed")))
        .await?;
    assert_eq!(next_id(&mut ids).await?, Snowflake::new(42));
    assert_eq!(client.session_id().as_deref(), Some("zz"));
    assert_eq!(client.last_sequence(), Some(2));
    Ok(())
}

#[tokio::test]
async fn test_tolerates_unexpected_first_dispatch() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut ids = message_ids(&client);

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut conn = gateway.accept().await?;
    conn.hello(SLOW_HEARTBEAT_MS).await?;
    conn.recv_op(2).await?;
    conn.dispatch("MESSAGE_CREATE", 1, message(7, "early")).await?;
    connecting.await??;

    // The first frame is dispatched, not dropped
    assert_eq!(next_id(&mut ids).await?, Snowflake::new(7));
    assert!(client.session_id().is_none());
    Ok(())
}

#[tokio::test]
async fn test_handshake_timeout() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let config = gateway
        .config()
        .with_handshake_timeout(Duration::from_millis(200));
    let client = Client::new(config)?;

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    // Accept the socket but never say hello
    let mut conn = gateway.accept().await?;
    let err = connecting.await?.unwrap_err();
    assert!(matches!(err, GatewayError::HandshakeTimeout("hello")));

    assert_eq!(conn.expect_close().await?, Some(1000));
    assert!(!client.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_closed_during_handshake() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut conn = gateway.accept().await?;
    conn.hello(SLOW_HEARTBEAT_MS).await?;
    conn.recv_op(2).await?;
    conn.close(4004, "Authentication failed").await?;

    let err = connecting.await?.unwrap_err();
    assert_eq!(err.close_code().map(|c| c.as_u16()), Some(4004));
    assert!(err.is_fatal());
    assert!(!client.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_rejects_overlapping_connects() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    // The first connect is parked waiting for hello
    let mut conn = gateway.accept().await?;
    assert!(matches!(
        client.connect().await,
        Err(GatewayError::AlreadyConnecting)
    ));

    conn.accept_identify("abc").await?;
    connecting.await??;

    assert!(matches!(
        client.connect().await,
        Err(GatewayError::AlreadyConnected)
    ));
    Ok(())
}

#[tokio::test]
async fn test_presence_in_identify_and_update() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = Client::builder(gateway.config())
        .presence(PresenceUpdatePayload::new(Status::Idle).with_activity(Activity::playing("tests")))
        .build()?;

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut conn = gateway.accept().await?;
    let identify = conn.accept_identify("abc").await?;
    connecting.await??;

    assert_eq!(identify["d"]["presence"]["status"], "idle");
    assert_eq!(identify["d"]["presence"]["activities"][0]["name"], "tests");

    client
        .send_presence(PresenceUpdatePayload::new(Status::Dnd))
        .await?;
    let update = conn.recv_op(3).await?;
    assert_eq!(update["d"]["status"], "dnd");
    Ok(())
}

// ============================================================================
// Gateway URL lookup
// ============================================================================

#[tokio::test]
async fn test_gateway_url_from_rest() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let config = eventide_common::ClientConfig::new(TEST_TOKEN)
        .with_api_base(gateway.api_base())
        .with_handshake_timeout(WAIT);
    let client = Client::new(config)?;

    connect_client(&mut gateway, &client, "abc").await?;
    assert_eq!(client.session_id().as_deref(), Some("abc"));
    Ok(())
}

#[tokio::test]
async fn test_gateway_lookup_rejected() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let config = eventide_common::ClientConfig::new("wrong-token")
        .with_api_base(gateway.api_base())
        .with_handshake_timeout(WAIT);
    let client = Client::new(config)?;

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, GatewayError::Rest { status: 401, .. }));
    assert!(err.is_fatal());
    gateway
        .expect_no_connection(Duration::from_millis(200))
        .await?;
    Ok(())
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_sequence_tracks_latest_dispatch() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut ids = message_ids(&client);
    let mut conn = connect_client(&mut gateway, &client, "abc").await?;

    for seq in 2..=4 {
        conn.dispatch("MESSAGE_CREATE", seq, message(seq, "hi")).await?;
    }
    let mut seen = Vec::new();
    for _ in 2..=4 {
        seen.push(next_id(&mut ids).await?);
    }
    seen.sort();
    assert_eq!(seen, vec![Snowflake::new(2), Snowflake::new(3), Snowflake::new(4)]);
    assert_eq!(client.last_sequence(), Some(4));

    // A beat requested after frame 4 carries 4
    conn.send_json(heartbeat_request()).await?;
    let beat = conn.recv_op(1).await?;
    assert_eq!(beat["d"], 4);
    Ok(())
}

#[tokio::test]
async fn test_unknown_event_does_not_stop_dispatch() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut ids = message_ids(&client);
    let mut conn = connect_client(&mut gateway, &client, "abc").await?;

    conn.dispatch("SOMETHING_NEW", 2, json!({ "x": 1 })).await?;
    conn.send_json(json!({ "op": 0, "s": 3, "t": "MESSAGE_CREATE", "d": { "broken": true } }))
        .await?;
    conn.send_json(json!("not an envelope")).await?;
    conn.dispatch("MESSAGE_CREATE", 4, message(4, "after")).await?;

    assert_eq!(next_id(&mut ids).await?, Snowflake::new(4));
    assert_eq!(client.last_sequence(), Some(4));
    assert!(client.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_builtin_guild_cache() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let observer = client.clone();
    client.add_handler(move |guild: GuildCreateEvent| {
        // Built-ins have already run when user handlers see the event
        let cached = observer.guild(guild.id).is_some();
        let tx = tx.clone();
        async move {
            let _ = tx.send(cached);
        }
    })?;

    let mut conn = connect_client(&mut gateway, &client, "abc").await?;

    conn.dispatch("GUILD_CREATE", 2, guild(10, "Test Guild")).await?;
    let cached = tokio::time::timeout(WAIT, rx.recv()).await?;
    assert_eq!(cached, Some(true));

    let stored = client.guild(Snowflake::new(10)).expect("guild cached");
    assert_eq!(stored.name, "Test Guild");

    conn.dispatch("GUILD_UPDATE", 3, guild(10, "Renamed")).await?;
    eventually("guild rename", || {
        client
            .guild(Snowflake::new(10))
            .is_some_and(|g| g.name == "Renamed")
    })
    .await?;

    conn.dispatch("GUILD_DELETE", 4, json!({ "id": "10", "unavailable": false }))
        .await?;
    eventually("guild removal", || client.guilds().is_empty()).await?;
    Ok(())
}

// ============================================================================
// Heartbeat
// ============================================================================

#[tokio::test]
async fn test_heartbeat_cadence() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut conn = gateway.accept().await?;
    conn.hello(100).await?;
    conn.recv_op(2).await?;
    conn.dispatch("READY", 1, ready("abc")).await?;
    connecting.await??;

    let first = conn.recv_op(1).await?;
    assert_eq!(first["d"], 1);
    let start = Instant::now();
    for _ in 0..4 {
        let beat = conn.recv_op(1).await?;
        assert_eq!(beat["d"], 1);
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(300), "too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "too slow: {elapsed:?}");
    Ok(())
}

#[tokio::test]
async fn test_heartbeat_on_request() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut conn = connect_client(&mut gateway, &client, "abc").await?;

    let start = Instant::now();
    conn.send_json(heartbeat_request()).await?;
    let beat = conn.recv_op(1).await?;
    assert_eq!(beat["d"], 1);
    assert!(start.elapsed() < Duration::from_secs(1));
    Ok(())
}

#[tokio::test]
async fn test_heartbeat_request_before_ready() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut conn = gateway.accept().await?;
    conn.hello(SLOW_HEARTBEAT_MS).await?;
    conn.recv_op(2).await?;
    conn.send_json(heartbeat_request()).await?;
    connecting.await??;

    let beat = conn.recv_op(1).await?;
    assert_eq!(beat["d"], Value::Null);

    conn.dispatch("READY", 1, ready("abc")).await?;
    eventually("session", || client.session_id().as_deref() == Some("abc")).await?;
    Ok(())
}

#[tokio::test]
async fn test_heartbeat_ack_latency() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut conn = connect_client(&mut gateway, &client, "abc").await?;
    assert!(client.latency().is_none());

    conn.send_json(heartbeat_request()).await?;
    conn.recv_op(1).await?;
    conn.send_json(json!({ "op": 11 })).await?;

    eventually("heartbeat latency", || client.latency().is_some()).await?;
    Ok(())
}

// ============================================================================
// Disconnect and resume
// ============================================================================

#[tokio::test]
async fn test_disconnect_is_idempotent() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut closes = client.subscribe_close();
    let mut conn = connect_client(&mut gateway, &client, "abc").await?;

    client.disconnect().await?;
    assert_eq!(conn.expect_close().await?, Some(1000));
    client.disconnect().await?;

    assert!(!client.is_connected());
    assert_eq!(closes.recv().await?, CloseReason::Normal);
    assert!(matches!(closes.try_recv(), Err(TryRecvError::Empty)));

    // Session survives a disconnect
    assert_eq!(client.session_id().as_deref(), Some("abc"));
    gateway
        .expect_no_connection(Duration::from_millis(300))
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_connect_after_disconnect_resumes() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut conn = connect_client(&mut gateway, &client, "abc").await?;

    conn.dispatch("MESSAGE_CREATE", 2, message(2, "hi")).await?;
    eventually("sequence 2", || client.last_sequence() == Some(2)).await?;
    client.disconnect().await?;

    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });
    let mut conn = gateway.accept().await?;
    let resume = conn.accept_resume(3).await?;
    connecting.await??;

    assert_eq!(
        resume["d"],
        json!({ "token": "Bot test-token", "session_id": "abc", "seq": 2 })
    );
    assert_eq!(client.last_sequence(), Some(3));
    assert_eq!(client.generation(), Some(2));
    Ok(())
}

#[tokio::test]
async fn test_reset_session_identifies_again() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    connect_client(&mut gateway, &client, "abc").await?;

    client.disconnect().await?;
    client.reset_session();
    assert!(client.session_id().is_none());
    assert!(client.last_sequence().is_none());

    connect_client(&mut gateway, &client, "def").await?;
    assert_eq!(client.session_id().as_deref(), Some("def"));
    Ok(())
}

#[tokio::test]
async fn test_dropped_socket_resumes() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut closes = client.subscribe_close();
    let conn = connect_client(&mut gateway, &client, "abc").await?;

    drop(conn);

    let mut conn = gateway.accept().await?;
    let resume = conn.accept_resume(2).await?;
    assert_eq!(resume["d"]["session_id"], "abc");
    assert_eq!(resume["d"]["seq"], 1);
    assert_eq!(resume["d"]["token"], "Bot test-token");

    eventually("resumed sequence", || client.last_sequence() == Some(2)).await?;
    assert_eq!(client.session_id().as_deref(), Some("abc"));
    assert_eq!(client.generation(), Some(2));
    assert_eq!(closes.recv().await?, CloseReason::ServiceRestart);

    gateway
        .expect_no_connection(Duration::from_millis(300))
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_failed_reconnect_announces_one_closure() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut closes = client.subscribe_close();
    let conn = connect_client(&mut gateway, &client, "abc").await?;

    drop(conn);

    // The replacement socket is installed, then refused before hello
    let mut conn = gateway.accept().await?;
    conn.close(4004, "Authentication failed").await?;

    assert_eq!(closes.recv().await?, CloseReason::ServiceRestart);
    let reason = tokio::time::timeout(WAIT, closes.recv()).await??;
    assert_eq!(reason, CloseReason::Normal);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(matches!(closes.try_recv(), Err(TryRecvError::Empty)));
    assert!(!client.is_connected());
    gateway
        .expect_no_connection(Duration::from_millis(300))
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_reconnect_does_not_double_fire() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut first = connect_client(&mut gateway, &client, "abc").await?;

    let reconnecting = tokio::spawn({
        let client = client.clone();
        async move { client.reconnect().await }
    });

    assert_eq!(first.expect_close().await?, Some(1012));
    let mut second = gateway.accept().await?;
    let resume = second.accept_resume(2).await?;
    reconnecting.await??;
    assert_eq!(resume["d"]["session_id"], "abc");

    // The old socket going away must not trigger another reconnect
    drop(first);
    gateway
        .expect_no_connection(Duration::from_millis(500))
        .await?;
    assert_eq!(client.generation(), Some(2));
    assert!(client.is_connected());

    second.send_json(heartbeat_request()).await?;
    assert_eq!(second.recv_op(1).await?["d"], 2);
    Ok(())
}

// ============================================================================
// Server-driven control frames
// ============================================================================

#[tokio::test]
async fn test_invalid_session_reidentifies() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut conn = connect_client(&mut gateway, &client, "abc").await?;

    conn.send_json(invalid_session(false)).await?;
    let identify = conn.recv_op(2).await?;
    assert_eq!(identify["d"]["token"], "Bot test-token");
    // Only a new READY replaces the session
    assert_eq!(client.session_id().as_deref(), Some("abc"));

    conn.dispatch("READY", 1, ready("def")).await?;
    eventually("new session", || client.session_id().as_deref() == Some("def")).await?;

    // Same socket throughout
    assert_eq!(client.generation(), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_rejected_resume_reidentifies() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let conn = connect_client(&mut gateway, &client, "abc").await?;

    drop(conn);

    let mut conn = gateway.accept().await?;
    conn.hello(SLOW_HEARTBEAT_MS).await?;
    let resume = conn.recv_json().await?;
    assert_eq!(resume["op"], 6);
    conn.send_json(invalid_session(false)).await?;

    let identify = conn.recv_op(2).await?;
    assert_eq!(identify["d"]["token"], "Bot test-token");
    conn.dispatch("READY", 1, ready("def")).await?;

    eventually("new session", || client.session_id().as_deref() == Some("def")).await?;
    assert_eq!(client.generation(), Some(2));
    Ok(())
}

#[tokio::test]
async fn test_reconnect_request_resumes() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut conn = connect_client(&mut gateway, &client, "abc").await?;

    conn.send_json(reconnect_request()).await?;
    assert_eq!(conn.expect_close().await?, Some(1012));

    let mut conn = gateway.accept().await?;
    let resume = conn.accept_resume(5).await?;
    assert_eq!(resume["d"]["session_id"], "abc");
    eventually("resumed sequence", || client.last_sequence() == Some(5)).await?;
    Ok(())
}

#[tokio::test]
async fn test_terminal_close_code() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut closes = client.subscribe_close();
    let mut conn = connect_client(&mut gateway, &client, "abc").await?;

    conn.close(4014, "Disallowed intent(s)").await?;

    let reason = tokio::time::timeout(WAIT, closes.recv()).await??;
    assert_eq!(reason, CloseReason::Normal);
    gateway
        .expect_no_connection(Duration::from_millis(500))
        .await?;
    assert!(!client.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_session_timeout_close_still_resumes() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut conn = connect_client(&mut gateway, &client, "abc").await?;

    conn.close(4009, "Session timed out").await?;

    // The session is kept; a rejected resume comes back as op 9
    let mut conn = gateway.accept().await?;
    conn.hello(SLOW_HEARTBEAT_MS).await?;
    let resume = conn.recv_json().await?;
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["session_id"], "abc");

    conn.send_json(invalid_session(false)).await?;
    conn.recv_op(2).await?;
    conn.dispatch("READY", 1, ready("def")).await?;
    eventually("new session", || client.session_id().as_deref() == Some("def")).await?;
    Ok(())
}

#[tokio::test]
async fn test_resumable_close_code_resumes() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;
    let mut conn = connect_client(&mut gateway, &client, "abc").await?;

    conn.close(4000, "Unknown error").await?;

    let mut conn = gateway.accept().await?;
    let resume: Value = conn.accept_resume(2).await?;
    assert_eq!(resume["d"]["seq"], 1);
    Ok(())
}

// ============================================================================
// run()
// ============================================================================

#[tokio::test]
async fn test_run_survives_reconnect_and_ends_on_disconnect() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;

    let running = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });

    let mut conn = gateway.accept().await?;
    conn.accept_identify("abc").await?;

    conn.send_json(reconnect_request()).await?;
    let mut conn = gateway.accept().await?;
    conn.accept_resume(2).await?;
    eventually("resumed sequence", || client.last_sequence() == Some(2)).await?;
    assert!(!running.is_finished());

    client.disconnect().await?;
    tokio::time::timeout(WAIT, running).await???;
    Ok(())
}

#[tokio::test]
async fn test_run_ends_on_terminal_close() -> TestResult {
    let mut gateway = MockGateway::start().await?;
    let client = gateway.client()?;

    let running = tokio::spawn({
        let client = client.clone();
        async move { client.run().await }
    });

    let mut conn = gateway.accept().await?;
    conn.accept_identify("abc").await?;
    conn.close(4004, "Authentication failed").await?;

    tokio::time::timeout(WAIT, running).await???;
    assert!(!client.is_connected());
    Ok(())
}
