//! Connection supervisor
//!
//! Owns the live connection slot and serializes connect/reconnect. Close
//! reasons are broadcast only when a live connection was actually torn down,
//! which keeps disconnect idempotent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use eventide_common::ClientConfig;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;

use super::listener;
use super::resolver::GatewayUrlResolver;
use crate::connection::{
    heartbeat, CloseNotifier, CloseReason, Connection, Handshake, SessionStore, WsSink,
    WsStream,
};
use crate::error::{GatewayError, GatewayResult};
use crate::events::EventError;
use crate::handlers::{ClientCache, Dispatcher, HandlerRegistry};
use crate::protocol::{Command, Envelope, IdentifyPayload};

pub(crate) struct ClientInner {
    pub config: ClientConfig,
    pub identify: IdentifyPayload,
    pub resolver: Arc<dyn GatewayUrlResolver>,
    pub session: Arc<SessionStore>,
    pub cache: Arc<ClientCache>,
    pub handlers: Arc<HandlerRegistry>,
    pub dispatcher: Dispatcher,
    pub closes: CloseNotifier,

    /// Live connection, if any
    slot: RwLock<Option<Arc<Connection>>>,

    /// Held for the whole of a connect or reconnect
    connect_gate: Mutex<()>,

    generation: AtomicU64,
}

impl ClientInner {
    pub fn new(
        config: ClientConfig,
        identify: IdentifyPayload,
        resolver: Arc<dyn GatewayUrlResolver>,
        session: Arc<SessionStore>,
        cache: Arc<ClientCache>,
        handlers: Arc<HandlerRegistry>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            config,
            identify,
            resolver,
            session,
            cache,
            handlers,
            dispatcher,
            closes: CloseNotifier::new(),
            slot: RwLock::new(None),
            connect_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Option<Arc<Connection>> {
        self.slot.read().clone()
    }

    /// Whether `connection` is still the live generation
    pub fn is_current(&self, connection: &Arc<Connection>) -> bool {
        self.slot
            .read()
            .as_ref()
            .is_some_and(|live| Arc::ptr_eq(live, connection))
    }

    /// Dial, handshake and start the background loops
    pub async fn connect(self: &Arc<Self>) -> GatewayResult<()> {
        let gate = self
            .connect_gate
            .try_lock()
            .map_err(|_| GatewayError::AlreadyConnecting)?;
        self.connect_locked(&gate, false).await
    }

    /// Connect while holding the gate
    ///
    /// With `announce_failure` a failed attempt always broadcasts exactly one
    /// normal closure, even when it failed before a socket was installed.
    async fn connect_locked(
        self: &Arc<Self>,
        _gate: &MutexGuard<'_, ()>,
        announce_failure: bool,
    ) -> GatewayResult<()> {
        if self.slot.read().is_some() {
            return Err(GatewayError::AlreadyConnected);
        }

        match self.open().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "Connect failed");
                match self.teardown(CloseReason::Normal).await {
                    Ok(false) if announce_failure => self.closes.notify(CloseReason::Normal),
                    Ok(_) => {}
                    Err(close_err) => {
                        tracing::debug!(error = %close_err, "Cleanup after failed connect");
                    }
                }
                Err(e)
            }
        }
    }

    async fn gateway_url(&self) -> GatewayResult<String> {
        if let Some(url) = self.session.dial_url() {
            return Ok(url);
        }
        let url = self.resolver.resolve().await?;
        self.session.set_gateway_url(url.clone());
        Ok(url)
    }

    pub(crate) async fn dial(&self, url: &str) -> GatewayResult<WsStream> {
        let (socket, _response) = timeout(self.config.handshake_timeout, connect_async(url))
            .await
            .map_err(|_| GatewayError::HandshakeTimeout("socket dial"))??;
        Ok(socket)
    }

    async fn open(self: &Arc<Self>) -> GatewayResult<()> {
        let url = self.gateway_url().await?;
        tracing::info!(url = %url, resume = self.session.can_resume(), "Connecting to gateway");

        let socket = self.dial(&url).await?;
        let (sink, mut stream) = socket.split();
        let connection = self.install(sink);
        let generation = connection.generation();

        let outcome = Handshake::new(&connection, &mut stream, self.config.handshake_timeout)
            .run(&self.session, &self.identify)
            .await?;

        heartbeat::spawn(
            Arc::clone(&connection),
            Arc::clone(&self.session),
            outcome.hello.interval(),
        );

        // The first frame may be a heartbeat request or invalid session
        let reconnect_requested = listener::route(self, &connection, &outcome.first).await;

        tracing::info!(
            generation,
            resumed = outcome.resumed,
            session_id = ?self.session.session_id(),
            "Gateway session established"
        );

        tokio::spawn(listener::run(
            Arc::clone(self),
            connection,
            stream,
            reconnect_requested,
        ));
        Ok(())
    }

    /// Make a fresh generation the live connection
    pub(crate) fn install(&self, sink: WsSink) -> Arc<Connection> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let connection = Connection::new(generation, sink);
        *self.slot.write() = Some(Arc::clone(&connection));
        connection
    }

    /// Record the sequence and hand a dispatch frame to the pipeline
    ///
    /// Failures are logged; the frame is skipped.
    pub fn handle_dispatch(&self, envelope: &Envelope) {
        if !envelope.is_dispatch() {
            return;
        }
        if let Some(seq) = envelope.s {
            self.session.set_sequence(seq);
        }

        match self.dispatcher.dispatch(envelope) {
            Ok(_) => {}
            Err(EventError::UnknownEvent { name, .. }) => {
                tracing::warn!(event = %name, seq = ?envelope.s, "Skipping unknown event");
            }
            Err(e) => tracing::error!(error = %e, seq = ?envelope.s, "Dropping dispatch frame"),
        }
    }

    /// Take the live connection down
    ///
    /// No-op when nothing is connected.
    pub async fn close(&self, reason: CloseReason) -> GatewayResult<()> {
        self.teardown(reason).await.map(|_| ())
    }

    /// Returns whether a live connection was taken down and announced
    async fn teardown(&self, reason: CloseReason) -> GatewayResult<bool> {
        let Some(connection) = self.slot.write().take() else {
            return Ok(false);
        };

        tracing::info!(
            generation = connection.generation(),
            reason = %reason,
            "Closing gateway connection"
        );
        self.closes.notify(reason);
        connection.close(reason).await.map(|()| true)
    }

    /// Close with service restart and connect again, resuming the session
    ///
    /// `stale` is the generation that asked for the reconnect; if it has
    /// already been replaced the call does nothing.
    pub fn reconnect(
        self: Arc<Self>,
        stale: Option<Arc<Connection>>,
    ) -> BoxFuture<'static, GatewayResult<()>> {
        async move {
            let gate = self.connect_gate.lock().await;

            if let Some(stale) = &stale {
                if !self.is_current(stale) {
                    tracing::debug!(
                        generation = stale.generation(),
                        "Connection already replaced, skipping reconnect"
                    );
                    return Ok(());
                }
            }

            if let Err(e) = self.close(CloseReason::ServiceRestart).await {
                tracing::warn!(error = %e, "Error closing connection before reconnect");
            }
            self.connect_locked(&gate, true).await
        }
        .boxed()
    }

    /// Send a command on the live connection
    pub async fn send(&self, command: &Command) -> GatewayResult<()> {
        let connection = self.current().ok_or(GatewayError::NotConnected)?;
        connection.send(command).await
    }
}

impl std::fmt::Debug for ClientInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientInner")
            .field("connection", &self.current())
            .field("session", &self.session)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}
