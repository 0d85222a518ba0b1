//! Gateway client
//!
//! `Client` is the public face of the connection supervisor: connect,
//! disconnect, handler registration and read access to session state.

mod listener;
pub mod resolver;
mod supervisor;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use eventide_common::ClientConfig;
use eventide_core::{Guild, Snowflake, User};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::connection::{CloseReason, SessionStore};
use crate::error::GatewayResult;
use crate::events::{DispatchEvent, EventRegistry};
use crate::handlers::{ClientCache, Dispatcher, HandlerRegistry, RegistrationError};
use crate::protocol::{Command, IdentifyPayload, PresenceUpdatePayload};
use resolver::{GatewayUrlResolver, HttpGatewayResolver, StaticGatewayUrl};
use supervisor::ClientInner;

/// Builder for [`Client`]
pub struct ClientBuilder {
    config: ClientConfig,
    resolver: Option<Arc<dyn GatewayUrlResolver>>,
    events: EventRegistry,
    presence: Option<PresenceUpdatePayload>,
}

impl ClientBuilder {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            resolver: None,
            events: EventRegistry::new(),
            presence: None,
        }
    }

    /// Where to get the gateway URL when none is cached
    #[must_use]
    pub fn resolver(mut self, resolver: impl GatewayUrlResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Restrict the decoded event kinds
    ///
    /// The kinds the built-in handlers need are always added.
    #[must_use]
    pub fn event_registry(mut self, events: EventRegistry) -> Self {
        self.events = events;
        self
    }

    /// Presence sent with identify
    #[must_use]
    pub fn presence(mut self, presence: PresenceUpdatePayload) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn build(self) -> GatewayResult<Client> {
        let configured = &self.config.gateway_url;
        let resolver: Arc<dyn GatewayUrlResolver> = match (self.resolver, configured) {
            (Some(resolver), _) => resolver,
            (None, Some(url)) => Arc::new(StaticGatewayUrl::new(url)),
            (None, None) => Arc::new(HttpGatewayResolver::new(&self.config)?),
        };

        let events = Arc::new(EventRegistry::with_kinds(
            self.events.kinds().chain(ClientCache::TRACKED),
        ));
        let handlers = Arc::new(HandlerRegistry::new(Arc::clone(&events)));
        let cache = Arc::new(ClientCache::new());
        let session = Arc::new(SessionStore::new());
        let dispatcher = Dispatcher::new(
            events,
            Arc::clone(&handlers),
            Arc::clone(&cache),
            Arc::clone(&session),
            self.config.max_concurrent_handlers,
        );
        let identify = IdentifyPayload::from_config(&self.config, self.presence);

        tracing::debug!(
            token = %self.config.redacted_token(),
            intents = self.config.intents.bits(),
            compress = self.config.compress,
            "Gateway client built"
        );

        Ok(Client {
            inner: Arc::new(ClientInner::new(
                self.config,
                identify,
                resolver,
                session,
                cache,
                handlers,
                dispatcher,
            )),
        })
    }
}

/// Persistent gateway client
///
/// Cheap to clone; clones share the same connection and state.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Client with the default resolver and all event kinds
    pub fn new(config: ClientConfig) -> GatewayResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Open a connection and complete the handshake
    ///
    /// Resolves once the first dispatch after identify/resume has been read.
    /// Returns `AlreadyConnecting` while another connect or reconnect is in
    /// flight and `AlreadyConnected` while a socket is live. Calling
    /// `disconnect` before this returns is not supported.
    pub async fn connect(&self) -> GatewayResult<()> {
        self.inner.connect().await
    }

    /// Close the connection with a normal closure
    ///
    /// Idempotent. Session state is kept; use [`Client::reset_session`] to
    /// force a fresh identify on the next connect.
    pub async fn disconnect(&self) -> GatewayResult<()> {
        self.inner.close(CloseReason::Normal).await
    }

    /// Close with service restart and connect again, resuming the session
    pub async fn reconnect(&self) -> GatewayResult<()> {
        Arc::clone(&self.inner).reconnect(None).await
    }

    /// Register an async handler for the event type it takes
    pub fn add_handler<E, F, Fut>(&self, handler: F) -> Result<(), RegistrationError>
    where
        E: DispatchEvent,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.handlers.add(handler)
    }

    /// Update presence (op 3)
    pub async fn send_presence(&self, presence: PresenceUpdatePayload) -> GatewayResult<()> {
        self.inner.send(&Command::PresenceUpdate(presence)).await
    }

    /// Close notifications; only closes after subscribing are seen
    pub fn subscribe_close(&self) -> broadcast::Receiver<CloseReason> {
        self.inner.closes.subscribe()
    }

    /// Connect and stay connected until a normal closure or Ctrl-C
    ///
    /// Internal reconnects keep the call waiting.
    pub async fn run(&self) -> GatewayResult<()> {
        let mut closes = self.subscribe_close();
        self.connect().await?;

        let shutdown = await_shutdown_trigger();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                reason = closes.recv() => match reason {
                    Ok(CloseReason::ServiceRestart) => {
                        tracing::debug!("Connection restarting");
                    }
                    Ok(CloseReason::Normal) | Err(RecvError::Closed) => {
                        tracing::info!("Gateway connection closed");
                        return Ok(());
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Missed close notifications");
                    }
                },
                trigger = &mut shutdown => {
                    tracing::info!(trigger, "Shutdown signal received, disconnecting");
                    return self.disconnect().await;
                }
            }
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.session.session_id()
    }

    /// Sequence of the last dispatch frame received
    pub fn last_sequence(&self) -> Option<u64> {
        self.inner.session.last_sequence()
    }

    /// Forget the session so the next connect identifies from scratch
    pub fn reset_session(&self) {
        self.inner.session.reset();
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.cache.current_user()
    }

    pub fn guild(&self, id: Snowflake) -> Option<Guild> {
        self.inner.cache.guild(id)
    }

    pub fn guilds(&self) -> Vec<Guild> {
        self.inner.cache.guilds()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.current().is_some_and(|c| !c.is_closed())
    }

    /// Heartbeat round-trip time on the live connection
    pub fn latency(&self) -> Option<Duration> {
        self.inner.current().and_then(|c| c.latency())
    }

    /// Generation number of the live connection
    pub fn generation(&self) -> Option<u64> {
        self.inner.current().map(|c| c.generation())
    }
}

#[cfg(unix)]
async fn await_shutdown_trigger() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "ctrl-c",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler, using Ctrl-C only");
            ctrl_c_or_never().await
        }
    }
}

#[cfg(not(unix))]
async fn await_shutdown_trigger() -> &'static str {
    ctrl_c_or_never().await
}

async fn ctrl_c_or_never() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "ctrl-c",
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending().await
        }
    }
}
