//! MFP client and connection manager.
//!
//! The [`Client`] owns the connection lifecycle: it runs the handshake, opens
//! the realtime channel, starts the keepalive monitor, and reconnects after
//! unexpected closes.
//!
//! # Example
//!
//! ```no_run
//! use mfp_client::{Action, Client, ClientConfig, ClientEvent, EventFilter};
//!
//! # async fn example() -> mfp_client::Result<()> {
//! let config = ClientConfig::builder()
//!     .host("127.0.0.1")
//!     .port(23333)
//!     .token("secret-token")
//!     .build()?;
//!
//! let client = Client::new(config)?;
//! client.subscribe(EventFilter::Close, |event| {
//!     if let ClientEvent::Close(close) = event {
//!         println!("closed: {} {}", close.code, close.reason);
//!     }
//! });
//!
//! client.connect().await?;
//! let response = client.execute_action(Action::Ping, None).await?;
//! assert!(response.is_ok());
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::{
    Action, ActionResponse, CLOSE_CODE_NORMAL, ClientEvent, CloseEvent, DELIBERATE_CLOSE_REASON,
    Diagnostic, ServerDescriptor,
};
use crate::transport::{
    Connection, EventDispatcher, EventFilter, KeepaliveHandle, TransportClosed, dial,
};

use super::config::{ClientConfig, Credentials};
use super::handshake::{CredentialHandshake, Handshake, HandshakeContext};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on how long [`Client::close`] waits for the close to land.
const CLOSE_WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Handshake or transport open in progress.
    HandshakeInProgress,
    /// Transport open; actions may be issued.
    Open,
    /// Local close requested, waiting for the transport to end.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::HandshakeInProgress => "handshake",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Types
// ============================================================================

/// Per-session bookkeeping.
#[derive(Default)]
struct Session {
    /// Bumped by every connect attempt; identifies the live connection.
    generation: u64,
    /// Bumped by connects and deliberate closes; cancels pending reconnects.
    epoch: u64,
    connection: Option<Connection>,
    keepalive: Option<KeepaliveHandle>,
    descriptor: Option<ServerDescriptor>,
}

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    config: RwLock<ClientConfig>,
    handshake: Arc<dyn Handshake>,
    http: reqwest::Client,
    dispatcher: Arc<EventDispatcher>,
    state_tx: watch::Sender<ConnectionState>,
    session: Mutex<Session>,
    /// Serializes manual and automatic connects.
    connect_lock: tokio::sync::Mutex<()>,
}

// ============================================================================
// Client
// ============================================================================

/// Persistent connection to an MFP server.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

// ============================================================================
// Client - Display
// ============================================================================

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.config.read().endpoint())
            .field("state", &self.state())
            .field("pending_actions", &self.pending_actions())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Construction
// ============================================================================

impl Client {
    /// Creates a client using the credential-driven handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_handshake(config, CredentialHandshake)
    }

    /// Creates a client with a custom handshake strategy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn with_handshake(config: ClientConfig, handshake: impl Handshake + 'static) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            inner: Arc::new(ClientInner {
                config: RwLock::new(config),
                handshake: Arc::new(handshake),
                http,
                dispatcher: Arc::new(EventDispatcher::new()),
                state_tx,
                session: Mutex::new(Session::default()),
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        })
    }
}

// ============================================================================
// Client - Lifecycle
// ============================================================================

impl Client {
    /// Connects using the configured connect timeout.
    ///
    /// A live connection is retired first.
    ///
    /// # Errors
    ///
    /// - [`Error::Handshake`] if the handshake is rejected
    /// - [`Error::ConnectTimeout`] if the transport does not open in time
    /// - [`Error::Transport`] if the transport fails before opening
    pub async fn connect(&self) -> Result<()> {
        let connect_timeout = self.inner.config.read().connect_timeout;
        self.connect_with_timeout(connect_timeout).await
    }

    /// Connects with an explicit bound on opening the transport.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with_timeout(&self, connect_timeout: Duration) -> Result<()> {
        let _permit = self.inner.connect_lock.lock().await;
        self.inner.establish(connect_timeout).await
    }

    /// Closes the connection deliberately. No reconnect follows.
    ///
    /// Waits, bounded, until the close has been processed.
    pub async fn close(&self) {
        let _permit = self.inner.connect_lock.lock().await;

        let connection = {
            let mut session = self.inner.session.lock();
            session.epoch += 1;
            session.keepalive = None;
            session.descriptor = None;
            session.connection.clone()
        };

        let Some(connection) = connection else {
            debug!("Close requested with no live connection");
            return;
        };

        let mut state_rx = self.inner.state_tx.subscribe();
        self.inner.state_tx.send_if_modified(|state| {
            let open = *state == ConnectionState::Open;
            if open {
                *state = ConnectionState::Closing;
            }
            open
        });

        debug!("Closing connection");
        connection.close(CLOSE_CODE_NORMAL, DELIBERATE_CLOSE_REASON);

        let timed_out = tokio::time::timeout(
            CLOSE_WAIT,
            state_rx.wait_for(|state| *state == ConnectionState::Disconnected),
        )
        .await
        .is_err();
        if timed_out {
            warn!(wait_ms = CLOSE_WAIT.as_millis() as u64, "Close did not complete in time");
        }
    }
}

// ============================================================================
// Client - State
// ============================================================================

impl Client {
    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Returns `true` if the transport is open.
    #[inline]
    #[must_use]
    pub fn connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns `true` if there is no transport at all.
    #[inline]
    #[must_use]
    pub fn closed(&self) -> bool {
        self.state() == ConnectionState::Disconnected
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Descriptor cached for the current session, if any.
    #[must_use]
    pub fn server_descriptor(&self) -> Option<ServerDescriptor> {
        self.inner.session.lock().descriptor.clone()
    }

    /// Number of actions awaiting a response.
    #[must_use]
    pub fn pending_actions(&self) -> usize {
        self.inner
            .session
            .lock()
            .connection
            .as_ref()
            .map_or(0, Connection::pending_count)
    }

    /// Snapshot of the configuration.
    #[must_use]
    pub fn config(&self) -> ClientConfig {
        self.inner.config.read().clone()
    }

    /// Replaces credentials for the next handshake.
    ///
    /// The live connection is unaffected. See
    /// [`ClientConfig::set_credentials`] for how the correlation field follows.
    pub fn set_credentials(&self, credentials: Credentials) {
        self.inner.config.write().set_credentials(credentials);
    }
}

// ============================================================================
// Client - Actions
// ============================================================================

impl Client {
    /// Executes an action and waits for its response.
    ///
    /// `params` defaults to `{}`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the client is not open
    /// - [`Error::ConnectionLost`] if the connection closes first
    pub async fn execute_action(
        &self,
        action: impl Into<Action>,
        params: Option<Value>,
    ) -> Result<ActionResponse> {
        self.execute(action.into(), params, None).await
    }

    /// Executes an action with a bound on the wait.
    ///
    /// # Errors
    ///
    /// Same as [`execute_action`](Self::execute_action), plus
    /// [`Error::ActionTimeout`] once `action_timeout` elapses. The request is
    /// forgotten at that point and a late response is ignored.
    pub async fn execute_action_with_timeout(
        &self,
        action: impl Into<Action>,
        params: Option<Value>,
        action_timeout: Duration,
    ) -> Result<ActionResponse> {
        self.execute(action.into(), params, Some(action_timeout)).await
    }

    async fn execute(
        &self,
        action: Action,
        params: Option<Value>,
        action_timeout: Option<Duration>,
    ) -> Result<ActionResponse> {
        let connection = self.live_connection().ok_or(Error::NotConnected)?;
        connection.execute(action, params, action_timeout).await
    }

    fn live_connection(&self) -> Option<Connection> {
        if !self.connected() {
            return None;
        }
        self.inner.session.lock().connection.clone()
    }
}

// ============================================================================
// Client - Events
// ============================================================================

impl Client {
    /// Registers a handler for events matching `filter`.
    ///
    /// Handlers run in registration order on the connection's event loop and
    /// must not block. A panicking handler is logged and skipped.
    pub fn subscribe<F>(&self, filter: impl Into<EventFilter>, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.inner.dispatcher.subscribe(filter.into(), handler)
    }

    /// Registers a handler by event name (`"open"`, `"close"`, a server
    /// event name, or `"*"`).
    pub fn on<F>(&self, name: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        self.subscribe(EventFilter::from(name), handler)
    }

    /// Removes a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.dispatcher.unsubscribe(id)
    }
}

// ============================================================================
// ClientInner - Connect Sequence
// ============================================================================

impl ClientInner {
    /// Runs handshake, open and keepalive start. Caller holds `connect_lock`.
    async fn establish(self: &Arc<Self>, connect_timeout: Duration) -> Result<()> {
        let config = self.config.read().clone();

        let (generation, previous, cached) = {
            let mut session = self.session.lock();
            session.generation += 1;
            session.epoch += 1;
            session.keepalive = None;
            (
                session.generation,
                session.connection.take(),
                session.descriptor.clone(),
            )
        };

        if let Some(previous) = previous {
            debug!(generation, "Retiring previous connection");
            previous.close(CLOSE_CODE_NORMAL, DELIBERATE_CLOSE_REASON);
        }

        self.state_tx.send_replace(ConnectionState::HandshakeInProgress);
        debug!(endpoint = %config.endpoint(), generation, "Connecting");

        let (connection, closed_rx) = match self.open(&config, cached, connect_timeout).await {
            Ok(opened) => opened,
            Err(e) => {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                debug!(error = %e, "Connect failed");
                return Err(e);
            }
        };

        self.session.lock().connection = Some(connection.clone());
        self.state_tx.send_replace(ConnectionState::Open);
        info!(endpoint = %config.endpoint(), generation, "Connected to server");
        self.dispatcher.dispatch(&ClientEvent::Open);

        self.session.lock().keepalive = Some(KeepaliveHandle::start(connection, config.keepalive));
        tokio::spawn(watch_close(Arc::downgrade(self), generation, closed_rx));

        Ok(())
    }

    /// Handshake then transport open.
    async fn open(
        &self,
        config: &ClientConfig,
        cached: Option<ServerDescriptor>,
        connect_timeout: Duration,
    ) -> Result<(Connection, oneshot::Receiver<TransportClosed>)> {
        let outcome = self
            .handshake
            .perform(HandshakeContext {
                http: &self.http,
                config,
                cached: cached.as_ref(),
            })
            .await?;

        if let Some(descriptor) = outcome.descriptor {
            info!(
                server = %descriptor.name,
                version = %descriptor.version,
                api_version = descriptor.api_version,
                "Server info"
            );
            self.session.lock().descriptor = Some(descriptor.clone());
            self.dispatcher.dispatch(&ClientEvent::Info(descriptor));
        }

        let url = config.ws_url(&outcome.token)?;
        let ws = dial(&url, connect_timeout).await?;

        Ok(Connection::spawn(
            ws,
            config.correlation_field,
            Arc::clone(&self.dispatcher),
        ))
    }
}

// ============================================================================
// ClientInner - Close Handling
// ============================================================================

/// Waits for the transport to end, then hands off to the client if it is
/// still alive.
async fn watch_close(
    inner: Weak<ClientInner>,
    generation: u64,
    closed_rx: oneshot::Receiver<TransportClosed>,
) {
    let closed = closed_rx.await.unwrap_or_else(|_| TransportClosed::abnormal());
    if let Some(inner) = inner.upgrade() {
        inner.handle_close(generation, closed);
    }
}

impl ClientInner {
    fn handle_close(self: &Arc<Self>, generation: u64, closed: TransportClosed) {
        let current = {
            let mut session = self.session.lock();
            let current = session.generation == generation;
            if current {
                session.keepalive = None;
                session.connection = None;
            }
            current
        };

        if !current {
            debug!(generation, code = closed.code, "Retired connection closed");
            self.dispatcher.dispatch(&ClientEvent::Close(CloseEvent {
                reconnect: false,
                code: closed.code,
                reason: closed.reason,
                was_clean: closed.was_clean,
            }));
            return;
        }

        let reconnect = self.config.read().reconnect && closed.reason != DELIBERATE_CLOSE_REASON;
        if !reconnect {
            self.session.lock().descriptor = None;
        }

        self.state_tx.send_replace(ConnectionState::Disconnected);
        info!(
            code = closed.code,
            reason = %closed.reason,
            was_clean = closed.was_clean,
            reconnect,
            "Disconnected from server"
        );

        self.dispatcher.dispatch(&ClientEvent::Close(CloseEvent {
            reconnect,
            code: closed.code,
            reason: closed.reason,
            was_clean: closed.was_clean,
        }));

        if reconnect {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let epoch = self.session.lock().epoch;
        let delay = self.config.read().reconnect_policy.delay();
        let inner = Arc::downgrade(self);

        tokio::spawn(async move {
            if !delay.is_zero() {
                debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
                tokio::time::sleep(delay).await;
            }

            let Some(inner) = inner.upgrade() else {
                return;
            };
            let _permit = inner.connect_lock.lock().await;

            let superseded = {
                let session = inner.session.lock();
                session.epoch != epoch
            };
            if superseded {
                debug!("Reconnect superseded");
                return;
            }

            info!("Reconnecting to server");
            let connect_timeout = inner.config.read().connect_timeout;
            if let Err(e) = inner.establish(connect_timeout).await {
                warn!(error = %e, "Reconnect failed");
                inner.dispatcher.report(Diagnostic::ReconnectFailed {
                    error: e.to_string(),
                });
            }
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
