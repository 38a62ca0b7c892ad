#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use secrecy::{ExposeSecret as _, SecretString};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;

use super::config::Config;
use super::error::WsError;
use super::events::{
    ErrorEvent, ErrorEventKind, Event, EventKind, Listener, Listeners, Notification,
};
use super::traits::{Transport, TransportEvent, TransportEvents, TransportFactory};
use crate::Result;

/// Close code sent by [`ConnectionManager::disconnect`].
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close reason sent by [`ConnectionManager::disconnect`].
pub const USER_DISCONNECT_REASON: &str = "User disconnected";
/// Close code reported when a socket drops without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, strum_macros::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Waiting for a token or for the transport to open
    Connecting,
    /// Transport is open
    Connected,
    /// Transport failed; a fresh `connect` is required
    Error,
}

impl ConnectionState {
    /// Check if the connection is currently active.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether a connection is open or being established.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

/// Manages the lifecycle of a single real-time connection.
///
/// The manager owns at most one transport at a time, appends the auth token to the endpoint,
/// and republishes transport activity as typed [`Event`]s:
/// - [`Event::StateChange`] on every state transition
/// - [`Event::Message`] for each text frame that parses as JSON
/// - [`Event::Error`] for malformed frames and transport failures
///
/// It never reconnects by itself. Reconnection policy belongs to an observer of
/// [`EventKind::StateChange`] such as [`crate::ws::reconnect::Reconnector`].
///
/// # Example
///
/// ```ignore
/// let config = Config::new("wss://api.aprendecomigo.com/ws/chat/42/")?
///     .with_auth(Arc::new(StaticToken::new(token)));
/// let manager = ConnectionManager::new(config);
///
/// manager.on(EventKind::Message, listener(|event| {
///     if let Event::Message(payload) = event {
///         router.dispatch(payload);
///     }
/// }));
///
/// manager.connect().await?;
/// manager.send(&json!({ "type": "chat_message", "message": "Olá" }))?;
/// ```
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    factory: Box<dyn TransportFactory>,
    shared: Mutex<Shared>,
}

struct Shared {
    state: ConnectionState,
    /// Bumped on every `connect`; events tagged with an older generation are dropped
    generation: u64,
    transport: Option<Arc<dyn Transport>>,
    /// Completion slot of the in-flight `connect`, present until open/error/close
    pending: Option<oneshot::Sender<Result<()>>>,
    /// Set by `disconnect` so the following close is not reported as unexpected
    closing_by_user: bool,
    /// `TransportFactory::open` is running for the current generation
    opening: bool,
    /// The transport reported open before `TransportFactory::open` returned
    opened_early: bool,
    listeners: Listeners,
}

impl Shared {
    fn set_state(&mut self, state: ConnectionState) -> Notification {
        self.state = state;
        self.listeners.notification(Event::StateChange(state))
    }

    fn mark_connected(&mut self) -> (Notification, Option<oneshot::Sender<Result<()>>>) {
        (self.set_state(ConnectionState::Connected), self.pending.take())
    }
}

/// Rolls an attempt back to [`ConnectionState::Disconnected`] if its `connect` future is
/// dropped before the attempt settles.
struct ConnectGuard<'a> {
    manager: &'a ConnectionManager,
    generation: u64,
}

impl Drop for ConnectGuard<'_> {
    fn drop(&mut self) {
        self.manager.abandon(self.generation);
    }
}

impl ConnectionManager {
    /// Create a manager backed by the `tokio-tungstenite` transport. Performs no I/O.
    #[cfg(feature = "tungstenite")]
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_transport(config, super::transport::TungsteniteFactory::default())
    }

    /// Create a manager that opens transports through `factory`. Performs no I/O.
    #[must_use]
    pub fn with_transport<F: TransportFactory>(config: Config, factory: F) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                factory: Box::new(factory),
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    transport: None,
                    pending: None,
                    closing_by_user: false,
                    opening: false,
                    opened_early: false,
                    listeners: Listeners::default(),
                }),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// Register `listener` for events of `kind`.
    ///
    /// Registering the same listener twice makes it fire twice.
    pub fn on(&self, kind: EventKind, listener: Listener) {
        self.lock().listeners.add(kind, listener);
    }

    /// Remove the first registration of `listener` for `kind`.
    ///
    /// Returns `false` when the listener was not registered.
    pub fn off(&self, kind: EventKind, listener: &Listener) -> bool {
        self.lock().listeners.remove(kind, listener)
    }

    /// Number of listeners currently registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().listeners.len(kind)
    }

    /// Open the connection.
    ///
    /// Resolves once the transport reports it is open. Fails immediately with
    /// [`WsError::AlreadyActive`] while another attempt is in flight or the connection is open.
    /// Token failures are reported to the auth provider, reset the state to
    /// [`ConnectionState::Disconnected`] and surface as [`WsError::AuthFailed`].
    ///
    /// Dropping the returned future before it completes abandons the attempt: its transport is
    /// closed and the state returns to [`ConnectionState::Disconnected`].
    pub async fn connect(&self) -> Result<()> {
        let generation = self.begin_connect()?;
        let _guard = ConnectGuard {
            manager: self,
            generation,
        };

        let url = match self.inner.config.auth() {
            Some(auth) => match auth.token().await {
                Ok(token) => connection_url(self.inner.config.url(), token.as_ref()),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Auth provider failed to supply a token");

                    auth.on_auth_error(&e).await;
                    self.transition(generation, ConnectionState::Disconnected);
                    return Err(WsError::AuthFailed(e).into());
                }
            },
            None => self.inner.config.url().to_owned(),
        };

        let (pending_tx, pending_rx) = oneshot::channel();
        {
            let mut shared = self.lock();
            shared.pending = Some(pending_tx);
            shared.opening = true;
        }

        let events = self.transport_events(generation);
        match self.inner.factory.open(&url, events) {
            Ok(transport) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(endpoint = self.inner.config.url(), "Opened transport");

                self.install_transport(generation, Arc::from(transport));
            }
            Err(e) => {
                {
                    let mut shared = self.lock();
                    if shared.generation == generation {
                        shared.pending = None;
                        shared.opening = false;
                    }
                }
                self.fail(generation, e.to_string());
                return Err(e);
            }
        }

        pending_rx.await.unwrap_or_else(|_e| {
            Err(WsError::ConnectionClosed {
                code: ABNORMAL_CLOSURE,
                reason: String::new(),
            }
            .into())
        })
    }

    /// Close the connection on behalf of the user.
    ///
    /// Sends close code 1000 with reason `"User disconnected"`. The state change to
    /// [`ConnectionState::Disconnected`] happens when the transport confirms the close.
    /// Calling this without an open transport does nothing.
    pub fn disconnect(&self) {
        let transport = {
            let mut shared = self.lock();
            let transport = shared.transport.take();
            if transport.is_some() {
                shared.closing_by_user = true;
            }
            transport
        };

        if let Some(transport) = transport {
            #[cfg(feature = "tracing")]
            tracing::debug!(endpoint = self.inner.config.url(), "Disconnecting");

            transport.close(NORMAL_CLOSURE, USER_DISCONNECT_REASON);
        }
    }

    /// Serialize `payload` as JSON and write it to the open connection.
    pub fn send<R: Serialize>(&self, payload: &R) -> Result<()> {
        let transport = self.connected_transport()?;
        let text = serde_json::to_string(payload)?;
        transport.send(text)
    }

    /// Write pre-serialized text to the open connection.
    pub fn send_text(&self, text: String) -> Result<()> {
        self.connected_transport()?.send(text)
    }

    fn connected_transport(&self) -> Result<Arc<dyn Transport>> {
        let shared = self.lock();
        if !shared.state.is_connected() {
            return Err(WsError::NotConnected.into());
        }
        shared
            .transport
            .clone()
            .ok_or_else(|| WsError::NotConnected.into())
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter [`ConnectionState::Connecting`], returning the generation of the new attempt.
    fn begin_connect(&self) -> Result<u64> {
        let (generation, stale, notification) = {
            let mut shared = self.lock();
            if shared.state.is_active() {
                return Err(WsError::AlreadyActive {
                    state: shared.state,
                }
                .into());
            }

            shared.generation = shared.generation.wrapping_add(1);
            shared.closing_by_user = false;
            shared.opening = false;
            shared.opened_early = false;
            let stale = shared.transport.take();
            let notification = shared.set_state(ConnectionState::Connecting);
            (shared.generation, stale, notification)
        };

        // A transport left behind by a failed connection is torn down when its handle drops.
        drop(stale);
        notification.deliver();

        Ok(generation)
    }

    /// Store the transport returned by the factory, completing an open it reported early.
    fn install_transport(&self, generation: u64, transport: Arc<dyn Transport>) {
        let opened = {
            let mut shared = self.lock();
            // The transport may already have failed or been superseded while `open` was running.
            if shared.generation != generation || !shared.state.is_active() {
                return;
            }
            shared.opening = false;
            shared.transport = Some(transport);
            std::mem::take(&mut shared.opened_early).then(|| shared.mark_connected())
        };

        if let Some((notification, pending)) = opened {
            self.finish_open(notification, pending);
        }
    }

    /// Roll back an attempt whose `connect` future was dropped before it settled.
    fn abandon(&self, generation: u64) {
        let (notification, transport) = {
            let mut shared = self.lock();
            if shared.generation != generation || shared.state != ConnectionState::Connecting {
                return;
            }
            shared.pending = None;
            shared.opening = false;
            shared.opened_early = false;
            let transport = shared.transport.take();
            shared.closing_by_user = transport.is_some();
            (shared.set_state(ConnectionState::Disconnected), transport)
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = self.inner.config.url(), "Connect abandoned");

        if let Some(transport) = transport {
            transport.close(NORMAL_CLOSURE, USER_DISCONNECT_REASON);
        }
        notification.deliver();
    }

    fn transport_events(&self, generation: u64) -> TransportEvents {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        TransportEvents::new(move |event| {
            if let Some(inner) = inner.upgrade() {
                ConnectionManager { inner }.handle_transport_event(generation, event);
            }
        })
    }

    fn handle_transport_event(&self, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.handle_open(generation),
            TransportEvent::Message(text) => self.handle_message(generation, &text),
            TransportEvent::Error(detail) => self.fail(generation, detail),
            TransportEvent::Close { code, reason } => self.handle_close(generation, code, reason),
        }
    }

    fn transition(&self, generation: u64, state: ConnectionState) {
        let notification = {
            let mut shared = self.lock();
            if shared.generation != generation {
                return;
            }
            shared.set_state(state)
        };
        notification.deliver();
    }

    fn handle_open(&self, generation: u64) {
        let (notification, pending) = {
            let mut shared = self.lock();
            if shared.generation != generation || shared.state != ConnectionState::Connecting {
                return;
            }
            // Listeners must see the transport once `Connected` is announced.
            if shared.opening {
                shared.opened_early = true;
                return;
            }
            shared.mark_connected()
        };

        self.finish_open(notification, pending);
    }

    fn finish_open(
        &self,
        notification: Notification,
        pending: Option<oneshot::Sender<Result<()>>>,
    ) {
        #[cfg(feature = "tracing")]
        tracing::debug!(endpoint = self.inner.config.url(), "Connected");

        notification.deliver();
        if let Some(pending) = pending {
            _ = pending.send(Ok(()));
        }
    }

    fn handle_message(&self, generation: u64, text: &str) {
        let event = match serde_json::from_str::<Value>(text) {
            Ok(payload) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(%text, "Received message");

                Event::Message(payload)
            }
            Err(e) => {
                let error = WsError::MessageParse(e);

                #[cfg(feature = "tracing")]
                tracing::warn!(%text, error = %error, "Dropping malformed message");

                Event::Error(ErrorEvent::new(ErrorEventKind::Parse, error.to_string()))
            }
        };

        let notification = {
            let shared = self.lock();
            if shared.generation != generation {
                return;
            }
            shared.listeners.notification(event)
        };
        notification.deliver();
    }

    /// Move to [`ConnectionState::Error`] and fail any pending `connect`.
    fn fail(&self, generation: u64, detail: String) {
        let (state_notification, error_notification, pending) = {
            let mut shared = self.lock();
            if shared.generation != generation || !shared.state.is_active() {
                return;
            }

            let message = WsError::Transport(detail.clone()).to_string();
            let error = ErrorEvent::new(ErrorEventKind::Transport, message);
            (
                shared.set_state(ConnectionState::Error),
                shared.listeners.notification(Event::Error(error)),
                shared.pending.take(),
            )
        };

        #[cfg(feature = "tracing")]
        tracing::error!(endpoint = self.inner.config.url(), %detail, "Transport error");

        state_notification.deliver();
        error_notification.deliver();
        if let Some(pending) = pending {
            _ = pending.send(Err(WsError::Transport(detail).into()));
        }
    }

    fn handle_close(&self, generation: u64, code: u16, reason: String) {
        let (notification, pending, by_user) = {
            let mut shared = self.lock();
            if shared.generation != generation {
                return;
            }
            shared.transport = None;
            let by_user = std::mem::take(&mut shared.closing_by_user);
            if shared.state == ConnectionState::Disconnected {
                return;
            }
            (
                shared.set_state(ConnectionState::Disconnected),
                shared.pending.take(),
                by_user,
            )
        };

        #[cfg(feature = "tracing")]
        log_close(by_user, code, &reason);
        #[cfg(not(feature = "tracing"))]
        let _ = by_user;

        notification.deliver();
        if let Some(pending) = pending {
            _ = pending.send(Err(WsError::ConnectionClosed { code, reason }.into()));
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.inner.config.url())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "tracing")]
fn log_close(by_user: bool, code: u16, reason: &str) {
    if by_user {
        tracing::debug!(code, reason, "Connection closed by user");
    } else {
        tracing::warn!(code, reason, "Connection closed unexpectedly");
    }
}

/// Append `token` to `base` as a `token` query parameter, keeping any existing query.
fn connection_url(base: &str, token: Option<&SecretString>) -> String {
    match token {
        Some(token) => {
            let separator = if base.contains('?') { '&' } else { '?' };
            format!("{base}{separator}token={}", token.expose_secret())
        }
        None => base.to_owned(),
    }
}
