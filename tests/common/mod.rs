#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Each test binary only uses part of the shared fixtures"
)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aprende_realtime::Result;
use aprende_realtime::auth::{AuthProvider, SecretString};
use aprende_realtime::error::BoxError;
use aprende_realtime::ws::{
    ConnectionManager, ConnectionState, Event, EventKind, Transport, TransportEvents,
    TransportFactory, listener,
};
use async_trait::async_trait;
use tokio::time::{sleep, timeout};

/// What a [`FakeFactory`] does with a freshly opened socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnOpen {
    /// Report open immediately
    Open,
    /// Report a transport error immediately
    Fail(String),
    /// Report nothing; the test drives the socket
    Wait,
}

/// In-process [`TransportFactory`] that records every socket it opens.
#[derive(Clone)]
pub struct FakeFactory {
    behavior: Arc<Mutex<OnOpen>>,
    sockets: Arc<Mutex<Vec<FakeSocket>>>,
}

impl FakeFactory {
    pub fn new(behavior: OnOpen) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            sockets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_behavior(&self, behavior: OnOpen) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn sockets(&self) -> Vec<FakeSocket> {
        self.sockets.lock().unwrap().clone()
    }

    pub fn opened(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    pub fn last(&self) -> FakeSocket {
        self.sockets.lock().unwrap().last().cloned().unwrap()
    }

    /// Wait until at least `count` sockets have been opened.
    pub async fn wait_for_sockets(&self, count: usize) {
        timeout(Duration::from_secs(2), async {
            while self.opened() < count {
                sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
    }
}

impl TransportFactory for FakeFactory {
    fn open(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>> {
        let socket = FakeSocket {
            url: url.to_owned(),
            events,
            sent: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(Mutex::new(Vec::new())),
        };
        self.sockets.lock().unwrap().push(socket.clone());

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            OnOpen::Open => socket.open(),
            OnOpen::Fail(detail) => socket.fail(&detail),
            OnOpen::Wait => {}
        }

        Ok(Box::new(FakeTransport { socket }))
    }
}

/// Test-side view of one fake socket.
#[derive(Clone)]
pub struct FakeSocket {
    pub url: String,
    events: TransportEvents,
    sent: Arc<Mutex<Vec<String>>>,
    closes: Arc<Mutex<Vec<(u16, String)>>>,
}

impl FakeSocket {
    pub fn open(&self) {
        self.events.opened();
    }

    pub fn receive(&self, text: &str) {
        self.events.message(text.to_owned());
    }

    pub fn fail(&self, detail: &str) {
        self.events.error(detail.to_owned());
    }

    /// Close from the remote side, without the client asking for it.
    pub fn drop_connection(&self, code: u16) {
        self.events.closed(code, String::new());
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.closes.lock().unwrap().clone()
    }
}

struct FakeTransport {
    socket: FakeSocket,
}

impl Transport for FakeTransport {
    fn send(&self, text: String) -> Result<()> {
        self.socket.sent.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        self.socket
            .closes
            .lock()
            .unwrap()
            .push((code, reason.to_owned()));
        // Behaves like a peer that acknowledges the close handshake right away.
        self.socket.events.closed(code, reason.to_owned());
    }
}

/// Auth provider returning a fixed token, or none.
pub struct FixedToken(pub Option<&'static str>);

#[async_trait]
impl AuthProvider for FixedToken {
    async fn token(&self) -> std::result::Result<Option<SecretString>, BoxError> {
        Ok(self.0.map(|token| SecretString::from(token.to_owned())))
    }
}

/// Auth provider whose token request hangs until [`StallingToken::release`] is called.
#[derive(Default)]
pub struct StallingToken {
    released: tokio::sync::Notify,
    open: std::sync::atomic::AtomicBool,
}

impl StallingToken {
    /// Make later token requests hang again.
    pub fn stall(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.released.notify_waiters();
    }
}

#[async_trait]
impl AuthProvider for StallingToken {
    async fn token(&self) -> std::result::Result<Option<SecretString>, BoxError> {
        let released = self.released.notified();
        if !self.open.load(Ordering::SeqCst) {
            released.await;
        }
        Ok(Some(SecretString::from("abc".to_owned())))
    }
}

/// Auth provider whose token request always fails.
#[derive(Default)]
pub struct RejectingAuth {
    pub auth_errors: AtomicUsize,
    pub last_error: Mutex<Option<String>>,
}

#[async_trait]
impl AuthProvider for RejectingAuth {
    async fn token(&self) -> std::result::Result<Option<SecretString>, BoxError> {
        Err("expired".into())
    }

    async fn on_auth_error(&self, error: &BoxError) {
        self.auth_errors.fetch_add(1, Ordering::SeqCst);
        *self.last_error.lock().unwrap() = Some(error.to_string());
    }
}

/// Records every event a manager emits, in order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn attach(manager: &ConnectionManager) -> Self {
        let log = Self::default();
        for kind in [EventKind::StateChange, EventKind::Message, EventKind::Error] {
            let events = Arc::clone(&log.events);
            manager.on(
                kind,
                listener(move |event| events.lock().unwrap().push(event.clone())),
            );
        }
        log
    }

    pub fn all(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.all()
            .into_iter()
            .filter_map(|event| match event {
                Event::StateChange(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<aprende_realtime::ws::ErrorEvent> {
        self.all()
            .into_iter()
            .filter_map(|event| match event {
                Event::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.all()
            .into_iter()
            .filter_map(|event| match event {
                Event::Message(payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}
