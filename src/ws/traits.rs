//! Transport seam between [`super::ConnectionManager`] and the socket implementation.

use std::fmt;
use std::sync::Arc;

use crate::Result;

/// An open (or opening) bidirectional text transport.
///
/// Implementations must not call back into the [`TransportEvents`] sink while holding locks
/// that [`Transport::send`] or [`Transport::close`] also take.
pub trait Transport: Send + Sync + 'static {
    /// Write a text frame.
    fn send(&self, text: String) -> Result<()>;

    /// Start a close handshake. Completion is reported through [`TransportEvents::closed`].
    fn close(&self, code: u16, reason: &str);
}

/// Opens transports on behalf of a manager.
///
/// The factory replaces an ambient socket constructor so tests can substitute a fake transport.
///
/// # Example
///
/// ```ignore
/// struct Loopback;
///
/// impl TransportFactory for Loopback {
///     fn open(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>> {
///         events.opened();
///         Ok(Box::new(LoopbackTransport::new(url, events)))
///     }
/// }
/// ```
pub trait TransportFactory: Send + Sync + 'static {
    /// Open a single transport against `url`, reporting its lifecycle to `events`.
    ///
    /// Events may be reported before this method returns.
    fn open(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>>;
}

/// Lifecycle notification raised by a transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
    Close { code: u16, reason: String },
}

/// Callback sink a transport reports into. Cheap to clone.
#[derive(Clone)]
pub struct TransportEvents {
    sink: Arc<dyn Fn(TransportEvent) + Send + Sync>,
}

impl TransportEvents {
    pub fn new<F>(sink: F) -> Self
    where
        F: Fn(TransportEvent) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn opened(&self) {
        (self.sink)(TransportEvent::Open);
    }

    pub fn message(&self, text: String) {
        (self.sink)(TransportEvent::Message(text));
    }

    pub fn error(&self, detail: String) {
        (self.sink)(TransportEvent::Error(detail));
    }

    pub fn closed(&self, code: u16, reason: String) {
        (self.sink)(TransportEvent::Close { code, reason });
    }
}

impl fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEvents").finish_non_exhaustive()
    }
}
