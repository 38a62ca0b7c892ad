//! Typed events published by [`super::ConnectionManager`].

use std::sync::Arc;

use serde_json::Value;

use super::connection::ConnectionState;

/// Callback invoked for every emitted [`Event`] of the kind it was registered for.
///
/// Listeners are compared by pointer identity, so keep a clone of the [`Arc`] around if you
/// intend to remove it later with [`super::ConnectionManager::off`].
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wraps a closure into a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The closed set of event kinds a manager publishes.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    StateChange,
    Message,
    Error,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The connection moved to a new state
    StateChange(ConnectionState),
    /// A text frame was parsed as JSON. The payload is passed through untouched.
    Message(Value),
    /// A non-fatal parse failure or a transport failure
    Error(ErrorEvent),
}

impl Event {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::StateChange(_) => EventKind::StateChange,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorEventKind {
    /// An incoming frame was not valid JSON; the connection stays open
    Parse,
    /// The transport failed; the connection is no longer usable
    Transport,
}

/// Descriptor carried by [`Event::Error`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub kind: ErrorEventKind,
    pub message: String,
}

impl ErrorEvent {
    #[must_use]
    pub fn new<S: Into<String>>(kind: ErrorEventKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Ordered listener lists, one per [`EventKind`].
#[derive(Default)]
pub(crate) struct Listeners {
    state_change: Vec<Listener>,
    message: Vec<Listener>,
    error: Vec<Listener>,
}

impl Listeners {
    fn slot(&self, kind: EventKind) -> &Vec<Listener> {
        match kind {
            EventKind::StateChange => &self.state_change,
            EventKind::Message => &self.message,
            EventKind::Error => &self.error,
        }
    }

    fn slot_mut(&mut self, kind: EventKind) -> &mut Vec<Listener> {
        match kind {
            EventKind::StateChange => &mut self.state_change,
            EventKind::Message => &mut self.message,
            EventKind::Error => &mut self.error,
        }
    }

    pub(crate) fn add(&mut self, kind: EventKind, listener: Listener) {
        self.slot_mut(kind).push(listener);
    }

    /// Removes the first registration of `listener`. Returns whether one was found.
    pub(crate) fn remove(&mut self, kind: EventKind, listener: &Listener) -> bool {
        let slot = self.slot_mut(kind);
        let position = slot.iter().position(|registered| {
            std::ptr::addr_eq(Arc::as_ptr(registered), Arc::as_ptr(listener))
        });

        match position {
            Some(index) => {
                slot.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self, kind: EventKind) -> usize {
        self.slot(kind).len()
    }

    /// Takes a copy of the listeners for `event` so they can run without holding a lock.
    pub(crate) fn notification(&self, event: Event) -> Notification {
        Notification {
            listeners: self.slot(event.kind()).clone(),
            event,
        }
    }
}

/// An event paired with the listeners that were registered when it was raised.
#[must_use = "notifications do nothing until delivered"]
pub(crate) struct Notification {
    listeners: Vec<Listener>,
    event: Event,
}

impl Notification {
    pub(crate) fn deliver(self) {
        for listener in &self.listeners {
            listener(&self.event);
        }
    }
}
