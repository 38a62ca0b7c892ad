//! Reconnection service that observes a [`ConnectionManager`] from the outside.
//!
//! The manager never retries on its own. A [`Reconnector`] listens for
//! [`ConnectionState::Disconnected`] and [`ConnectionState::Error`], waits an exponential
//! backoff delay and calls [`ConnectionManager::connect`] again.

use std::fmt;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff as _;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::config::ReconnectConfig;
use super::connection::{ConnectionManager, ConnectionState};
use super::error::WsError;
use super::events::{Event, EventKind, Listener, listener};

/// Handle to a running reconnection task. Dropping it stops the task.
///
/// Cancel the reconnector before a deliberate [`ConnectionManager::disconnect`], otherwise the
/// resulting [`ConnectionState::Disconnected`] is treated like any other drop.
pub struct Reconnector {
    manager: ConnectionManager,
    listener: Listener,
    task: JoinHandle<()>,
}

impl Reconnector {
    /// Start watching `manager`. Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(manager: ConnectionManager, config: ReconnectConfig) -> Self {
        let (state_tx, state_rx) = mpsc::unbounded_channel();
        let listener = listener(move |event| {
            if let Event::StateChange(state) = event {
                _ = state_tx.send(*state);
            }
        });
        manager.on(EventKind::StateChange, Listener::clone(&listener));

        let task = tokio::spawn(reconnect_loop(manager.clone(), config, state_rx));

        Self {
            manager,
            listener,
            task,
        }
    }

    /// Whether the task has stopped, either because it gave up or was cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop reconnecting.
    pub fn cancel(self) {
        drop(self);
    }
}

impl fmt::Debug for Reconnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconnector")
            .field("manager", &self.manager)
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

impl Drop for Reconnector {
    fn drop(&mut self) {
        self.manager.off(EventKind::StateChange, &self.listener);
        self.task.abort();
    }
}

const fn is_down(state: ConnectionState) -> bool {
    matches!(state, ConnectionState::Disconnected | ConnectionState::Error)
}

async fn reconnect_loop(
    manager: ConnectionManager,
    config: ReconnectConfig,
    mut states: mpsc::UnboundedReceiver<ConnectionState>,
) {
    let mut backoff: ExponentialBackoff = config.clone().into();
    let mut failures = 0_u32;

    while let Some(state) = states.recv().await {
        // Queued notifications may be stale by the time they are read.
        if !is_down(state) || !is_down(manager.state()) {
            continue;
        }

        loop {
            if let Some(max) = config.max_attempts
                && failures >= max
            {
                #[cfg(feature = "tracing")]
                tracing::warn!(attempts = failures, "Giving up on reconnecting");
                return;
            }

            let Some(delay) = backoff.next_backoff() else {
                return;
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(?delay, attempt = failures + 1, "Scheduling reconnect");

            sleep(delay).await;
            if !is_down(manager.state()) {
                break;
            }

            match manager.connect().await {
                Ok(()) => {
                    failures = 0;
                    backoff.reset();
                    break;
                }
                Err(e)
                    if matches!(
                        e.downcast_ref::<WsError>(),
                        Some(WsError::AlreadyActive { .. })
                    ) =>
                {
                    break;
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Reconnect attempt failed");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;

                    failures = failures.saturating_add(1);
                }
            }
        }
    }
}
