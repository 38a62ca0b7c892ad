//! [`TransportFactory`] backed by `tokio-tungstenite`.

use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::connection::ABNORMAL_CLOSURE;
use super::error::WsError;
use super::traits::{Transport, TransportEvents, TransportFactory};
use crate::Result;
use crate::error::{Error, Kind};

/// Close code used when the peer sends a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// How long a requested close waits for the peer to echo the close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens WebSocket connections on the current tokio runtime.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct TungsteniteFactory {
    close_timeout: Duration,
}

impl Default for TungsteniteFactory {
    fn default() -> Self {
        Self {
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl TungsteniteFactory {
    /// Report a requested close as complete after `close_timeout` even if the peer never
    /// answers the close frame.
    #[must_use]
    pub const fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }
}

impl TransportFactory for TungsteniteFactory {
    fn open(&self, url: &str, events: TransportEvents) -> Result<Box<dyn Transport>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::with_source(Kind::Internal, e))?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        runtime.spawn(run_socket(
            url.to_owned(),
            events,
            command_rx,
            self.close_timeout,
        ));

        Ok(Box::new(TungsteniteTransport { command_tx }))
    }
}

enum Command {
    Send(String),
    Close { code: u16, reason: String },
}

/// Handle to a socket task. Dropping it without a close request closes the socket.
struct TungsteniteTransport {
    command_tx: mpsc::UnboundedSender<Command>,
}

impl Transport for TungsteniteTransport {
    fn send(&self, text: String) -> Result<()> {
        self.command_tx
            .send(Command::Send(text))
            .map_err(|_e| WsError::ConnectionClosed {
                code: ABNORMAL_CLOSURE,
                reason: String::new(),
            })?;
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        _ = self.command_tx.send(Command::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

/// Drives one socket: connects, forwards frames to `events`, and executes commands.
async fn run_socket(
    url: String,
    events: TransportEvents,
    mut commands: mpsc::UnboundedReceiver<Command>,
    close_timeout: Duration,
) {
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            events.error(e.to_string());
            events.closed(ABNORMAL_CLOSURE, String::new());
            return;
        }
    };

    events.opened();
    let (mut write, mut read) = ws_stream.split();
    // Code and reason of a close we requested, held until the peer echoes it.
    let mut closing: Option<(u16, String)> = None;
    let close_deadline = sleep(close_timeout);
    tokio::pin!(close_deadline);

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => events.message(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => events.message(text),
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(error = %e, "Ignoring non UTF-8 binary frame");
                        #[cfg(not(feature = "tracing"))]
                        let _ = &e;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or_else(
                        || (NO_STATUS_RECEIVED, String::new()),
                        |frame| (u16::from(frame.code), frame.reason.as_str().to_owned()),
                    );
                    events.closed(code, reason);
                    return;
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by tungstenite itself.
                }
                Some(Err(e)) => {
                    events.error(e.to_string());
                    events.closed(ABNORMAL_CLOSURE, String::new());
                    return;
                }
                None => {
                    events.closed(ABNORMAL_CLOSURE, String::new());
                    return;
                }
            },

            () = &mut close_deadline, if closing.is_some() => {
                #[cfg(feature = "tracing")]
                tracing::debug!(?close_timeout, "Peer did not answer close frame");

                if let Some((code, reason)) = closing.take() {
                    events.closed(code, reason);
                }
                return;
            }

            command = commands.recv(), if closing.is_none() => match command {
                Some(Command::Send(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        events.error(e.to_string());
                        events.closed(ABNORMAL_CLOSURE, String::new());
                        return;
                    }
                }
                Some(Command::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    // The peer's echo arrives as a close frame on the read half.
                    if write.send(Message::Close(Some(frame))).await.is_err() {
                        events.closed(code, reason);
                        return;
                    }
                    close_deadline.as_mut().reset(Instant::now() + close_timeout);
                    closing = Some((code, reason));
                }
                None => {
                    _ = write.send(Message::Close(None)).await;
                    return;
                }
            },
        }
    }
}
