#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

use super::connection::ConnectionState;
use crate::error::{BoxError, Kind};

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// `connect` was called while a connection is already being established or is open
    AlreadyActive {
        /// State the manager was in when the call was rejected
        state: ConnectionState,
    },
    /// The auth provider failed to produce a token
    AuthFailed(BoxError),
    /// A message was sent while the connection was not open
    NotConnected,
    /// Error parsing an incoming WebSocket message
    MessageParse(serde_json::Error),
    /// Error reported by the underlying transport
    Transport(String),
    /// The transport closed before the connection was established
    ConnectionClosed {
        /// Close code reported by the transport
        code: u16,
        /// Close reason reported by the transport
        reason: String,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyActive { state } => {
                write!(f, "WebSocket connection already active (state: {state})")
            }
            Self::AuthFailed(e) => write!(f, "WebSocket authentication failed: {e}"),
            Self::NotConnected => write!(f, "Cannot send message: WebSocket is not connected"),
            Self::MessageParse(e) => write!(f, "Failed to parse message: {e}"),
            Self::Transport(detail) => write!(f, "WebSocket transport error: {detail}"),
            Self::ConnectionClosed { code, reason } if reason.is_empty() => {
                write!(f, "WebSocket connection closed (code {code})")
            }
            Self::ConnectionClosed { code, reason } => {
                write!(f, "WebSocket connection closed (code {code}): {reason}")
            }
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::AuthFailed(e) => Some(&**e),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        let kind = match e {
            WsError::AuthFailed(_) => Kind::Auth,
            _ => Kind::WebSocket,
        };
        crate::error::Error::with_source(kind, e)
    }
}

#[cfg(feature = "tungstenite")]
impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(Kind::WebSocket, WsError::Transport(e.to_string()))
    }
}
