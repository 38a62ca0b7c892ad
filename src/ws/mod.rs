//! Real-time connection infrastructure.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: owns one transport, tracks [`ConnectionState`] and publishes [`Event`]s
//! - [`TransportFactory`] / [`Transport`]: seam to the socket implementation
//! - [`reconnect::Reconnector`]: external retry policy driven by state changes
//!
//! # Example
//!
//! ```ignore
//! let config = Config::new("wss://api.aprendecomigo.com/ws/notifications/")?
//!     .with_auth(Arc::new(StaticToken::new(token)));
//! let manager = ConnectionManager::new(config);
//! let _reconnector = Reconnector::spawn(manager.clone(), ReconnectConfig::default());
//!
//! manager.connect().await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
#[cfg(feature = "reconnect")]
pub mod reconnect;
pub mod traits;
#[cfg(feature = "tungstenite")]
pub mod transport;

pub use config::Config;
pub use connection::{ConnectionManager, ConnectionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use events::{ErrorEvent, ErrorEventKind, Event, EventKind, Listener, listener};
pub use traits::*;
