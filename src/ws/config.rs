#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::fmt;
use std::sync::Arc;
#[cfg(feature = "reconnect")]
use std::time::Duration;

#[cfg(feature = "reconnect")]
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use url::Url;

use crate::Result;
use crate::auth::AuthProvider;
use crate::error::Error;

#[cfg(feature = "reconnect")]
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
#[cfg(feature = "reconnect")]
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(30);
#[cfg(feature = "reconnect")]
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
#[cfg(feature = "reconnect")]
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Immutable connection configuration, fixed when the manager is built.
#[non_exhaustive]
#[derive(Clone)]
pub struct Config {
    /// Base endpoint, kept exactly as supplied
    url: String,
    /// Optional token source appended to the endpoint on every connect
    auth: Option<Arc<dyn AuthProvider>>,
}

impl Config {
    /// Create a configuration for `url`, which must be an absolute `ws://` or `wss://` URL.
    pub fn new<S: Into<String>>(url: S) -> Result<Self> {
        let url = url.into();
        let parsed = Url::parse(&url)?;

        match parsed.scheme() {
            "ws" | "wss" => Ok(Self { url, auth: None }),
            other => Err(Error::validation(format!(
                "unsupported WebSocket scheme `{other}`, expected ws or wss"
            ))),
        }
    }

    /// Attach an auth provider. Providers may be shared between several configurations.
    #[must_use]
    pub fn with_auth(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn auth(&self) -> Option<&Arc<dyn AuthProvider>> {
        self.auth.as_ref()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("url", &self.url)
            .field("auth", &self.auth.is_some())
            .finish()
    }
}

/// Configuration for the external reconnection service.
#[cfg(feature = "reconnect")]
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Initial backoff duration for first reconnection attempt
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

#[cfg(feature = "reconnect")]
impl ReconnectConfig {
    #[must_use]
    pub fn new(
        max_attempts: Option<u32>,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }
}

#[cfg(feature = "reconnect")]
impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

#[cfg(feature = "reconnect")]
impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_max_elapsed_time(None) // max_attempts bounds retries instead
            .build()
    }
}
