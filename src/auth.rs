use async_trait::async_trait;
/// Secret string types that redact values in debug output for security.
pub use secrecy::{ExposeSecret, SecretString};

use crate::error::BoxError;

/// Supplies bearer tokens for real-time connections.
///
/// A provider is shared between managers (for example one manager per chat channel) behind an
/// [`std::sync::Arc`], so implementations must be `Send + Sync`. Managers never mutate a
/// provider; the only notification they send back is [`AuthProvider::on_auth_error`].
///
/// # Example
///
/// ```ignore
/// struct SessionTokens { session: Arc<Session> }
///
/// #[async_trait]
/// impl AuthProvider for SessionTokens {
///     async fn token(&self) -> Result<Option<SecretString>, BoxError> {
///         Ok(self.session.access_token().await?.map(SecretString::from))
///     }
///
///     async fn on_auth_error(&self, _error: &BoxError) {
///         self.session.invalidate().await;
///     }
/// }
/// ```
#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// Returns the token to attach to the connection URL.
    ///
    /// `Ok(None)` means the connection proceeds without a token.
    async fn token(&self) -> Result<Option<SecretString>, BoxError>;

    /// Called once when [`AuthProvider::token`] fails during a connection attempt.
    async fn on_auth_error(&self, _error: &BoxError) {}
}

/// An [`AuthProvider`] that always hands out the same token.
#[derive(Clone, Debug)]
pub struct StaticToken {
    token: SecretString,
}

impl StaticToken {
    #[must_use]
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: SecretString::from(token.into()),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticToken {
    async fn token(&self) -> Result<Option<SecretString>, BoxError> {
        Ok(Some(self.token.clone()))
    }
}
