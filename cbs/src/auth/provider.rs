use super::sas_token_generator::{SasTokenSigner, SignedToken};
use crate::common::AuthError;
use async_trait::async_trait;
use std::time::Duration;
use zeroize::Zeroizing;

/// A freshly issued token and its absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The token presented on the CBS link
    pub token: String,
    /// Expiry as whole seconds since the Unix epoch
    pub expires_at: i64,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl From<SignedToken> for AccessToken {
    fn from(signed: SignedToken) -> Self {
        Self {
            token: signed.token,
            expires_at: signed.expires_at,
        }
    }
}

/// Capability for supplying a replacement token when the CBS link reports
/// that the current one is about to expire.
///
/// The authenticator calls [`update_token`] while holding its poll lock, so a
/// slow provider stalls every concurrent poller. Providers that fetch tokens
/// over the network should keep a ready value and return it quickly.
///
/// # Examples
///
/// ```no_run
/// use async_trait::async_trait;
/// use cbs::auth::{AccessToken, TokenProvider};
/// use cbs::common::AuthError;
///
/// struct OAuthProvider;
///
/// #[async_trait]
/// impl TokenProvider for OAuthProvider {
///     async fn update_token(&self, audience: &str) -> Result<AccessToken, AuthError> {
///         // Fetch a bearer token scoped to `audience`
///         Ok(AccessToken {
///             token: format!("bearer-for-{audience}"),
///             expires_at: 1_700_000_000,
///         })
///     }
/// }
/// ```
///
/// [`update_token`]: TokenProvider::update_token
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Produces a new token for `audience`.
    ///
    /// The default implementation has no way to obtain a token and always
    /// fails with [`AuthError::TokenExpired`].
    async fn update_token(&self, audience: &str) -> Result<AccessToken, AuthError> {
        let _ = audience;
        Err(AuthError::TokenExpired(
            "Unable to refresh token - no refresh logic implemented.".to_string(),
        ))
    }
}

/// Provider for tokens that cannot be renewed.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticTokenProvider;

impl TokenProvider for StaticTokenProvider {}

/// Re-signs SAS tokens from stored shared access key material.
#[derive(Clone)]
pub struct SharedKeyTokenProvider {
    key_name: String,
    key: Zeroizing<String>,
    resource_uri: String,
    expires_in: Duration,
}

impl std::fmt::Debug for SharedKeyTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeyTokenProvider")
            .field("key_name", &self.key_name)
            .field("key", &"<redacted>")
            .field("resource_uri", &self.resource_uri)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

impl SharedKeyTokenProvider {
    pub fn new(
        key_name: impl Into<String>,
        key: impl Into<String>,
        resource_uri: impl Into<String>,
        expires_in: Duration,
    ) -> Self {
        Self {
            key_name: key_name.into(),
            key: Zeroizing::new(key.into()),
            resource_uri: resource_uri.into(),
            expires_in,
        }
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Signs a token valid for the configured lifetime starting now.
    pub fn sign_now(&self) -> Result<AccessToken, AuthError> {
        SasTokenSigner::sign(
            &self.key_name,
            &self.key,
            &self.resource_uri,
            self.expires_in,
        )
        .map(AccessToken::from)
    }
}

#[async_trait]
impl TokenProvider for SharedKeyTokenProvider {
    async fn update_token(&self, _audience: &str) -> Result<AccessToken, AuthError> {
        self.sign_now()
    }
}
