//! Connection identity material for AMQP connections.
//!
//! [`AuthCredential`] is a closed set of variants. Plain and anonymous
//! credentials authenticate during the SASL exchange; SAS token credentials
//! authenticate over a dedicated CBS session after the connection is open
//! and are the only variant that can create a [`CbsAuthenticator`].

use super::connection_string::ConnectionStringConfig;
use super::provider::{AccessToken, TokenProvider};
use super::retry_policy::RetryPolicy;
use super::sas_token_generator::SasTokenSigner;
use super::types::{
    AUTH_EXPIRATION_SECS, DEFAULT_AMQPS_PORT, DEFAULT_CBS_TIMEOUT, DEFAULT_SAS_TOKEN_TYPE,
    SasAuthConfig, TrustAnchor,
};
use crate::cbs::{AmqpConnection, CbsAuthenticator};
use crate::common::AuthError;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use zeroize::Zeroizing;

/// Network identity shared by every credential variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    hostname: String,
    port: u16,
    trust_anchor: TrustAnchor,
}

impl Endpoint {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: DEFAULT_AMQPS_PORT,
            trust_anchor: TrustAnchor::System,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_trust_anchor(mut self, trust_anchor: TrustAnchor) -> Self {
        self.trust_anchor = trust_anchor;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn trust_anchor(&self) -> &TrustAnchor {
        &self.trust_anchor
    }

    /// Resolves the settings handed to the TLS layer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if a trust anchor file cannot be read.
    pub fn tls_config(&self) -> Result<TlsConfig, AuthError> {
        let trust_anchor_pem = match &self.trust_anchor {
            TrustAnchor::System => None,
            TrustAnchor::Path(path) => Some(std::fs::read(path).map_err(|e| {
                AuthError::Configuration(format!(
                    "Failed to read trust anchor '{}': {e}",
                    path.display()
                ))
            })?),
            TrustAnchor::Pem(pem) => Some(pem.clone()),
        };

        Ok(TlsConfig {
            hostname: self.hostname.clone(),
            port: self.port,
            trust_anchor_pem,
        })
    }
}

/// Settings consumed by the TLS transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsConfig {
    pub hostname: String,
    pub port: u16,
    /// PEM certificates to trust; `None` means the platform store
    pub trust_anchor_pem: Option<Vec<u8>>,
}

/// SASL mechanism negotiated when the connection opens.
#[derive(Clone)]
pub enum SaslMechanism {
    Plain {
        username: String,
        password: Zeroizing<String>,
    },
    Anonymous,
}

impl std::fmt::Debug for SaslMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaslMechanism::Plain { username, .. } => f
                .debug_struct("Plain")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            SaslMechanism::Anonymous => f.write_str("Anonymous"),
        }
    }
}

impl SaslMechanism {
    pub fn name(&self) -> &'static str {
        match self {
            SaslMechanism::Plain { .. } => "PLAIN",
            SaslMechanism::Anonymous => "ANONYMOUS",
        }
    }

    /// UTF-8 initial response sent with the mechanism selection.
    pub fn initial_response(&self) -> Zeroizing<Vec<u8>> {
        match self {
            SaslMechanism::Plain { username, password } => {
                let mut response = Vec::with_capacity(username.len() + password.len() + 2);
                response.push(0);
                response.extend_from_slice(username.as_bytes());
                response.push(0);
                response.extend_from_slice(password.as_bytes());
                Zeroizing::new(response)
            }
            SaslMechanism::Anonymous => Zeroizing::new(Vec::new()),
        }
    }
}

/// Username/password authentication through SASL PLAIN.
#[derive(Clone)]
pub struct PlainCredential {
    endpoint: Endpoint,
    username: String,
    password: Zeroizing<String>,
}

impl std::fmt::Debug for PlainCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainCredential")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl PlainCredential {
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// Anonymous SASL authentication.
#[derive(Clone, Debug)]
pub struct AnonymousCredential {
    endpoint: Endpoint,
}

/// Token authentication over a CBS session.
///
/// Holds the current token and its expiry together with everything needed
/// to renew it: either the shared access key material (taken from the URI
/// userinfo or given explicitly) or a pluggable [`TokenProvider`].
#[derive(Clone)]
pub struct SasTokenCredential {
    endpoint: Endpoint,
    audience: String,
    uri: String,
    token: String,
    token_type: String,
    expires_at: f64,
    expires_in: Duration,
    username: Option<String>,
    password: Option<Zeroizing<String>>,
    timeout: Duration,
    retry_policy: RetryPolicy,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl std::fmt::Debug for SasTokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SasTokenCredential")
            .field("endpoint", &self.endpoint)
            .field("audience", &self.audience)
            .field("uri", &self.uri)
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("expires_in", &self.expires_in)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("retry_policy", &self.retry_policy)
            .field("token_provider", &self.token_provider.is_some())
            .finish()
    }
}

/// Builder for [`SasTokenCredential`].
///
/// Exactly one of [`expires_in`](Self::expires_in) or
/// [`expires_at`](Self::expires_at) must be set.
#[derive(Clone)]
pub struct SasTokenCredentialBuilder {
    audience: String,
    uri: String,
    token: String,
    token_type: String,
    expires_in: Option<Duration>,
    expires_at: Option<f64>,
    username: Option<String>,
    password: Option<Zeroizing<String>>,
    port: u16,
    trust_anchor: TrustAnchor,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl SasTokenCredentialBuilder {
    pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Token lifetime counted from construction time.
    pub fn expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Absolute expiry in seconds since the Unix epoch.
    pub fn expires_at(mut self, expires_at: f64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Key name used to re-sign the token; overrides URI userinfo.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Shared access key used to re-sign the token; overrides URI userinfo.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn trust_anchor(mut self, trust_anchor: TrustAnchor) -> Self {
        self.trust_anchor = trust_anchor;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Validates the settings and creates the credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if:
    /// - The URI cannot be parsed or has no host
    /// - Neither or both of `expires_in` and `expires_at` are set
    /// - `expires_at` is less than one second in the future
    pub fn build(self) -> Result<SasTokenCredential, AuthError> {
        let parsed = Url::parse(&self.uri)
            .map_err(|e| AuthError::Configuration(format!("Invalid URI '{}': {e}", self.uri)))?;
        let hostname = parsed
            .host_str()
            .ok_or_else(|| AuthError::Configuration(format!("URI '{}' has no host", self.uri)))?
            .to_string();

        let username = self
            .username
            .filter(|name| !name.is_empty())
            .or_else(|| decode_userinfo(parsed.username()));
        let password = self
            .password
            .filter(|key| !key.is_empty())
            .or_else(|| parsed.password().and_then(decode_userinfo).map(Zeroizing::new));

        let now = unix_now();
        let (expires_at, expires_in) = match (self.expires_at, self.expires_in) {
            (None, None) => {
                return Err(AuthError::Configuration(
                    "Must specify either 'expires_at' or 'expires_in'.".to_string(),
                ));
            }
            // A lifetime under one second counts as not supplied.
            (None, Some(expires_in)) if expires_in.as_secs() == 0 => {
                return Err(AuthError::Configuration(
                    "Must specify either 'expires_at' or 'expires_in'.".to_string(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(AuthError::Configuration(
                    "Specify only one of 'expires_at' or 'expires_in'.".to_string(),
                ));
            }
            (None, Some(expires_in)) => (now + expires_in.as_secs() as f64, expires_in),
            (Some(expires_at), None) => {
                let remaining = expires_at - now;
                if !remaining.is_finite() || remaining < 1.0 {
                    return Err(AuthError::Configuration(
                        "Token has already expired.".to_string(),
                    ));
                }
                (expires_at, Duration::from_secs(remaining as u64))
            }
        };

        Ok(SasTokenCredential {
            endpoint: Endpoint::new(hostname)
                .with_port(self.port)
                .with_trust_anchor(self.trust_anchor),
            audience: self.audience,
            uri: self.uri,
            token: self.token,
            token_type: self.token_type,
            expires_at,
            expires_in,
            username,
            password,
            timeout: self.timeout,
            retry_policy: self.retry_policy,
            token_provider: None,
        })
    }
}

impl SasTokenCredential {
    /// Starts building a credential around an already issued token.
    ///
    /// `audience` is the resource the token authorizes; for SAS tokens it is
    /// usually the same as `uri`. `uri` must be a decoded URI string.
    pub fn builder(
        audience: impl Into<String>,
        uri: impl Into<String>,
        token: impl Into<String>,
    ) -> SasTokenCredentialBuilder {
        SasTokenCredentialBuilder {
            audience: audience.into(),
            uri: uri.into(),
            token: token.into(),
            token_type: DEFAULT_SAS_TOKEN_TYPE.to_string(),
            expires_in: None,
            expires_at: None,
            username: None,
            password: None,
            port: DEFAULT_AMQPS_PORT,
            trust_anchor: TrustAnchor::System,
            timeout: DEFAULT_CBS_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Signs an initial token from a shared access key.
    ///
    /// The key name and key are retained so that later refreshes can re-sign
    /// without caller involvement. `expiry` defaults to 20 minutes.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cbs::auth::SasTokenCredential;
    ///
    /// let credential = SasTokenCredential::from_shared_access_key(
    ///     "sb://my-namespace.servicebus.windows.net/orders",
    ///     "RootManageSharedAccessKey",
    ///     "shared_access_key",
    ///     None,
    /// )?;
    /// ```
    pub fn from_shared_access_key(
        uri: &str,
        key_name: &str,
        shared_access_key: &str,
        expiry: Option<Duration>,
    ) -> Result<Self, AuthError> {
        let expires_in = expiry.unwrap_or(Duration::from_secs(AUTH_EXPIRATION_SECS));
        let signed = SasTokenSigner::sign(key_name, shared_access_key, uri, expires_in)?;

        let mut credential = Self::builder(uri, uri, signed.token)
            .expires_in(expires_in)
            .username(key_name)
            .password(shared_access_key)
            .build()?;
        credential.expires_at = signed.expires_at as f64;
        Ok(credential)
    }

    /// Replaces the built-in shared key refresh with `provider`.
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_trust_anchor(mut self, trust_anchor: TrustAnchor) -> Self {
        self.endpoint = self.endpoint.with_trust_anchor(trust_anchor);
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Current expiry in (fractional) seconds since the Unix epoch.
    pub fn expires_at(&self) -> f64 {
        self.expires_at
    }

    /// Current expiry truncated to whole seconds, as the CBS link expects.
    pub fn expires_at_secs(&self) -> u64 {
        self.expires_at.trunc() as u64
    }

    pub fn expires_in(&self) -> Duration {
        self.expires_in
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Obtains a fresh token and replaces the current token and expiry.
    ///
    /// Uses the configured [`TokenProvider`] if there is one. Otherwise the
    /// token is re-signed with the stored key name (`username`) and shared
    /// access key (`password`) for the original URI and lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenExpired`] if no provider is configured and
    /// the key material is missing, or whatever the provider returns.
    pub async fn update_token(&mut self) -> Result<(), AuthError> {
        let refreshed = self.fetch_token().await?;
        self.apply_token(refreshed);
        Ok(())
    }

    /// Obtains a fresh token without installing it.
    ///
    /// # Errors
    ///
    /// As [`update_token`](Self::update_token). A token whose expiry is not
    /// in the future is rejected with [`AuthError::TokenExpired`].
    pub async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        let refreshed = match &self.token_provider {
            Some(provider) => provider.update_token(&self.audience).await?,
            None => self.resign_from_shared_key()?,
        };

        if (refreshed.expires_at as f64) <= unix_now() {
            return Err(AuthError::TokenExpired(format!(
                "Refreshed token for '{}' is already expired.",
                self.audience
            )));
        }
        Ok(refreshed)
    }

    /// Installs a token previously returned by [`fetch_token`](Self::fetch_token).
    pub fn apply_token(&mut self, refreshed: AccessToken) {
        self.token = refreshed.token;
        self.expires_at = refreshed.expires_at as f64;
        log::debug!(
            "Refreshed token for '{}', now valid until {}",
            self.audience,
            refreshed.expires_at
        );
    }

    fn resign_from_shared_key(&self) -> Result<AccessToken, AuthError> {
        let (Some(key_name), Some(key)) = (&self.username, &self.password) else {
            return Err(AuthError::TokenExpired(
                "Unable to refresh token - no username or password.".to_string(),
            ));
        };

        SasTokenSigner::sign(key_name, key, &self.uri, self.expires_in).map(AccessToken::from)
    }

    /// Opens a CBS session on `connection` and returns its authenticator.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConnectionSetup`] if the session or CBS link
    /// cannot be opened.
    pub async fn create_authenticator(
        &self,
        connection: &dyn AmqpConnection,
    ) -> Result<CbsAuthenticator, AuthError> {
        CbsAuthenticator::open(connection, self.clone()).await
    }
}

/// Connection credential, one of the supported authentication kinds.
#[derive(Clone, Debug)]
pub enum AuthCredential {
    Plain(PlainCredential),
    Anonymous(AnonymousCredential),
    SasToken(SasTokenCredential),
}

impl AuthCredential {
    pub fn plain(
        hostname: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        AuthCredential::Plain(PlainCredential {
            endpoint: Endpoint::new(hostname),
            username: username.into(),
            password: Zeroizing::new(password.into()),
        })
    }

    pub fn anonymous(hostname: impl Into<String>) -> Self {
        AuthCredential::Anonymous(AnonymousCredential {
            endpoint: Endpoint::new(hostname),
        })
    }

    /// See [`SasTokenCredential::from_shared_access_key`].
    pub fn from_shared_access_key(
        uri: &str,
        key_name: &str,
        shared_access_key: &str,
        expiry: Option<Duration>,
    ) -> Result<Self, AuthError> {
        SasTokenCredential::from_shared_access_key(uri, key_name, shared_access_key, expiry)
            .map(AuthCredential::SasToken)
    }

    /// Creates a SAS credential from a shared access key connection string.
    ///
    /// The token is scoped to `sb://<host>/<entity>`, where the entity is
    /// `entity_path` or the connection string's `EntityPath`.
    pub fn from_connection_string(
        connection_string: &str,
        entity_path: Option<&str>,
    ) -> Result<Self, AuthError> {
        let config = ConnectionStringConfig::parse(connection_string)?;
        let uri = config.resource_uri(entity_path);
        Self::from_shared_access_key(&uri, &config.key_name, &config.key, None)
    }

    /// Creates a SAS credential from loaded configuration.
    pub fn from_config(config: &SasAuthConfig) -> Result<Self, AuthError> {
        let connection = ConnectionStringConfig::parse(&config.connection_string)?;
        let uri = connection.resource_uri(config.entity_path.as_deref());
        let credential = SasTokenCredential::from_shared_access_key(
            &uri,
            &connection.key_name,
            &connection.key,
            Some(Duration::from_secs(config.token_expiry_secs)),
        )?
        .with_timeout(Duration::from_secs(config.timeout_secs))
        .with_retry_policy(config.retry_policy)
        .with_trust_anchor(config.trust_anchor.clone());

        Ok(AuthCredential::SasToken(credential))
    }

    pub fn endpoint(&self) -> &Endpoint {
        match self {
            AuthCredential::Plain(credential) => &credential.endpoint,
            AuthCredential::Anonymous(credential) => &credential.endpoint,
            AuthCredential::SasToken(credential) => &credential.endpoint,
        }
    }

    pub fn with_port(self, port: u16) -> Self {
        self.map_endpoint(|endpoint| endpoint.with_port(port))
    }

    pub fn with_trust_anchor(self, trust_anchor: TrustAnchor) -> Self {
        self.map_endpoint(|endpoint| endpoint.with_trust_anchor(trust_anchor))
    }

    fn map_endpoint(self, f: impl FnOnce(Endpoint) -> Endpoint) -> Self {
        match self {
            AuthCredential::Plain(mut credential) => {
                credential.endpoint = f(credential.endpoint);
                AuthCredential::Plain(credential)
            }
            AuthCredential::Anonymous(mut credential) => {
                credential.endpoint = f(credential.endpoint);
                AuthCredential::Anonymous(credential)
            }
            AuthCredential::SasToken(mut credential) => {
                credential.endpoint = f(credential.endpoint);
                AuthCredential::SasToken(credential)
            }
        }
    }

    pub fn tls_config(&self) -> Result<TlsConfig, AuthError> {
        self.endpoint().tls_config()
    }

    /// SASL mechanism used when the connection opens. Token credentials
    /// authenticate anonymously here and present the token over CBS.
    pub fn sasl_mechanism(&self) -> SaslMechanism {
        match self {
            AuthCredential::Plain(credential) => SaslMechanism::Plain {
                username: credential.username.clone(),
                password: credential.password.clone(),
            },
            AuthCredential::Anonymous(_) | AuthCredential::SasToken(_) => {
                SaslMechanism::Anonymous
            }
        }
    }

    pub fn uses_cbs(&self) -> bool {
        matches!(self, AuthCredential::SasToken(_))
    }

    pub fn as_sas_token(&self) -> Option<&SasTokenCredential> {
        match self {
            AuthCredential::SasToken(credential) => Some(credential),
            _ => None,
        }
    }

    /// Opens a CBS session for token credentials.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] for credentials that authenticate
    /// through SASL, and [`AuthError::ConnectionSetup`] if the CBS session or
    /// link cannot be opened.
    pub async fn create_authenticator(
        &self,
        connection: &dyn AmqpConnection,
    ) -> Result<CbsAuthenticator, AuthError> {
        match self {
            AuthCredential::SasToken(credential) => {
                credential.create_authenticator(connection).await
            }
            AuthCredential::Plain(_) | AuthCredential::Anonymous(_) => {
                Err(AuthError::Configuration(format!(
                    "{} credentials authenticate through SASL, not CBS",
                    self.sasl_mechanism().name()
                )))
            }
        }
    }
}

fn decode_userinfo(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let spaced = raw.replace('+', " ");
    Some(
        urlencoding::decode(&spaced)
            .map(|decoded| decoded.into_owned())
            .unwrap_or(spaced),
    )
}

fn unix_now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
