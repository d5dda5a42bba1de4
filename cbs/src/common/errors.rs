use thiserror::Error;

/// Errors surfaced by credential construction, token signing and the CBS
/// authentication state machine.
///
/// Each variant maps to one failure class a caller may want to react to
/// differently: a bad target is a reachability problem, an expired or
/// rejected token is a credential validity problem, and everything else is
/// either a protocol inconsistency or a configuration mistake.
///
/// # Error Categories
///
/// ## Setup Errors
/// - [`ConnectionSetup`] - The CBS session or link could not be opened
/// - [`Configuration`] - The credential or connection string is malformed
///
/// ## Token Errors
/// - [`TokenExpired`] - No valid token can be produced or refreshed
/// - [`TokenAuthFailure`] - The server rejected the token after all retries
///
/// ## Protocol Errors
/// - [`Authentication`] - Unexpected link state or transport failure
///
/// # Examples
///
/// ```no_run
/// use cbs::common::AuthError;
///
/// fn describe(error: &AuthError) -> &'static str {
///     match error {
///         AuthError::ConnectionSetup(_) => "check the endpoint",
///         AuthError::TokenExpired(_) | AuthError::TokenAuthFailure { .. } => "check the key",
///         AuthError::Authentication(_) => "protocol failure",
///         AuthError::Configuration(_) => "fix the configuration",
///     }
/// }
/// ```
///
/// [`ConnectionSetup`]: AuthError::ConnectionSetup
/// [`Configuration`]: AuthError::Configuration
/// [`TokenExpired`]: AuthError::TokenExpired
/// [`TokenAuthFailure`]: AuthError::TokenAuthFailure
/// [`Authentication`]: AuthError::Authentication
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The authentication session or CBS link could not be established.
    #[error("Connection setup failed: {0}")]
    ConnectionSetup(String),

    /// The credential cannot produce or refresh a valid token.
    #[error("Token expired: {0}")]
    TokenExpired(String),

    /// The server rejected the put-token request and retries are exhausted.
    #[error("Token authentication failed: {description} (code {code})")]
    TokenAuthFailure { description: String, code: i32 },

    /// Protocol-level inconsistency while driving the CBS link.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// The credential was constructed with invalid or missing values.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AuthError {
    /// Returns `true` when the failure is caused by the token itself rather
    /// than by transport reachability or local configuration.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            AuthError::TokenExpired(_) | AuthError::TokenAuthFailure { .. }
        )
    }
}

/// Failure reported by the underlying AMQP session or link implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} failed: {reason}")]
pub struct TransportError {
    /// The transport operation that failed (e.g. "get_status")
    pub operation: &'static str,
    /// Human-readable detail from the transport
    pub reason: String,
}

impl TransportError {
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

impl From<TransportError> for AuthError {
    fn from(err: TransportError) -> Self {
        AuthError::Authentication(format!("Token authentication failed: {err}"))
    }
}
