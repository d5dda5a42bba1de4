use super::retry_policy::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default port for AMQP over TLS.
pub const DEFAULT_AMQPS_PORT: u16 = 5671;

/// Default lifetime of tokens signed from a shared access key (20 minutes).
pub const AUTH_EXPIRATION_SECS: u64 = 20 * 60;

/// Default timeout for a single CBS put-token operation.
pub const DEFAULT_CBS_TIMEOUT: Duration = Duration::from_secs(10);

/// Token type presented on the CBS link for SAS tokens.
pub const DEFAULT_SAS_TOKEN_TYPE: &str = "servicebus.windows.net:sastoken";

/// Source of the certificates used to verify the remote endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustAnchor {
    /// Use the platform certificate store
    #[default]
    System,
    /// PEM bundle on disk
    Path(PathBuf),
    /// PEM bundle already in memory
    Pem(Vec<u8>),
}

/// Configuration for SAS token authentication from a connection string.
///
/// # Connection String Format
///
/// The connection string must include:
/// - `Endpoint` - Namespace endpoint, e.g. `sb://my-namespace.servicebus.windows.net/`
/// - `SharedAccessKeyName` - Name of the shared access policy
/// - `SharedAccessKey` - The shared access key value
///
/// `EntityPath` may be included in the connection string or set through
/// `entity_path`; the explicit field wins.
///
/// # Examples
///
/// ```no_run
/// use cbs::auth::types::SasAuthConfig;
///
/// let config: SasAuthConfig = serde_json::from_str(r#"{
///     "connection_string": "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=abc",
///     "entity_path": "orders",
///     "retry_policy": { "max_retries": 5, "backoff_ms": 200 }
/// }"#)?;
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct SasAuthConfig {
    /// Connection string holding the endpoint and key material (REQUIRED)
    pub connection_string: String,
    /// Entity (queue, topic, event hub) the token is scoped to
    #[serde(default)]
    pub entity_path: Option<String>,
    /// Lifetime of each signed token in seconds
    #[serde(default = "default_token_expiry_secs")]
    pub token_expiry_secs: u64,
    /// Timeout for CBS put-token operations in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry policy applied to failed put-token requests
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Certificates used to verify the endpoint
    #[serde(default)]
    pub trust_anchor: TrustAnchor,
}

impl std::fmt::Debug for SasAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SasAuthConfig")
            .field("connection_string", &"<redacted>")
            .field("entity_path", &self.entity_path)
            .field("token_expiry_secs", &self.token_expiry_secs)
            .field("timeout_secs", &self.timeout_secs)
            .field("retry_policy", &self.retry_policy)
            .field("trust_anchor", &self.trust_anchor)
            .finish()
    }
}

fn default_token_expiry_secs() -> u64 {
    AUTH_EXPIRATION_SECS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_CBS_TIMEOUT.as_secs()
}
