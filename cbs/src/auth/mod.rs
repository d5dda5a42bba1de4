pub mod connection_string;
pub mod credential;
pub mod provider;
pub mod retry_policy;
pub mod sas_token_generator;
pub mod types;

pub use connection_string::{ConnectionStringConfig, parse_connection_string};
pub use credential::{
    AnonymousCredential, AuthCredential, Endpoint, PlainCredential, SaslMechanism,
    SasTokenCredential, SasTokenCredentialBuilder, TlsConfig,
};
pub use provider::{AccessToken, SharedKeyTokenProvider, StaticTokenProvider, TokenProvider};
pub use retry_policy::RetryPolicy;
pub use sas_token_generator::{SasTokenSigner, SignedToken};
pub use types::{SasAuthConfig, TrustAnchor};
