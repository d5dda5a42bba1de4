use crate::common::AuthError;
use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// A signed Shared Access Signature together with its absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedToken {
    /// The complete `SharedAccessSignature ...` string
    pub token: String,
    /// Expiry as whole seconds since the Unix epoch (the token's `se=` value)
    pub expires_at: i64,
}

impl std::fmt::Debug for SignedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Signer for Shared Access Signature (SAS) tokens.
///
/// Creates time-limited tokens using HMAC-SHA256 over the percent-encoded
/// resource URI and the absolute expiry. The produced wire format is
///
/// ```text
/// SharedAccessSignature sr=<uri>&sig=<signature>&se=<expiry>&skn=<key name>
/// ```
///
/// with the fields in exactly that order, which is what CBS token validators
/// expect.
///
/// # Security Notes
///
/// - The shared access key bytes are used directly as the HMAC key
/// - The resource URI, signature and key name are percent-encoded
/// - Signing has no side effects; the same inputs and expiry instant always
///   produce the same token
///
/// # Examples
///
/// ```no_run
/// use cbs::auth::SasTokenSigner;
/// use std::time::Duration;
///
/// let signed = SasTokenSigner::sign(
///     "RootManageSharedAccessKey",
///     "shared_access_key",
///     "sb://my-namespace.servicebus.windows.net/queue",
///     Duration::from_secs(1200),
/// )?;
/// println!("token valid until {}", signed.expires_at);
/// ```
pub struct SasTokenSigner;

impl SasTokenSigner {
    /// Signs a token that expires `expires_in` from now.
    ///
    /// The absolute expiry is the current Unix time truncated to whole
    /// seconds plus the whole seconds of `expires_in`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the HMAC cannot be keyed.
    pub fn sign(
        key_name: &str,
        shared_key: &str,
        resource_uri: &str,
        expires_in: Duration,
    ) -> Result<SignedToken, AuthError> {
        let lifetime = i64::try_from(expires_in.as_secs()).map_err(|_| {
            AuthError::Configuration(format!("Token lifetime too large: {expires_in:?}"))
        })?;
        let expiry = Utc::now().timestamp().saturating_add(lifetime);
        Self::sign_at(key_name, shared_key, resource_uri, expiry)
    }

    /// Signs a token with an explicit absolute expiry (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the HMAC cannot be keyed.
    pub fn sign_at(
        key_name: &str,
        shared_key: &str,
        resource_uri: &str,
        expires_at: i64,
    ) -> Result<SignedToken, AuthError> {
        let encoded_uri = urlencoding::encode(resource_uri);
        let string_to_sign = format!("{encoded_uri}\n{expires_at}");

        let mut mac = HmacSha256::new_from_slice(shared_key.as_bytes()).map_err(|e| {
            AuthError::Configuration(format!("Failed to create HMAC: {e}"))
        })?;

        mac.update(string_to_sign.as_bytes());
        let signature = mac.finalize();
        let signature_base64 = general_purpose::STANDARD.encode(signature.into_bytes());

        let token = format!(
            "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
            encoded_uri,
            urlencoding::encode(&signature_base64),
            expires_at,
            urlencoding::encode(key_name)
        );

        Ok(SignedToken { token, expires_at })
    }

    /// Extracts a field (`sr`, `sig`, `se`, `skn`) from a signed token.
    pub fn token_field<'a>(token: &'a str, field: &str) -> Option<&'a str> {
        let body = token.strip_prefix("SharedAccessSignature ")?;
        body.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == field).then_some(value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "sb://my-namespace.servicebus.windows.net/orders";

    #[test]
    fn test_sign_is_deterministic_for_fixed_expiry() {
        let first = SasTokenSigner::sign_at("keyName", "secret", URI, 1_700_000_000).unwrap();
        let second = SasTokenSigner::sign_at("keyName", "secret", URI, 1_700_000_000).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.expires_at, 1_700_000_000);
    }

    #[test]
    fn test_token_field_order_and_encoding() {
        let signed = SasTokenSigner::sign_at("key name", "secret", URI, 1_700_000_000).unwrap();
        let token = &signed.token;

        assert!(token.starts_with(
            "SharedAccessSignature sr=sb%3A%2F%2Fmy-namespace.servicebus.windows.net%2Forders&sig="
        ));
        let sr = token.find("sr=").unwrap();
        let sig = token.find("&sig=").unwrap();
        let se = token.find("&se=").unwrap();
        let skn = token.find("&skn=").unwrap();
        assert!(sr < sig && sig < se && se < skn);

        assert_eq!(SasTokenSigner::token_field(token, "se"), Some("1700000000"));
        assert_eq!(SasTokenSigner::token_field(token, "skn"), Some("key%20name"));
    }

    #[test]
    fn test_signature_matches_reference_hmac() {
        let signed = SasTokenSigner::sign_at("keyName", "secret", URI, 1_700_000_000).unwrap();

        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(format!("{}\n1700000000", urlencoding::encode(URI)).as_bytes());
        let expected = general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        let sig = SasTokenSigner::token_field(&signed.token, "sig").unwrap();
        assert_eq!(urlencoding::decode(sig).unwrap(), expected);
    }

    #[test]
    fn test_shifted_clock_changes_only_expiry_and_signature() {
        let early = SasTokenSigner::sign_at("keyName", "secret", URI, 1_700_000_000).unwrap();
        let late = SasTokenSigner::sign_at("keyName", "secret", URI, 1_700_000_060).unwrap();

        let field = |token: &str, name: &str| {
            SasTokenSigner::token_field(token, name).map(str::to_string)
        };
        assert_eq!(field(&early.token, "sr"), field(&late.token, "sr"));
        assert_eq!(field(&early.token, "skn"), field(&late.token, "skn"));
        assert_ne!(field(&early.token, "se"), field(&late.token, "se"));
        assert_ne!(field(&early.token, "sig"), field(&late.token, "sig"));
    }

    #[test]
    fn test_sign_stamps_current_time() {
        let before = Utc::now().timestamp();
        let signed =
            SasTokenSigner::sign("keyName", "secret", URI, Duration::from_secs(1200)).unwrap();
        let after = Utc::now().timestamp();

        assert!(signed.expires_at >= before + 1200);
        assert!(signed.expires_at <= after + 1200);
    }

    #[test]
    fn test_token_field_rejects_foreign_format() {
        assert_eq!(SasTokenSigner::token_field("Bearer abc", "se"), None);
    }
}
