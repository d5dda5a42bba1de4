mod common;

use cbs::auth::{AuthCredential, SasTokenCredential, SasTokenSigner};
use cbs::common::AuthError;
use common::TEST_URI;
use std::time::Duration;

// Helper module for token refresh testing
mod token_refresh_helpers {
    use super::*;

    pub fn expiry_of(credential: &SasTokenCredential) -> i64 {
        SasTokenSigner::token_field(credential.token(), "se")
            .expect("token should carry se=")
            .parse()
            .expect("se= should be an integer")
    }
}

use token_refresh_helpers::*;

#[tokio::test]
async fn test_shared_key_refresh_extends_expiry() {
    let credential = AuthCredential::from_shared_access_key(TEST_URI, "keyName", "secret", None)
        .expect("credential should be created");
    let mut sas = credential
        .as_sas_token()
        .expect("shared key credential uses CBS")
        .clone();
    let original_token = sas.token().to_string();
    let original_expiry = expiry_of(&sas);

    // se= has one second resolution
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    sas.update_token().await.expect("refresh should succeed");

    assert!(expiry_of(&sas) > original_expiry);
    assert_ne!(sas.token(), original_token);
    assert_eq!(sas.expires_at_secs() as i64, expiry_of(&sas));
    assert_eq!(
        SasTokenSigner::token_field(sas.token(), "sr"),
        SasTokenSigner::token_field(&original_token, "sr")
    );
    assert_eq!(SasTokenSigner::token_field(sas.token(), "skn"), Some("keyName"));
}

#[tokio::test]
async fn test_refresh_keeps_configured_lifetime() {
    let mut credential = SasTokenCredential::from_shared_access_key(
        TEST_URI,
        "keyName",
        "secret",
        Some(Duration::from_secs(90)),
    )
    .unwrap();

    credential.update_token().await.unwrap();

    let now = chrono::Utc::now().timestamp();
    let remaining = expiry_of(&credential) - now;
    assert!((89..=90).contains(&remaining), "remaining lifetime was {remaining}s");
}

#[tokio::test]
async fn test_userinfo_credentials_enable_refresh() {
    let mut credential = SasTokenCredential::builder(
        TEST_URI,
        "sb://keyName:secret@test-namespace.servicebus.windows.net/orders",
        "initial-token",
    )
    .expires_in(Duration::from_secs(300))
    .build()
    .unwrap();

    credential.update_token().await.unwrap();
    assert!(credential.token().starts_with("SharedAccessSignature sr="));
    assert_eq!(
        SasTokenSigner::token_field(credential.token(), "skn"),
        Some("keyName")
    );
}

#[tokio::test]
async fn test_token_without_key_material_cannot_refresh() {
    let mut credential = SasTokenCredential::builder(TEST_URI, TEST_URI, "initial-token")
        .expires_at(chrono::Utc::now().timestamp() as f64 + 600.0)
        .build()
        .unwrap();

    let err = credential.update_token().await.unwrap_err();
    assert!(matches!(err, AuthError::TokenExpired(_)));
    assert_eq!(credential.token(), "initial-token");
}
