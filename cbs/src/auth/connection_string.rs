use crate::common::AuthError;
use std::collections::HashMap;
use zeroize::Zeroizing;

/// Splits a `key1=value1;key2=value2` connection string into its fields.
///
/// The first `=` of each segment separates the key from the value, so values
/// may themselves contain `=` (base64 keys usually do). There is no escaping
/// of `;` inside values. Empty segments, such as the one left by a trailing
/// `;`, are skipped.
///
/// # Errors
///
/// Returns [`AuthError::Configuration`] if a segment has no `=`.
pub fn parse_connection_string(
    connection_string: &str,
) -> Result<HashMap<String, String>, AuthError> {
    let mut fields = HashMap::new();

    for segment in connection_string.split(';') {
        if segment.trim().is_empty() {
            continue;
        }

        let (key, value) = segment.split_once('=').ok_or_else(|| {
            AuthError::Configuration(format!(
                "Malformed connection string segment '{}'",
                segment.trim()
            ))
        })?;

        if fields.insert(key.to_string(), value.to_string()).is_some() {
            log::debug!("Connection string key '{key}' appears more than once, keeping the last");
        }
    }

    Ok(fields)
}

/// Shared access key material extracted from a connection string.
#[derive(Clone)]
pub struct ConnectionStringConfig {
    /// Endpoint as given, e.g. `sb://my-namespace.servicebus.windows.net/`
    pub endpoint: String,
    /// Host part of the endpoint
    pub host: String,
    pub key_name: String,
    pub key: Zeroizing<String>,
    pub entity_path: Option<String>,
}

impl std::fmt::Debug for ConnectionStringConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStringConfig")
            .field("endpoint", &self.endpoint)
            .field("host", &self.host)
            .field("key_name", &self.key_name)
            .field("key", &"<redacted>")
            .field("entity_path", &self.entity_path)
            .finish()
    }
}

impl ConnectionStringConfig {
    /// Parses and validates a shared access key connection string.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the string is empty, malformed,
    /// or missing `Endpoint`, `SharedAccessKeyName` or `SharedAccessKey`.
    pub fn parse(connection_string: &str) -> Result<Self, AuthError> {
        if connection_string.trim().is_empty() {
            return Err(AuthError::Configuration(
                "Connection string cannot be empty".to_string(),
            ));
        }

        let mut fields = parse_connection_string(connection_string)?;

        let endpoint = fields.remove("Endpoint").ok_or_else(|| {
            AuthError::Configuration("Missing Endpoint in connection string".to_string())
        })?;
        let key_name = fields.remove("SharedAccessKeyName").ok_or_else(|| {
            AuthError::Configuration(
                "Missing SharedAccessKeyName in connection string".to_string(),
            )
        })?;
        let key = fields.remove("SharedAccessKey").ok_or_else(|| {
            AuthError::Configuration("Missing SharedAccessKey in connection string".to_string())
        })?;
        let entity_path = fields.remove("EntityPath").filter(|path| !path.is_empty());

        // Endpoint looks like "sb://namespace.servicebus.windows.net/"
        let host = endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(endpoint.as_str())
            .trim_end_matches('/')
            .to_string();
        if host.is_empty() {
            return Err(AuthError::Configuration(format!(
                "Endpoint '{endpoint}' has no host"
            )));
        }

        Ok(Self {
            endpoint,
            host,
            key_name,
            key: Zeroizing::new(key),
            entity_path,
        })
    }

    /// Resource URI a token for `entity_path` is scoped to.
    pub fn resource_uri(&self, entity_path: Option<&str>) -> String {
        match entity_path.or(self.entity_path.as_deref()) {
            Some(entity) => format!("sb://{}/{}", self.host, entity.trim_start_matches('/')),
            None => format!("sb://{}/", self.host),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::{assert_err, assert_ok};

    #[test]
    fn test_parse_splits_on_first_equals() {
        let fields = parse_connection_string(
            "Endpoint=sb://x;SharedAccessKeyName=k;SharedAccessKey=v",
        )
        .unwrap();

        let expected: HashMap<String, String> = [
            ("Endpoint", "sb://x"),
            ("SharedAccessKeyName", "k"),
            ("SharedAccessKey", "v"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(fields, expected);

        let fields = assert_ok!(parse_connection_string("SharedAccessKey=abc==;"));
        assert_eq!(fields["SharedAccessKey"], "abc==");
    }

    #[test]
    fn test_parse_rejects_segment_without_equals() {
        let err = assert_err!(parse_connection_string("Endpoint=sb://x;garbage"));
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn test_config_extracts_host_and_entity() {
        let config = ConnectionStringConfig::parse(
            "Endpoint=sb://ns.servicebus.windows.net/;SharedAccessKeyName=send;\
             SharedAccessKey=abc=;EntityPath=orders",
        )
        .unwrap();

        assert_eq!(config.host, "ns.servicebus.windows.net");
        assert_eq!(config.key_name, "send");
        assert_eq!(config.key.as_str(), "abc=");
        assert_eq!(config.entity_path.as_deref(), Some("orders"));
        assert_eq!(
            config.resource_uri(None),
            "sb://ns.servicebus.windows.net/orders"
        );
        assert_eq!(
            config.resource_uri(Some("events")),
            "sb://ns.servicebus.windows.net/events"
        );
        assert!(!format!("{config:?}").contains("abc="));
    }

    #[test]
    fn test_config_requires_key_material() {
        let missing_key =
            ConnectionStringConfig::parse("Endpoint=sb://ns/;SharedAccessKeyName=send");
        assert_eq!(
            missing_key.unwrap_err(),
            AuthError::Configuration("Missing SharedAccessKey in connection string".to_string())
        );

        assert_err!(ConnectionStringConfig::parse("   "));
        assert_err!(ConnectionStringConfig::parse(
            "Endpoint=sb://;SharedAccessKeyName=a;SharedAccessKey=b"
        ));
    }
}
