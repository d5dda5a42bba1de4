use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for put-token requests during CBS authentication.
///
/// `max_retries` is exclusive of the initial attempt, so the default policy
/// allows four put-token requests in total. The same fixed `backoff` is
/// slept before every retry.
///
/// # Examples
///
/// ```no_run
/// use cbs::auth::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(5, Duration::from_millis(250));
/// assert_eq!(policy.max_retries(), 5);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    max_retries: u32,
    #[serde(rename = "backoff_ms", with = "duration_millis")]
    backoff: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Number of retries allowed after the first failed put-token request.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay slept before each retry.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES, Duration::ZERO)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 3);
        assert_eq!(policy.backoff(), Duration::ZERO);
    }

    #[test]
    fn test_policy_from_config() {
        let policy: RetryPolicy =
            serde_json::from_str(r#"{"max_retries": 7, "backoff_ms": 1500}"#).unwrap();
        assert_eq!(policy, RetryPolicy::new(7, Duration::from_millis(1500)));

        let partial: RetryPolicy = serde_json::from_str(r#"{"backoff_ms": 20}"#).unwrap();
        assert_eq!(partial.max_retries(), 3);
        assert_eq!(partial.backoff(), Duration::from_millis(20));
    }
}
