//! Queue configuration.
//!
//! One explicit struct with named fields and documented defaults, validated
//! once when the queue is built. Durations are written as integer milliseconds
//! in serialized form (`poll_interval_ms`, `delay_ms`, ...).

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;
use crate::error::QueueError;

/// Jobs claimed per poll cycle.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Idle wait between empty poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Upper bound of jobs claimed in one transaction.
    pub batch_size: usize,

    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,

    pub retry: RetryPolicy,

    /// When set, claims expire after this long and `InProgress` jobs whose
    /// lease ran out are claimed again. Must exceed the slowest handler.
    #[serde(rename = "lease_timeout_ms", with = "option_duration_ms")]
    pub lease_timeout: Option<Duration>,

    /// Keep succeeded jobs as `Done` instead of deleting them.
    pub keep_completed: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
            lease_timeout: None,
            keep_completed: false,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.batch_size == 0 {
            return Err(QueueError::InvalidConfig("batch_size must be > 0".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(QueueError::InvalidConfig(
                "poll_interval must be > 0".into(),
            ));
        }
        if self.lease_timeout.is_some_and(|ttl| ttl.is_zero()) {
            return Err(QueueError::InvalidConfig(
                "lease_timeout must be > 0 when set".into(),
            ));
        }
        self.lease()?;
        self.retry.validate()
    }

    /// Lease timeout as a calendar delta.
    pub(crate) fn lease(&self) -> Result<Option<TimeDelta>, QueueError> {
        self.lease_timeout
            .map(|ttl| {
                TimeDelta::from_std(ttl).map_err(|_| {
                    QueueError::InvalidConfig(format!("lease_timeout {ttl:?} is out of range"))
                })
            })
            .transpose()
    }

    /// Parse a JSON config document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, QueueError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| QueueError::InvalidConfig(format!("config parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

/// Duration as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Optional duration as integer milliseconds (`null` = unset).
pub(crate) mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => {
                serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = QueueConfig::default();
        config.validate().unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.lease_timeout, None);
        assert!(!config.keep_completed);
    }

    #[test]
    fn empty_json_is_all_defaults() {
        let config = QueueConfig::from_json("{}").unwrap();
        assert_eq!(config, QueueConfig::default());
    }

    #[test]
    fn json_fields_are_milliseconds() {
        let config = QueueConfig::from_json(
            r#"{
                "batch_size": 3,
                "poll_interval_ms": 25,
                "lease_timeout_ms": 30000,
                "retry": { "max_retries": 3, "delay_ms": 10, "multiplier": 2.0 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.batch_size, 3);
        assert_eq!(config.poll_interval, Duration::from_millis(25));
        assert_eq!(config.lease_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.delay, Duration::from_millis(10));
        assert_eq!(config.retry.multiplier, 2.0);
        // untouched retry fields keep their defaults
        assert_eq!(config.retry.jitter, Duration::from_millis(50));
        assert_eq!(config.retry.max_duration, Duration::from_secs(300));
    }

    #[test]
    fn serialized_form_round_trips() {
        let config = QueueConfig {
            lease_timeout: Some(Duration::from_millis(1_500)),
            ..QueueConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"lease_timeout_ms\":1500"));
        assert_eq!(QueueConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn rejects_invalid_values() {
        for bad in [
            r#"{"batch_size": 0}"#,
            r#"{"poll_interval_ms": 0}"#,
            r#"{"lease_timeout_ms": 0}"#,
            r#"{"retry": {"multiplier": 0.5}}"#,
            r#"{"retry": {"delay_ms": -5}}"#,
        ] {
            assert!(
                matches!(QueueConfig::from_json(bad), Err(QueueError::InvalidConfig(_))),
                "accepted {bad}"
            );
        }
    }
}
