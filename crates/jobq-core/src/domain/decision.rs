//! Decision model: what happens to a job after its handler failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a job was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadReason {
    /// The retry budget (`max_retries`) is spent.
    RetriesExhausted,

    /// The job has been alive longer than `max_duration` since its first claim.
    LifetimeExceeded,
}

impl std::fmt::Display for DeadReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeadReason::RetriesExhausted => f.write_str("retries exhausted"),
            DeadReason::LifetimeExceeded => f.write_str("lifetime exceeded"),
        }
    }
}

/// The next state of a failed job.
///
/// Produced by [`RetryPolicy::decide`](crate::queue::RetryPolicy::decide), which is
/// a pure function: applying the decision to the record is the engine's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Retry once the due time has passed.
    Scheduled(DateTime<Utc>),

    /// Give up.
    Dead(DeadReason),
}

impl Decision {
    pub fn is_dead(&self) -> bool {
        matches!(self, Decision::Dead(_))
    }
}
