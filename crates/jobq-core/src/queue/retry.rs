//! Retry policy: decides whether a failed job is retried, and when.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::config::{duration_ms, option_duration_ms};
use crate::domain::{DeadReason, Decision};
use crate::error::QueueError;

/// Retries allowed after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 10;
/// Base backoff before the first retry.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(200);
/// Bound of the random offset added to every backoff.
pub const DEFAULT_JITTER: Duration = Duration::from_millis(50);
/// Lifetime budget, measured from the first claim.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(5 * 60);
/// Constant backoff unless the caller opts into exponential growth.
pub const DEFAULT_MULTIPLIER: f64 = 1.0;

/// Retry policy for failed jobs.
///
/// `decide` is a pure function of its inputs (plus the jitter RNG). Attempt
/// numbers follow the job record: `attempts` counts claims, so after the
/// `n`-th failed attempt `n - 1` retries have been spent.
///
/// Example with delay=200ms, multiplier=2.0, no jitter:
/// - attempt 1 fails: retry after 200ms
/// - attempt 2 fails: retry after 400ms
/// - attempt 3 fails: retry after 800ms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,

    #[serde(rename = "max_duration_ms", with = "duration_ms")]
    pub max_duration: Duration,

    #[serde(rename = "delay_ms", with = "duration_ms")]
    pub delay: Duration,

    #[serde(rename = "jitter_ms", with = "duration_ms")]
    pub jitter: Duration,

    pub multiplier: f64,

    /// Upper bound for the un-jittered backoff.
    #[serde(rename = "max_delay_ms", with = "option_duration_ms")]
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_duration: DEFAULT_MAX_DURATION,
            delay: DEFAULT_DELAY,
            jitter: DEFAULT_JITTER,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// Exponential growth: `delay * multiplier^(attempt - 1)`.
    pub fn exponential(delay: Duration, multiplier: f64) -> Self {
        Self {
            delay,
            multiplier,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), QueueError> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(QueueError::InvalidConfig(format!(
                "retry multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            )));
        }
        if let Some(max_delay) = self.max_delay
            && max_delay < self.delay
        {
            return Err(QueueError::InvalidConfig(format!(
                "max_delay ({max_delay:?}) is smaller than delay ({:?})",
                self.delay
            )));
        }
        Ok(())
    }

    /// Backoff after the `attempts`-th failed attempt, without jitter.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let retries = attempts.saturating_sub(1);
        let exponent = i32::try_from(retries).unwrap_or(i32::MAX);
        let secs = self.delay.as_secs_f64() * self.multiplier.powi(exponent);
        let backoff = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => backoff.min(cap),
            None => backoff,
        }
    }

    /// Budget check shared by failures and expired leases: is a job that has
    /// used `attempts` attempts out of retries or out of time?
    pub fn exhausted(
        &self,
        attempts: u32,
        started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DeadReason> {
        if attempts.saturating_sub(1) >= self.max_retries {
            return Some(DeadReason::RetriesExhausted);
        }
        let max_duration = TimeDelta::from_std(self.max_duration).unwrap_or(TimeDelta::MAX);
        if started_at.is_some_and(|started| now.signed_duration_since(started) >= max_duration) {
            return Some(DeadReason::LifetimeExceeded);
        }
        None
    }

    /// Decide the next state of a job whose `attempts`-th attempt just failed.
    ///
    /// 1. retries spent (`attempts - 1`) >= `max_retries` -> Dead
    /// 2. `now - started_at >= max_duration` -> Dead
    /// 3. otherwise Scheduled at `now + max(backoff ± jitter, 0)`
    pub fn decide<R: Rng + ?Sized>(
        &self,
        attempts: u32,
        started_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Decision {
        if let Some(reason) = self.exhausted(attempts, started_at, now) {
            return Decision::Dead(reason);
        }

        let mut delay_ms = i64::try_from(self.backoff(attempts).as_millis()).unwrap_or(i64::MAX);
        let jitter_ms = i64::try_from(self.jitter.as_millis()).unwrap_or(i64::MAX);
        if jitter_ms > 0 {
            delay_ms = delay_ms.saturating_add(rng.gen_range(-jitter_ms..=jitter_ms));
        }
        let delay = TimeDelta::try_milliseconds(delay_ms.max(0)).unwrap_or(TimeDelta::MAX);

        Decision::Scheduled(
            now.checked_add_signed(delay)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn no_jitter(policy: RetryPolicy) -> RetryPolicy {
        RetryPolicy {
            jitter: Duration::ZERO,
            ..policy
        }
    }

    #[test]
    fn defaults_are_the_documented_constants() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 10);
        assert_eq!(policy.delay, Duration::from_millis(200));
        assert_eq!(policy.jitter, Duration::from_millis(50));
        assert_eq!(policy.max_duration, Duration::from_secs(300));
        assert_eq!(policy.multiplier, 1.0);
        assert_eq!(policy.max_delay, None);
        policy.validate().unwrap();
    }

    #[test]
    fn exponential_backoff_increases() {
        let policy = RetryPolicy::exponential(Duration::from_millis(200), 2.0);

        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }

    #[rstest]
    #[case(1.0)]
    #[case(1.5)]
    #[case(2.0)]
    #[case(10.0)]
    fn backoff_is_non_decreasing(#[case] multiplier: f64) {
        let policy = RetryPolicy::exponential(Duration::from_millis(50), multiplier);
        let delays: Vec<Duration> = (1..=40).map(|n| policy.backoff(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::exponential(Duration::from_secs(1), 10.0);
        assert_eq!(policy.backoff(u32::MAX), Duration::MAX);

        let capped = RetryPolicy {
            max_delay: Some(Duration::from_secs(30)),
            ..policy
        };
        assert_eq!(capped.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[rstest]
    #[case::first_failure(1, false)]
    #[case::third_failure(3, false)]
    #[case::fourth_failure(4, true)]
    #[case::far_beyond(100, true)]
    fn retries_exhausted_after_max_retries_plus_one_attempts(
        #[case] attempts: u32,
        #[case] dead: bool,
    ) {
        let policy = no_jitter(RetryPolicy {
            max_retries: 3,
            ..RetryPolicy::default()
        });
        let decision = policy.decide(attempts, Some(now()), now(), &mut rand::thread_rng());
        assert_eq!(decision.is_dead(), dead);
        if dead {
            assert_eq!(decision, Decision::Dead(DeadReason::RetriesExhausted));
        }
    }

    #[test]
    fn zero_retries_means_first_failure_is_final() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        let decision = policy.decide(1, Some(now()), now(), &mut rand::thread_rng());
        assert_eq!(decision, Decision::Dead(DeadReason::RetriesExhausted));
    }

    #[rstest]
    #[case::just_inside(299, false)]
    #[case::exactly_at_budget(300, true)]
    #[case::past_budget(301, true)]
    fn lifetime_budget_kills_regardless_of_retries(#[case] elapsed_secs: i64, #[case] dead: bool) {
        let policy = RetryPolicy {
            max_retries: 1_000,
            ..RetryPolicy::default()
        };
        let started = now() - TimeDelta::seconds(elapsed_secs);
        let decision = policy.decide(2, Some(started), now(), &mut rand::thread_rng());
        assert_eq!(
            decision == Decision::Dead(DeadReason::LifetimeExceeded),
            dead
        );
    }

    #[rstest]
    #[case::retries_left(1, 0, None)]
    #[case::last_retry_used(4, 0, Some(DeadReason::RetriesExhausted))]
    #[case::out_of_time(2, 300, Some(DeadReason::LifetimeExceeded))]
    fn exhausted_reports_which_budget_ran_out(
        #[case] attempts: u32,
        #[case] elapsed_secs: i64,
        #[case] expected: Option<DeadReason>,
    ) {
        let policy = RetryPolicy {
            max_retries: 3,
            ..RetryPolicy::default()
        };
        let started = now() - TimeDelta::seconds(elapsed_secs);
        assert_eq!(policy.exhausted(attempts, Some(started), now()), expected);
    }

    #[test]
    fn without_started_at_only_retries_matter() {
        let policy = no_jitter(RetryPolicy {
            max_duration: Duration::ZERO,
            ..RetryPolicy::default()
        });
        let decision = policy.decide(1, None, now(), &mut rand::thread_rng());
        assert_eq!(
            decision,
            Decision::Scheduled(now() + TimeDelta::milliseconds(200))
        );
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let Decision::Scheduled(at) = policy.decide(1, Some(now()), now(), &mut rng) else {
                panic!("expected a retry");
            };
            let delay = at - now();
            assert!(delay >= TimeDelta::milliseconds(150));
            assert!(delay <= TimeDelta::milliseconds(250));
        }
    }

    #[test]
    fn jitter_larger_than_backoff_never_schedules_in_the_past() {
        let policy = RetryPolicy {
            delay: Duration::from_millis(10),
            jitter: Duration::from_millis(1_000),
            ..RetryPolicy::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let Decision::Scheduled(at) = policy.decide(1, Some(now()), now(), &mut rng) else {
                panic!("expected a retry");
            };
            assert!(at >= now());
        }
    }

    #[rstest]
    #[case::below_one(0.5)]
    #[case::nan(f64::NAN)]
    #[case::infinite(f64::INFINITY)]
    fn rejects_bad_multipliers(#[case] multiplier: f64) {
        let policy = RetryPolicy {
            multiplier,
            ..RetryPolicy::default()
        };
        assert!(matches!(policy.validate(), Err(QueueError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_cap_below_base_delay() {
        let policy = RetryPolicy {
            max_delay: Some(Duration::from_millis(100)),
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
