//! Job record: payload + lifecycle metadata.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::decision::Decision;
use super::ids::JobId;
use super::state::JobState;

/// The persisted unit of work.
///
/// Design:
/// - This is the single source of truth for a job; the store holds nothing else.
/// - All state transitions happen through methods so the field invariants hold:
///   `scheduled_at` is only set while `Scheduled`, `lease_expires_at` only while
///   `InProgress`, and `started_at` is written once.
/// - The payload is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job<P> {
    pub id: JobId,
    pub payload: P,
    pub state: JobState,

    /// Number of times this job has been claimed (including the current claim).
    pub attempts: u32,

    /// Last handler error, if any attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// First claim time. Drives the lifetime budget.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// Due time while `Scheduled`.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Lease expiry while `InProgress`, when leases are enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
}

impl<P> Job<P> {
    pub fn new(id: JobId, payload: P) -> Self {
        Self {
            id,
            payload,
            state: JobState::Available,
            attempts: 0,
            last_error: None,
            started_at: None,
            scheduled_at: None,
            lease_expires_at: None,
        }
    }

    /// Can this job be claimed at `now`?
    ///
    /// `Available` always; `Scheduled` once due; `InProgress` only when its lease
    /// has expired.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Available => true,
            JobState::Scheduled => self.scheduled_at.is_none_or(|at| at <= now),
            JobState::InProgress => self.lease_expires_at.is_some_and(|at| at <= now),
            JobState::Dead | JobState::Done => false,
        }
    }

    /// Mark as claimed (increment attempts).
    pub fn claim(&mut self, now: DateTime<Utc>, lease: Option<TimeDelta>) {
        self.state = JobState::InProgress;
        self.attempts = self.attempts.saturating_add(1);
        self.started_at.get_or_insert(now);
        self.scheduled_at = None;
        self.lease_expires_at =
            lease.map(|ttl| now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC));
    }

    /// Record a failed attempt and move to the decided state.
    pub fn fail(&mut self, error: String, decision: Decision) {
        self.last_error = Some(error);
        self.lease_expires_at = None;
        match decision {
            Decision::Scheduled(at) => {
                self.state = JobState::Scheduled;
                self.scheduled_at = Some(at);
            }
            Decision::Dead(_) => {
                self.state = JobState::Dead;
                self.scheduled_at = None;
            }
        }
    }

    /// Mark as succeeded.
    pub fn complete(&mut self) {
        self.state = JobState::Done;
        self.scheduled_at = None;
        self.lease_expires_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeadReason;
    use chrono::TimeZone;
    use rstest::rstest;
    use ulid::Ulid;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn job() -> Job<&'static str> {
        Job::new(JobId::from_ulid(Ulid::new()), "payload")
    }

    #[test]
    fn new_job_is_available_and_blank() {
        let job = job();
        assert_eq!(job.state, JobState::Available);
        assert_eq!(job.attempts, 0);
        assert!(job.last_error.is_none());
        assert!(job.started_at.is_none());
        assert!(job.scheduled_at.is_none());
        assert!(job.is_eligible(t(0)));
    }

    #[test]
    fn claim_sets_started_at_once() {
        let mut job = job();
        job.claim(t(0), None);
        assert_eq!(job.state, JobState::InProgress);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.started_at, Some(t(0)));

        job.fail("boom".into(), Decision::Scheduled(t(5)));
        job.claim(t(10), None);
        assert_eq!(job.attempts, 2);
        assert_eq!(job.started_at, Some(t(0)));
        assert_eq!(job.scheduled_at, None);
    }

    #[rstest]
    #[case::before_due(4, false)]
    #[case::exactly_due(5, true)]
    #[case::after_due(6, true)]
    fn scheduled_job_becomes_eligible_when_due(#[case] now: i64, #[case] eligible: bool) {
        let mut job = job();
        job.claim(t(0), None);
        job.fail("boom".into(), Decision::Scheduled(t(5)));

        assert_eq!(job.state, JobState::Scheduled);
        assert_eq!(job.last_error.as_deref(), Some("boom"));
        assert_eq!(job.is_eligible(t(now)), eligible);
    }

    #[test]
    fn in_progress_is_only_eligible_after_lease_expiry() {
        let mut job = job();
        job.claim(t(0), None);
        assert!(!job.is_eligible(t(1_000_000)));

        let mut leased = self::job();
        leased.claim(t(0), Some(TimeDelta::seconds(30)));
        assert_eq!(leased.lease_expires_at, Some(t(30)));
        assert!(!leased.is_eligible(t(29)));
        assert!(leased.is_eligible(t(30)));
    }

    #[test]
    fn dead_and_done_are_never_eligible() {
        let mut dead = job();
        dead.claim(t(0), Some(TimeDelta::seconds(1)));
        dead.fail("boom".into(), Decision::Dead(DeadReason::RetriesExhausted));
        assert_eq!(dead.state, JobState::Dead);
        assert!(dead.scheduled_at.is_none());
        assert!(dead.lease_expires_at.is_none());
        assert!(!dead.is_eligible(t(1_000)));

        let mut done = job();
        done.claim(t(0), None);
        done.complete();
        assert!(!done.is_eligible(t(1_000)));
    }
}
