//! Job state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job record.
///
/// State transitions:
/// - Available -> InProgress (claimed)
/// - InProgress -> Done (handler succeeded; the record is normally deleted)
/// - InProgress -> Scheduled (handler failed, retries remain)
/// - InProgress -> Dead (retries or lifetime exhausted)
/// - Scheduled -> InProgress (due, claimed again)
/// - InProgress -> InProgress (lease expired and reclaimed, only with a lease timeout)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Ready to be claimed immediately.
    Available,

    /// Claimed by an engine; the handler is running or about to run.
    InProgress,

    /// Waiting for its backoff to elapse.
    Scheduled,

    /// Failed permanently. Kept for inspection until purged.
    Dead,

    /// Completed. Only persisted when completed jobs are retained.
    Done,
}

impl JobState {
    /// Is this a terminal state (never claimed again)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Dead | JobState::Done)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Available => "available",
            JobState::InProgress => "in_progress",
            JobState::Scheduled => "scheduled",
            JobState::Dead => "dead",
            JobState::Done => "done",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::available(JobState::Available, false)]
    #[case::in_progress(JobState::InProgress, false)]
    #[case::scheduled(JobState::Scheduled, false)]
    #[case::dead(JobState::Dead, true)]
    #[case::done(JobState::Done, true)]
    fn terminal_states(#[case] state: JobState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }

    #[test]
    fn serde_name_matches_display() {
        let json = serde_json::to_string(&JobState::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(JobState::InProgress.to_string(), "in_progress");
    }
}
