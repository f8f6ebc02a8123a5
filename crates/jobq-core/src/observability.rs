use serde::{Deserialize, Serialize};

use crate::domain::JobState;

/// Number of stored records per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub available: usize,
    pub in_progress: usize,
    pub scheduled: usize,
    pub dead: usize,
    pub done: usize,
}

impl QueueCounts {
    pub fn record(&mut self, state: JobState) {
        match state {
            JobState::Available => self.available += 1,
            JobState::InProgress => self.in_progress += 1,
            JobState::Scheduled => self.scheduled += 1,
            JobState::Dead => self.dead += 1,
            JobState::Done => self.done += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.available + self.in_progress + self.scheduled + self.dead + self.done
    }

    /// Jobs that can still run.
    pub fn active(&self) -> usize {
        self.available + self.in_progress + self.scheduled
    }
}
