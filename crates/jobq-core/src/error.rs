use thiserror::Error;

use crate::domain::{JobId, JobState};
use crate::ports::{IdGenError, StoreError};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("job record encoding: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),

    #[error("id generation failed: {0}")]
    IdGeneration(#[from] IdGenError),

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {0} is {1}; only dead or done jobs can be purged")]
    NotTerminal(JobId, JobState),

    #[error("store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
