//! Handler trait - the caller-supplied work function.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::Job;

/// Error returned by a handler. Never fatal to the engine; it is stored on
/// the record as `last_error` and drives the retry decision.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Per-run context handed to every handler invocation.
#[derive(Debug, Clone)]
pub struct JobContext {
    cancellation: CancellationToken,
}

impl JobContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self { cancellation }
    }

    /// Cancelled when the engine has been asked to stop. Long handlers may
    /// bail out early; the engine itself only stops between batches.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Processes one job.
///
/// The engine calls a handler at most once concurrently per job id. The
/// record's `attempts` is the number of the current attempt (1 on first run).
///
/// # 使用例
/// ```ignore
/// struct SendEmail;
///
/// #[async_trait]
/// impl JobHandler<Email> for SendEmail {
///     async fn handle(&self, _ctx: &JobContext, job: &Job<Email>) -> Result<(), HandlerError> {
///         smtp::send(&job.payload).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobHandler<P: Sync>: Send + Sync {
    async fn handle(&self, ctx: &JobContext, job: &Job<P>) -> Result<(), HandlerError>;
}
