//! Demo handler for `jobq run`.
//!
//! Payload fields it understands (all optional):
//! - `fail_times`: fail while the attempt number is <= this
//! - `work_ms`: pretend to work this long
//! - `name`: printed on success

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use jobq_core::{HandlerError, Job, JobContext, JobHandler};

pub struct DemoHandler;

#[async_trait]
impl JobHandler<Value> for DemoHandler {
    async fn handle(&self, ctx: &JobContext, job: &Job<Value>) -> Result<(), HandlerError> {
        let payload = &job.payload;

        if let Some(ms) = payload.get("work_ms").and_then(Value::as_u64) {
            tokio::select! {
                _ = ctx.cancellation().cancelled() => return Err("interrupted".into()),
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
            }
        }

        let fail_times = payload
            .get("fail_times")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if u64::from(job.attempts) <= fail_times {
            return Err(format!(
                "intentional failure (attempt {} of {} planned failures)",
                job.attempts, fail_times
            )
            .into());
        }

        let name = payload.get("name").and_then(Value::as_str).unwrap_or("job");
        info!(job_id = %job.id, attempt = job.attempts, "done");
        println!("{} finished {name} (attempt {})", job.id, job.attempts);
        Ok(())
    }
}
