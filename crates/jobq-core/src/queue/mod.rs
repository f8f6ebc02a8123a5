//! Queue module: engine, builder, retry policy, config and record codec.

mod builder;
pub mod codec;
mod config;
mod engine;
mod handler;
mod retry;

pub use builder::QueueBuilder;
pub use config::{DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL, QueueConfig};
pub use engine::{LEASE_EXPIRED, Payload, Queue};
pub use handler::{HandlerError, JobContext, JobHandler};
pub use retry::{
    DEFAULT_DELAY, DEFAULT_JITTER, DEFAULT_MAX_DURATION, DEFAULT_MAX_RETRIES, DEFAULT_MULTIPLIER,
    RetryPolicy,
};
