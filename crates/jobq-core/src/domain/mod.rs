//! Domain model (ids, job record, state, retry decision).

pub mod decision;
pub mod ids;
pub mod job;
pub mod state;

pub use decision::{DeadReason, Decision};
pub use ids::JobId;
pub use job::Job;
pub use state::JobState;
