//! jobq-core
//!
//! Persistent, retryable job queue over a transactional key-value store.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（JobId, Job, JobState, Decision）
//! - **ports**: 抽象化レイヤー（Store, Clock, IdGenerator）
//! - **queue**: Queue engine, QueueBuilder, RetryPolicy, QueueConfig, JobHandler
//! - **impls**: Store 実装（MemoryStore, SqliteStore）
//! - **observability**: state 別の件数
//! - **error**: QueueError
//!
//! # 使用例
//! ```ignore
//! let store = Arc::new(SqliteStore::open("jobs.db")?);
//! let queue: Queue<Email, _> = Queue::new(store, QueueConfig::default())?;
//! queue.add(Email { to: "ops@example.com".into() }).await?;
//!
//! let cancel = CancellationToken::new();
//! queue.run(&SendEmail, cancel.clone()).await?;
//! ```

pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use domain::{DeadReason, Decision, Job, JobId, JobState};
pub use error::QueueError;
pub use impls::MemoryStore;
#[cfg(feature = "sqlite")]
pub use impls::{SqliteConfig, SqliteStore};
pub use observability::QueueCounts;
pub use ports::{Clock, FixedClock, IdGenerator, Store, StoreError, StoreTx, SystemClock};
pub use queue::{
    HandlerError, JobContext, JobHandler, LEASE_EXPIRED, Queue, QueueBuilder, QueueConfig,
    RetryPolicy,
};
