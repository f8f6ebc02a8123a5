//! QueueBuilder - Queue の構築とワイヤリング
//!
//! 起動時に config を検証する（Fail-fast 設計）。不正な設定は `build()` が
//! `QueueError::InvalidConfig` で拒否し、poll loop が動き出してから壊れることはない。

use std::marker::PhantomData;
use std::sync::Arc;

use super::config::QueueConfig;
use super::engine::{Payload, Queue};
use super::retry::RetryPolicy;
use crate::error::QueueError;
use crate::ports::{Clock, IdGenerator, Store, SystemClock, UlidGenerator};

/// QueueBuilder は Queue を構築
///
/// # 使用例
/// ```ignore
/// let queue: Queue<Email, _> = QueueBuilder::new(Arc::new(SqliteStore::open("jobs.db")?))
///     .retry_policy(RetryPolicy::exponential(Duration::from_millis(200), 2.0))
///     .build()?;
/// ```
pub struct QueueBuilder<P, S> {
    store: Arc<S>,
    config: QueueConfig,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    _payload: PhantomData<fn() -> P>,
}

impl<P: Payload, S: Store> QueueBuilder<P, S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            config: QueueConfig::default(),
            clock: None,
            ids: None,
            _payload: PhantomData,
        }
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// 時刻源を差し替える（テストでは FixedClock）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Queue を構築
    ///
    /// # 検証
    /// - batch_size / poll_interval が 0 でないこと
    /// - retry policy が妥当であること（multiplier >= 1.0 など）
    ///
    /// id generator を指定しなければ、clock を共有する ULID generator を使う。
    pub fn build(self) -> Result<Queue<P, S>, QueueError> {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(Arc::clone(&clock))) as Arc<dyn IdGenerator>,
        };
        Queue::from_parts(self.store, self.config, clock, ids)
    }
}
