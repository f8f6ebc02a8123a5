//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use ulid::{Generator, MonotonicError};

use crate::domain::JobId;
use crate::ports::Clock;

/// Error from an id generator.
#[derive(Debug, thiserror::Error)]
pub enum IdGenError {
    /// 同一ミリ秒内で random 部分が溢れた
    #[error("ulid generation failed")]
    Monotonic(#[from] MonotonicError),
}

/// IdGenerator は分散システムで使える ID を生成
///
/// # 要件
/// - 生成順序でソート可能
/// - ストアの生存期間中に重複しない
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Result<JobId, IdGenError>;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// 同一ミリ秒内では random 部分をインクリメントするので、
/// 1 つの generator から出た ID は常に単調増加です。
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
    inner: Mutex<Generator>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(Generator::new()),
        }
    }
}

impl IdGenerator for UlidGenerator {
    fn next_id(&self) -> Result<JobId, IdGenError> {
        let at: SystemTime = self.clock.now().into();
        let mut generator = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        generator
            .generate_from_datetime(at)
            .map(JobId::from_ulid)
            .map_err(IdGenError::from)
    }
}

impl std::fmt::Debug for UlidGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UlidGenerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    fn id_timestamp_ms(id: &JobId) -> u64 {
        id.as_ulid().timestamp_ms()
    }

    #[test]
    fn overflow_keeps_the_ulid_error_as_source() {
        let err = QueueError::from(IdGenError::from(MonotonicError::Overflow));

        let source = std::error::Error::source(&err).expect("id error");
        let inner = source.source().expect("ulid error");
        assert!(inner.downcast_ref::<MonotonicError>().is_some());
    }

    #[test]
    fn generates_unique_ids() {
        let id_gen = UlidGenerator::new(Arc::new(SystemClock));

        let id1 = id_gen.next_id().unwrap();
        let id2 = id_gen.next_id().unwrap();
        let id3 = id_gen.next_id().unwrap();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn same_millisecond_ids_are_still_ordered() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(Arc::new(FixedClock::new(fixed_time)));

        let ids: Vec<JobId> = (0..100).map(|_| id_gen.next_id().unwrap()).collect();

        // FixedClock なので timestamp 部分は全て同じ
        for id in &ids {
            assert_eq!(id_timestamp_ms(id), fixed_time.timestamp_millis() as u64);
        }
        // それでも生成順 = ソート順
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].key() < pair[1].key());
        }
    }
}
