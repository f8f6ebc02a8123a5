//! Clock port - 時刻の抽象化
//!
//! The retry schedule and the lifetime budget both depend on "now", so the
//! engine never calls `Utc::now()` directly.

use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};

/// Clock は現在時刻を提供
///
/// # テスト容易性
/// - trait により時刻を差し替え可能
/// - テストでは FixedClock を使用
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 本番用: システム時刻
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// テスト用: 明示的に進める時計
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_only_moves_when_told() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(TimeDelta::milliseconds(250));
        assert_eq!(clock.now(), start + TimeDelta::milliseconds(250));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
