//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（durable store, 時計, ID 生成）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod id_generator;
pub mod store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenError, IdGenerator, UlidGenerator};
pub use self::store::{Store, StoreError, StoreTx, for_each_entry};
