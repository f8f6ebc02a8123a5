//! Impls - Store の実装
//!
//! # 含まれる実装
//! - **MemoryStore**: テスト用・単一プロセス用（プロセス終了で消える）
//! - **SqliteStore**: 本番用の durable store（`sqlite` feature）

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use self::memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use self::sqlite::{SqliteConfig, SqliteStore};
