//! Job identifiers.
//!
//! ULID (Universally Unique Lexicographically Sortable Identifier) を使用します。
//!
//! ## ULID の特性
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序でソートできる
//! - **分散生成可能**: 調整なしで複数ノードで生成できる
//! - **文字列表現もソート可能**: Crockford base32 の 26 文字は辞書順 = 生成順
//!
//! The canonical 26-char string is used as the store key, so an ordered key
//! scan visits jobs in (approximately) creation order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

const PREFIX: &str = "job-";

/// Identifier of a job record.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Ulid);

impl JobId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Store key: the bare ULID string.
    pub fn key(&self) -> String {
        self.0.to_string()
    }

    /// Parse a store key back into an id.
    pub fn from_key(key: &str) -> Result<Self, ulid::DecodeError> {
        Ulid::from_string(key).map(Self)
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

/// Accepts both `job-<ULID>` and the bare ULID.
impl FromStr for JobId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s.strip_prefix(PREFIX).unwrap_or(s))
    }
}
