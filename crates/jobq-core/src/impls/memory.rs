//! In-memory store (tests and single-process use).
//!
//! Each transaction works on a copy of the map and swaps it in on success, so
//! an `Err` or a panic leaves the committed state untouched.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;

use crate::ports::{Store, StoreError, StoreTx};

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<R, E>,
        E: From<StoreError>,
    {
        // A panic in an earlier transaction poisons the lock but never
        // touched the committed map.
        let mut committed = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut tx = MemoryTx {
            entries: committed.clone(),
        };
        let result = f(&mut tx)?;
        *committed = tx.entries;
        Ok(result)
    }
}

struct MemoryTx {
    entries: BTreeMap<String, Vec<u8>>,
}

impl StoreTx for MemoryTx {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn scan(
        &mut self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let range = match after {
            Some(after) => self
                .entries
                .range::<str, _>((Bound::Excluded(after), Bound::Unbounded)),
            None => self.entries.range::<str, _>(..),
        };
        Ok(range
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
