//! Store port - the durable source of truth for job records.
//!
//! The queue only needs an ordered key-value store with transactions:
//! - keys are job ids (ULID strings, so key order is creation order)
//! - values are encoded job records
//!
//! # 設計原則
//! - claim（読み取り + InProgress への書き込み）は同一トランザクション内
//! - トランザクションは commit か rollback のどちらかで必ず終わる（panic 時も）
//! - I/O エラーは握りつぶさず呼び出し元へ返す

/// Store error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),
}

/// Operations available inside a transaction.
///
/// Object safe so the engine can write one claim routine for every backend.
pub trait StoreTx {
    fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Upsert.
    fn put(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Returns whether the key existed.
    fn delete(&mut self, key: &str) -> Result<bool, StoreError>;

    /// Up to `limit` entries in ascending key order, strictly after `after`.
    ///
    /// Call repeatedly with the last returned key to walk the whole keyspace.
    fn scan(
        &mut self,
        after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, Vec<u8>)>, StoreError>;
}

/// A transactional, ordered key-value store.
///
/// Implementations must guarantee that:
/// - everything `f` does commits together iff `f` returns `Ok`,
/// - two transactions never interleave (a claim is atomic w.r.t. other pollers,
///   including pollers in other processes for durable stores),
/// - a panic inside `f` rolls back and leaves the store usable.
pub trait Store: Send + Sync + 'static {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<R, E>,
        E: From<StoreError>;

    /// Consistent snapshot for a closure that does not write.
    ///
    /// Backends with cheaper read transactions override this; the default is a
    /// full [`Store::transaction`].
    fn read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<R, E>,
        E: From<StoreError>,
    {
        self.transaction(f)
    }
}

/// Walk every entry in key order, `page` entries per round trip.
pub fn for_each_entry<E, F>(tx: &mut dyn StoreTx, page: usize, mut visit: F) -> Result<(), E>
where
    F: FnMut(&str, &[u8]) -> Result<(), E>,
    E: From<StoreError>,
{
    let page = page.max(1);
    let mut cursor: Option<String> = None;
    loop {
        let entries = tx.scan(cursor.as_deref(), page)?;
        let exhausted = entries.len() < page;
        for (key, value) in &entries {
            visit(key, value)?;
        }
        match entries.into_iter().last() {
            Some((key, _)) if !exhausted => cursor = Some(key),
            _ => return Ok(()),
        }
    }
}
