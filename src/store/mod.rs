pub mod sqlite;

pub use sqlite::SqliteStore;

use async_trait::async_trait;
use color_eyre::eyre::Result;

/// Persistent record of items that were already delivered.
///
/// Every store is scoped to one namespace ("bucket"). Each call is atomic on
/// its own, but `exists` followed by `put` is not: callers sharing a store
/// between producers should use [`DedupStore::insert_if_absent`].
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// `true` when `key` holds a non-empty value. A bucket that was never
    /// written reads as empty.
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Record `key`, creating the bucket on first use.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Atomic check-and-set: writes and returns `true` only when `key` was
    /// not yet recorded.
    async fn insert_if_absent(&self, key: &str, value: &str) -> Result<bool>;
}
