use async_trait::async_trait;

use crate::error::StoreResult;
use crate::value::MapValue;

/// Result of attempting to acquire a lease via `tryLock`.
///
/// `Acquired` means the caller now owns the lease. `HeldElsewhere` carries a
/// wait hint in milliseconds the caller should back off before retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Acquired,
    HeldElsewhere { wait_hint_ms: u64 },
}

/// A single text/sort/tag filter combination for `list`/`count`.
/// Concrete query semantics are the driver's concern; the core only builds
/// and forwards this request shape.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub text_query: Option<String>,
    pub sort_range: Option<SortRange>,
    pub any_tag: Vec<String>,
    pub from: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct SortRange {
    pub lower: Option<Vec<u8>>,
    pub upper: Option<Vec<u8>>,
    pub ascending: bool,
}

/// Per-handle limits a driver reports.
#[derive(Debug, Clone, Copy)]
pub struct DriverLimits {
    pub max_index_name_len: usize,
    pub max_key_len: usize,
    pub max_tag_len: usize,
    pub max_sorter_len: usize,
}

/// The opaque capability interface the core writes against.
///
/// A driver owns one connection handle (`Self` is that handle) and exposes
/// a primary blob index plus a secondary search index per category, keyed
/// by an internal index name the core derives via [`crate::name_translator`].
///
/// Concrete drivers (JDBC/Elasticsearch/mixed equivalents) are explicitly
/// out of scope for this crate; only the trait and an in-memory test
/// double ([`storedmap_test_support`]) live here.
#[async_trait]
pub trait Driver: Send + Sync {
    fn limits(&self) -> DriverLimits;

    /// Read the primary blob for `key` in `index`. Absent key returns `None`.
    async fn get(&self, index: &str, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write the primary blob for `key` in `index`.
    async fn put_primary(&self, index: &str, key: &str, bytes: Vec<u8>) -> StoreResult<()>;

    /// Remove `key` from both the primary and secondary index.
    async fn remove(&self, index: &str, key: &str) -> StoreResult<()>;

    /// Write the secondary (searchable) representation for `key`.
    #[allow(clippy::too_many_arguments)]
    async fn put_secondary(
        &self,
        index: &str,
        key: &str,
        tree: &MapValue,
        locales: &[String],
        secondary_key: Option<&str>,
        sort_bytes: &[u8],
        tags: &[String],
    ) -> StoreResult<()>;

    /// List keys in `index` matching `filter`.
    async fn list(&self, index: &str, filter: &ListFilter) -> StoreResult<Vec<String>>;

    /// Count keys in `index` matching `filter`.
    async fn count(&self, index: &str, filter: &ListFilter) -> StoreResult<u64>;

    /// Enumerate all index names the driver currently knows about. Used by
    /// [`crate::store::Store::category_names`] to recover the set of
    /// registered category names for a store.
    async fn list_indices(&self) -> StoreResult<Vec<String>>;

    /// Attempt to acquire the advisory lease on `(key, index)` for `ttl_ms`.
    async fn try_lock(&self, index: &str, key: &str, ttl_ms: u64) -> StoreResult<LockOutcome>;

    /// Release a previously acquired lease. Idempotent.
    async fn unlock(&self, index: &str, key: &str) -> StoreResult<()>;

    /// `closeConnection`: release whatever resources this handle
    /// holds. Opening a connection (`openConnection(config)`) is a
    /// concrete-driver concern and out of scope here — a `Store` is built
    /// directly from an already-open `Arc<dyn Driver>`.
    async fn close(&self) -> StoreResult<()>;
}
