use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

use storedmap::{Driver, DriverLimits, ListFilter, LockOutcome, MapValue, StoreResult};

/// Call-count snapshot for asserting on a test's expected write/lock shape
/// (coalescing, followups, lease contention) without inspecting internal
/// driver state directly.
#[derive(Debug, Clone, Default)]
pub struct FakeDriverStats {
    pub primary_puts: usize,
    pub secondary_puts: usize,
    pub removes: usize,
    pub lock_attempts: usize,
    pub lock_contentions: usize,
    pub close_calls: usize,
}

#[derive(Default)]
struct IndexState {
    primary: HashMap<String, Vec<u8>>,
    secondary: HashMap<String, SecondaryEntry>,
}

struct SecondaryEntry {
    #[allow(dead_code)]
    tree: MapValue,
    #[allow(dead_code)]
    secondary_key: Option<String>,
    sort_bytes: Vec<u8>,
    tags: Vec<String>,
}

struct Lease {
    expires_at: Instant,
}

#[derive(Default)]
struct FakeDriverState {
    indices: RwLock<HashMap<String, IndexState>>,
    leases: Mutex<HashMap<(String, String), Lease>>,
    primary_puts: AtomicUsize,
    secondary_puts: AtomicUsize,
    removes: AtomicUsize,
    lock_attempts: AtomicUsize,
    lock_contentions: AtomicUsize,
    close_calls: AtomicUsize,
    /// One-shot gate for the next `put_secondary` call: armed by
    /// `FakeDriver::hold_next_secondary_write`, consumed by the first
    /// `put_secondary` to observe it, released by
    /// `FakeDriver::release_secondary_write`. Lets a test suspend a save
    /// task mid-flight (lease held, primary write already visible) to
    /// exercise what arrives while it is stuck there.
    secondary_gate_armed: AtomicBool,
    secondary_gate_release: Notify,
}

/// In-memory [`Driver`] double. Holds one primary blob map and one
/// secondary-representation map per index, plus a lease table, all guarded
/// by ordinary sync locks — there is no real I/O here to make async.
#[derive(Clone)]
pub struct FakeDriver {
    limits: DriverLimits,
    state: Arc<FakeDriverState>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            limits: DriverLimits {
                max_index_name_len: 24,
                max_key_len: 256,
                max_tag_len: 64,
                max_sorter_len: 8,
            },
            state: Arc::new(FakeDriverState::default()),
        }
    }

    pub fn with_limits(mut self, limits: DriverLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn stats(&self) -> FakeDriverStats {
        FakeDriverStats {
            primary_puts: self.state.primary_puts.load(Ordering::Relaxed),
            secondary_puts: self.state.secondary_puts.load(Ordering::Relaxed),
            removes: self.state.removes.load(Ordering::Relaxed),
            lock_attempts: self.state.lock_attempts.load(Ordering::Relaxed),
            lock_contentions: self.state.lock_contentions.load(Ordering::Relaxed),
            close_calls: self.state.close_calls.load(Ordering::Relaxed),
        }
    }

    /// Whether a lease is currently held (not yet expired) for `(index, key)`.
    pub fn is_locked(&self, index: &str, key: &str) -> bool {
        let leases = mutex_lock(&self.state.leases);
        leases
            .get(&(index.to_string(), key.to_string()))
            .is_some_and(|lease| lease.expires_at > Instant::now())
    }

    pub fn secondary_sort_bytes(&self, index: &str, key: &str) -> Option<Vec<u8>> {
        let indices = rwlock_read(&self.state.indices);
        indices.get(index)?.secondary.get(key).map(|e| e.sort_bytes.clone())
    }

    pub fn secondary_tags(&self, index: &str, key: &str) -> Option<Vec<String>> {
        let indices = rwlock_read(&self.state.indices);
        indices.get(index)?.secondary.get(key).map(|e| e.tags.clone())
    }

    pub fn as_driver_arc(self) -> Arc<dyn Driver> {
        Arc::new(self)
    }

    /// Arms a one-shot gate on the next `put_secondary` call: that call
    /// will block, still holding whatever lease the caller's save task
    /// holds, until `release_secondary_write` is called.
    pub fn hold_next_secondary_write(&self) {
        self.state.secondary_gate_armed.store(true, Ordering::SeqCst);
    }

    /// Releases a `put_secondary` call blocked by `hold_next_secondary_write`.
    pub fn release_secondary_write(&self) {
        self.state.secondary_gate_release.notify_one();
    }
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn limits(&self) -> DriverLimits {
        self.limits
    }

    async fn get(&self, index: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let indices = rwlock_read(&self.state.indices);
        Ok(indices.get(index).and_then(|i| i.primary.get(key).cloned()))
    }

    async fn put_primary(&self, index: &str, key: &str, bytes: Vec<u8>) -> StoreResult<()> {
        self.state.primary_puts.fetch_add(1, Ordering::Relaxed);
        let mut indices = rwlock_write(&self.state.indices);
        indices.entry(index.to_string()).or_default().primary.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, index: &str, key: &str) -> StoreResult<()> {
        self.state.removes.fetch_add(1, Ordering::Relaxed);
        let mut indices = rwlock_write(&self.state.indices);
        if let Some(state) = indices.get_mut(index) {
            state.primary.remove(key);
            state.secondary.remove(key);
        }
        Ok(())
    }

    async fn put_secondary(
        &self,
        index: &str,
        key: &str,
        tree: &MapValue,
        _locales: &[String],
        secondary_key: Option<&str>,
        sort_bytes: &[u8],
        tags: &[String],
    ) -> StoreResult<()> {
        if self.state.secondary_gate_armed.swap(false, Ordering::SeqCst) {
            self.state.secondary_gate_release.notified().await;
        }
        self.state.secondary_puts.fetch_add(1, Ordering::Relaxed);
        let mut indices = rwlock_write(&self.state.indices);
        indices.entry(index.to_string()).or_default().secondary.insert(
            key.to_string(),
            SecondaryEntry {
                tree: tree.clone(),
                secondary_key: secondary_key.map(str::to_string),
                sort_bytes: sort_bytes.to_vec(),
                tags: tags.to_vec(),
            },
        );
        Ok(())
    }

    async fn list(&self, index: &str, filter: &ListFilter) -> StoreResult<Vec<String>> {
        let indices = rwlock_read(&self.state.indices);
        let Some(state) = indices.get(index) else {
            return Ok(Vec::new());
        };
        let mut keys: Vec<String> = state.primary.keys().cloned().collect();
        keys.sort();

        if !filter.any_tag.is_empty() {
            keys.retain(|k| {
                state
                    .secondary
                    .get(k)
                    .map(|e| e.tags.iter().any(|t| filter.any_tag.contains(t)))
                    .unwrap_or(false)
            });
        }

        if let Some(range) = &filter.sort_range {
            keys.retain(|k| {
                let Some(bytes) = state.secondary.get(k).map(|e| e.sort_bytes.clone()) else {
                    return false;
                };
                let above_lower = range.lower.as_ref().is_none_or(|lo| &bytes >= lo);
                let below_upper = range.upper.as_ref().is_none_or(|hi| &bytes <= hi);
                above_lower && below_upper
            });
            if !range.ascending {
                keys.reverse();
            }
        }

        let from = filter.from.unwrap_or(0);
        let keys: Vec<String> = keys.into_iter().skip(from).collect();
        Ok(match filter.size {
            Some(size) => keys.into_iter().take(size).collect(),
            None => keys,
        })
    }

    async fn count(&self, index: &str, filter: &ListFilter) -> StoreResult<u64> {
        Ok(self.list(index, filter).await?.len() as u64)
    }

    async fn list_indices(&self) -> StoreResult<Vec<String>> {
        let indices = rwlock_read(&self.state.indices);
        Ok(indices.keys().cloned().collect())
    }

    async fn try_lock(&self, index: &str, key: &str, ttl_ms: u64) -> StoreResult<LockOutcome> {
        self.state.lock_attempts.fetch_add(1, Ordering::Relaxed);
        let mut leases = mutex_lock(&self.state.leases);
        let id = (index.to_string(), key.to_string());
        let now = Instant::now();
        if let Some(existing) = leases.get(&id) {
            if existing.expires_at > now {
                self.state.lock_contentions.fetch_add(1, Ordering::Relaxed);
                return Ok(LockOutcome::HeldElsewhere { wait_hint_ms: 20 });
            }
        }
        leases.insert(id, Lease { expires_at: now + Duration::from_millis(ttl_ms) });
        Ok(LockOutcome::Acquired)
    }

    async fn unlock(&self, index: &str, key: &str) -> StoreResult<()> {
        let mut leases = mutex_lock(&self.state.leases);
        leases.remove(&(index.to_string(), key.to_string()));
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.state.close_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn rwlock_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

fn rwlock_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

fn mutex_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips_the_primary_blob() {
        let driver = FakeDriver::new();
        driver.put_primary("idx", "k1", b"hello".to_vec()).await.unwrap();
        assert_eq!(driver.get("idx", "k1").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn a_second_lock_attempt_is_rejected_while_held() {
        let driver = FakeDriver::new();
        assert_eq!(driver.try_lock("idx", "k1", 1_000).await.unwrap(), LockOutcome::Acquired);
        assert!(matches!(
            driver.try_lock("idx", "k1", 1_000).await.unwrap(),
            LockOutcome::HeldElsewhere { .. }
        ));
        assert_eq!(driver.stats().lock_contentions, 1);
        driver.unlock("idx", "k1").await.unwrap();
        assert_eq!(driver.try_lock("idx", "k1", 1_000).await.unwrap(), LockOutcome::Acquired);
    }

    #[tokio::test]
    async fn remove_clears_primary_and_secondary_entries() {
        let driver = FakeDriver::new();
        driver.put_primary("idx", "k1", b"v".to_vec()).await.unwrap();
        driver
            .put_secondary("idx", "k1", &MapValue::Null, &[], None, &[], &[])
            .await
            .unwrap();
        driver.remove("idx", "k1").await.unwrap();
        assert_eq!(driver.get("idx", "k1").await.unwrap(), None);
        assert_eq!(driver.stats().removes, 1);
    }

    #[tokio::test]
    async fn list_filters_by_any_tag() {
        let driver = FakeDriver::new();
        driver.put_primary("idx", "a", b"1".to_vec()).await.unwrap();
        driver.put_primary("idx", "b", b"2".to_vec()).await.unwrap();
        driver
            .put_secondary("idx", "a", &MapValue::Null, &[], None, &[], &["x".to_string()])
            .await
            .unwrap();
        driver
            .put_secondary("idx", "b", &MapValue::Null, &[], None, &[], &["y".to_string()])
            .await
            .unwrap();

        let filter = ListFilter { any_tag: vec!["x".to_string()], ..Default::default() };
        let keys = driver.list("idx", &filter).await.unwrap();
        assert_eq!(keys, vec!["a".to_string()]);
    }
}
