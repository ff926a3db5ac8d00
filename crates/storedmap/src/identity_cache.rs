use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::holder::Holder;

/// Per-category `key → weak(Holder)` map.
///
/// Guarantees at most one live [`Holder`] per key within a category, so the
/// Holder's monitor is the single serialisation point for all operations
/// touching that record, in-process.
pub struct IdentityCache {
    index: String,
    entries: Mutex<HashMap<String, Weak<Holder>>>,
}

impl IdentityCache {
    pub fn new(index: impl Into<String>) -> Self {
        Self { index: index.into(), entries: Mutex::new(HashMap::new()) }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Dereference the weak slot for `key`; allocate and install a new
    /// Holder if the slot is empty or its Holder has already been dropped.
    pub fn lookup(&self, key: &str) -> Arc<Holder> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(weak) = entries.get(key) {
            if let Some(holder) = weak.upgrade() {
                return holder;
            }
        }
        let holder = Arc::new(Holder::new(self.index.clone(), key.to_string()));
        entries.insert(key.to_string(), Arc::downgrade(&holder));
        holder
    }

    /// Remove the cached entry for `key` (called when a record is removed).
    pub fn evict(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    /// Snapshot of keys currently cached with a live Holder, used by
    /// enumeration to surface not-yet-persisted records.
    pub fn keys(&self) -> Vec<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, weak| weak.strong_count() > 0);
        entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_the_same_holder_while_alive() {
        let cache = IdentityCache::new("cat");
        let a = cache.lookup("k1");
        let b = cache.lookup("k1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn lookup_reallocates_after_the_holder_is_dropped() {
        let cache = IdentityCache::new("cat");
        let first_ptr = {
            let holder = cache.lookup("k1");
            Arc::as_ptr(&holder)
        };
        // `holder` dropped here; only the cache's weak ref remains.
        let second = cache.lookup("k1");
        assert_ne!(first_ptr, Arc::as_ptr(&second));
    }

    #[test]
    fn evict_removes_the_entry() {
        let cache = IdentityCache::new("cat");
        let holder = cache.lookup("k1");
        cache.evict("k1");
        assert!(cache.keys().is_empty());
        drop(holder);
    }

    #[test]
    fn keys_reports_live_holders_only() {
        let cache = IdentityCache::new("cat");
        let _alive = cache.lookup("alive");
        {
            let _dropped = cache.lookup("dropped");
        }
        let keys = cache.keys();
        assert_eq!(keys, vec!["alive".to_string()]);
    }
}
