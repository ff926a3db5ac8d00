use std::sync::Arc;

use crate::category::Category;
use crate::error::StoreResult;
use crate::holder::Holder;
use crate::payload::Payload;
use crate::persister::Persister;
use crate::sort_key::SortValue;

/// The logical unit identified by `(category, key)`; its state is a
/// [`Payload`].
///
/// This is deliberately a thin handle, not a proxy tree over the payload's
/// nested map/list structure — sub-object path wrappers are out of scope;
/// callers read and write the whole [`Payload`] through [`Record::load`]
/// and [`Record::mutate`].
pub struct Record {
    category: Arc<Category>,
    holder: Arc<Holder>,
    persister: Arc<Persister>,
}

impl Record {
    pub(crate) fn new(category: Arc<Category>, holder: Arc<Holder>, persister: Arc<Persister>) -> Self {
        Self { category, holder, persister }
    }

    pub fn key(&self) -> &str {
        self.holder.key()
    }

    /// Load-or-create the payload. Reads bypass the persister: they
    /// only touch the Holder monitor and, on a cache miss, the driver's
    /// primary get.
    pub async fn load(&self) -> StoreResult<Payload> {
        let mut state = self.holder.lock().await;
        self.persister.load_or_create(&self.holder, &mut state).await
    }

    /// Apply `mutator` to the in-memory payload and register a deferred
    /// persist. Returns the payload as it stands immediately after the
    /// mutation.
    pub async fn mutate<F>(&self, mutator: F) -> StoreResult<Payload>
    where
        F: FnOnce(&mut Payload) + Send + 'static,
    {
        let loaded = self.persister.schedule(&self.category, &self.holder, None).await?;
        let mut state = self.holder.lock().await;
        // Removed between schedule() returning and re-entering the monitor
        // here (or removed earlier and never evicted from under us): the
        // mutation is a no-op against the back-end, so don't touch the
        // in-memory payload either.
        if state.removed {
            return Ok(loaded);
        }
        match &mut state.payload {
            Some(payload) => {
                mutator(payload);
                Ok(payload.clone())
            }
            None => Ok(loaded),
        }
    }

    pub async fn set_sort(&self, sort: SortValue) -> StoreResult<()> {
        self.mutate(move |p| p.set_sort(sort)).await.map(|_| ())
    }

    pub async fn set_secondary_key(&self, key: Option<String>) -> StoreResult<()> {
        self.mutate(move |p| p.set_secondary_key(key)).await.map(|_| ())
    }

    pub async fn set_tags(&self, tags: Vec<String>) -> StoreResult<()> {
        self.mutate(move |p| p.set_tags(tags)).await.map(|_| ())
    }

    /// Run a callback after the next persist of this record completes,
    /// without otherwise mutating the payload.
    pub async fn after_next_persist<F>(&self, callback: F) -> StoreResult<Payload>
    where
        F: FnOnce() + Send + 'static,
    {
        self.persister.schedule(&self.category, &self.holder, Some(Box::new(callback))).await
    }

    /// Cancel any scheduled save, take over or acquire the lease, mark the
    /// record removed, evict it from the identity cache, and drive the
    /// driver's `remove`.
    pub async fn remove(&self) -> StoreResult<()> {
        self.persister.cancel(&self.holder).await;
        let lease_already_held = self.persister.mark_need_remove(&self.holder).await;
        if !lease_already_held {
            self.persister.acquire_lease(&self.holder).await?;
        }

        {
            let mut state = self.holder.lock().await;
            state.removed = true;
            state.payload = Some(Payload::empty());
        }

        self.category.identity_cache().evict(self.holder.key());
        self.persister.clear(&self.holder);
        self.persister.drive_remove(&self.holder).await
    }
}
