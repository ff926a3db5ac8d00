use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use crate::category::Category;
use crate::error::StoreError;
use crate::holder::Holder;
use crate::payload::Payload;
use crate::persisted::{decode_payload, encode_payload};

type RecordId = (String, String);
type AfterPersist = Box<dyn FnOnce() + Send + 'static>;

/// Per-record bookkeeping kept while a save is pending or in flight.
struct SaveEntry {
    reschedule: bool,
    need_remove: bool,
    cancel_save: bool,
    callbacks: Vec<AfterPersist>,
    locked_in_first_reschedule: bool,
    followup: Option<Followup>,
}

struct Followup {
    callbacks: Vec<AfterPersist>,
}

impl SaveEntry {
    fn new() -> Self {
        Self {
            reschedule: false,
            need_remove: false,
            cancel_save: false,
            callbacks: Vec::new(),
            locked_in_first_reschedule: true,
            followup: None,
        }
    }
}

/// Batches rapid in-memory mutations to a record into at-most-one in-flight
/// primary+secondary write, coordinated by a cross-process lease.
///
/// `in_work` tracks entries whose save is pending or mid-flight before the
/// primary write completes; `in_long_work` tracks entries still holding the
/// lease (primary done, secondary pending or awaiting a followup). Both are
/// process-wide, keyed by `(index, key)` rather than by Holder identity
/// directly, since the lease itself is keyed that way.
pub struct Persister {
    driver: Arc<dyn crate::driver::Driver>,
    in_work: StdMutex<HashMap<RecordId, Arc<AsyncMutex<SaveEntry>>>>,
    in_long_work: StdMutex<HashMap<RecordId, Arc<AsyncMutex<SaveEntry>>>>,
    coalesce_delay: Duration,
    reschedule_delay: Duration,
    lease_ttl_ms: u64,
}

impl Persister {
    pub fn new(driver: Arc<dyn crate::driver::Driver>) -> Arc<Self> {
        Arc::new(Self {
            driver,
            in_work: StdMutex::new(HashMap::new()),
            in_long_work: StdMutex::new(HashMap::new()),
            coalesce_delay: Duration::from_secs(3),
            reschedule_delay: Duration::from_secs(2),
            lease_ttl_ms: 100_000,
        })
    }

    fn id_of(holder: &Holder) -> RecordId {
        (holder.index().to_string(), holder.key().to_string())
    }

    /// Bounded retry loop for acquiring the cross-process lease.
    pub(crate) async fn acquire_lease(&self, holder: &Holder) -> crate::error::StoreResult<()> {
        loop {
            match self
                .driver
                .try_lock(holder.index(), holder.key(), self.lease_ttl_ms)
                .await?
            {
                crate::driver::LockOutcome::Acquired => return Ok(()),
                crate::driver::LockOutcome::HeldElsewhere { wait_hint_ms } => {
                    let wait = wait_hint_ms.clamp(5, 2_000);
                    log::debug!(
                        "lease for {}/{} held elsewhere, retrying in {wait}ms",
                        holder.index(),
                        holder.key()
                    );
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                }
            }
        }
    }

    pub(crate) async fn load_or_create(
        &self,
        holder: &Holder,
        state: &mut crate::holder::HolderState,
    ) -> crate::error::StoreResult<Payload> {
        if let Some(payload) = &state.payload {
            return Ok(payload.clone());
        }
        let bytes = self.driver.get(holder.index(), holder.key()).await?;
        let payload = match bytes {
            Some(b) => decode_payload(&b)?,
            None => Payload::empty(),
        };
        state.payload = Some(payload.clone());
        Ok(payload)
    }

    /// Register a deferred save for `holder`, coalescing with any save
    /// already pending or in flight. Returns the in-memory Payload;
    /// mutations the caller makes to it after this call are picked up by
    /// whichever save task ultimately runs.
    pub async fn schedule(
        self: &Arc<Self>,
        category: &Arc<Category>,
        holder: &Arc<Holder>,
        callback: Option<AfterPersist>,
    ) -> crate::error::StoreResult<Payload> {
        let id = Self::id_of(holder);
        let mut state = holder.lock().await;

        let in_work_entry = self.in_work.lock().unwrap_or_else(|e| e.into_inner()).get(&id).cloned();
        if let Some(entry) = in_work_entry {
            let mut entry = entry.lock().await;
            entry.reschedule = true;
            if let Some(cb) = callback {
                entry.callbacks.push(cb);
            }
            return Ok(state.payload.clone().unwrap_or_else(Payload::empty));
        }

        let in_long_work_entry = self.in_long_work.lock().unwrap_or_else(|e| e.into_inner()).get(&id).cloned();
        if let Some(entry) = in_long_work_entry {
            let mut entry = entry.lock().await;
            let followup = entry.followup.get_or_insert_with(|| Followup { callbacks: Vec::new() });
            if let Some(cb) = callback {
                followup.callbacks.push(cb);
            }
            return Ok(state.payload.clone().unwrap_or_else(Payload::empty));
        }

        self.acquire_lease(holder).await?;

        let payload = self.load_or_create(holder, &mut state).await?;
        if state.removed {
            let _ = self.driver.unlock(holder.index(), holder.key()).await;
            return Ok(payload);
        }

        let mut entry = SaveEntry::new();
        if let Some(cb) = callback {
            entry.callbacks.push(cb);
        }
        let entry = Arc::new(AsyncMutex::new(entry));

        self.in_work.lock().unwrap_or_else(|e| e.into_inner()).insert(id.clone(), entry.clone());
        self.in_long_work.lock().unwrap_or_else(|e| e.into_inner()).insert(id.clone(), entry.clone());

        drop(state);

        let this = self.clone();
        let category = category.clone();
        let holder = holder.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.coalesce_delay).await;
            this.run_save_task(category, holder, entry).await;
        });

        Ok(payload)
    }

    /// `cancel`: abort the secondary write of an in-flight save and
    /// force the lease to be released without further driver writes.
    pub async fn cancel(&self, holder: &Holder) {
        let id = Self::id_of(holder);
        let entry = self
            .in_long_work
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned();
        if let Some(entry) = entry {
            entry.lock().await.cancel_save = true;
        }
    }

    /// Mark the `inWork` entry (if any) for `needRemove`, so the running or
    /// about-to-run save task becomes a no-op. Returns whether an entry was
    /// found; record removal proceeds either way.
    pub async fn mark_need_remove(&self, holder: &Holder) -> bool {
        let id = Self::id_of(holder);
        let entry = self.in_work.lock().unwrap_or_else(|e| e.into_inner()).get(&id).cloned();
        match entry {
            Some(entry) => {
                entry.lock().await.need_remove = true;
                true
            }
            None => false,
        }
    }

    /// Drop bookkeeping for a record outright, used after a synchronous
    /// remove has driven the driver call itself.
    pub fn clear(&self, holder: &Holder) {
        let id = Self::id_of(holder);
        self.in_work.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        self.in_long_work.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
    }

    /// Call the driver's `remove`, then release the lease and wake monitor
    /// waiters regardless of the outcome.
    pub async fn drive_remove(&self, holder: &Holder) -> crate::error::StoreResult<()> {
        let result = self.driver.remove(holder.index(), holder.key()).await;
        if let Err(unlock_err) = self.driver.unlock(holder.index(), holder.key()).await {
            log::warn!("failed to release lease after remove: {unlock_err}");
        }
        holder.notify_waiters();
        result
    }

    /// Spin-wait until no record still holds a lease, then return. There is
    /// no separate executor to stop since save tasks run on the ambient
    /// Tokio runtime; once `in_long_work` is empty every lease has been
    /// released.
    pub async fn stop(&self) {
        loop {
            let empty = self.in_long_work.lock().unwrap_or_else(|e| e.into_inner()).is_empty();
            if empty {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn run_save_task(self: Arc<Self>, category: Arc<Category>, holder: Arc<Holder>, entry: Arc<AsyncMutex<SaveEntry>>) {
        let id = Self::id_of(&holder);

        {
            let mut entry_guard = entry.lock().await;
            if entry_guard.need_remove {
                return;
            }
            if entry_guard.reschedule {
                entry_guard.reschedule = false;
                drop(entry_guard);
                self.reschedule(category, holder, entry, self.reschedule_delay);
                return;
            }
            if !entry_guard.locked_in_first_reschedule {
                drop(entry_guard);
                if let Err(err) = self.acquire_lease(&holder).await {
                    self.fail_and_cleanup(&holder, err).await;
                    return;
                }
                entry.lock().await.locked_in_first_reschedule = true;
            }
        }

        let snapshot = {
            let state = holder.lock().await;
            state.payload.clone().unwrap_or_else(Payload::empty)
        };

        let bytes = match encode_payload(&snapshot) {
            Ok(b) => b,
            Err(err) => {
                self.fail_and_cleanup(&holder, err).await;
                return;
            }
        };

        if let Err(err) = self.driver.put_primary(holder.index(), holder.key(), bytes).await {
            self.fail_and_cleanup(&holder, err).await;
            return;
        }

        // onPrimaryDone
        {
            let mut entry_guard = entry.lock().await;
            if entry_guard.reschedule {
                entry_guard.reschedule = false;
                drop(entry_guard);
                self.reschedule(category, holder, entry, self.reschedule_delay);
                return;
            }
            self.in_work.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        }

        let (need_remove, cancelled) = {
            let entry_guard = entry.lock().await;
            (entry_guard.need_remove, entry_guard.cancel_save)
        };

        // onProceedSecondary
        if !need_remove && !cancelled {
            let sort_bytes = category.sort_codec().encode(snapshot.sort(), category.collator());
            let result = self
                .driver
                .put_secondary(
                    category.internal_index(),
                    holder.key(),
                    snapshot.tree(),
                    category.locales(),
                    snapshot.secondary_key(),
                    &sort_bytes,
                    snapshot.tags_persisted(),
                )
                .await;
            if let Err(err) = result {
                self.fail_and_cleanup(&holder, err).await;
                return;
            }
        }

        // onSecondaryDone
        let mut entry_guard = entry.lock().await;
        let cancelled = entry_guard.cancel_save;
        if !cancelled {
            if let Some(followup) = entry_guard.followup.take() {
                entry_guard.reschedule = false;
                entry_guard.callbacks = followup.callbacks;
                drop(entry_guard);
                self.in_work.lock().unwrap_or_else(|e| e.into_inner()).insert(id, entry.clone());
                self.reschedule(category, holder.clone(), entry, self.reschedule_delay);
                holder.notify_waiters();
                return;
            }
        }

        let callbacks = std::mem::take(&mut entry_guard.callbacks);
        drop(entry_guard);
        if let Err(err) = self.driver.unlock(holder.index(), holder.key()).await {
            log::warn!("failed to release lease for {}/{}: {err}", holder.index(), holder.key());
        }
        self.in_long_work.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        for cb in callbacks {
            cb();
        }
        holder.notify_waiters();
    }

    fn reschedule(self: &Arc<Self>, category: Arc<Category>, holder: Arc<Holder>, entry: Arc<AsyncMutex<SaveEntry>>, delay: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.run_save_task(category, holder, entry).await;
        });
    }

    async fn fail_and_cleanup(&self, holder: &Holder, err: StoreError) {
        log::error!("persist task for {}/{} failed: {err}", holder.index(), holder.key());
        let id = Self::id_of(holder);
        if let Err(unlock_err) = self.driver.unlock(holder.index(), holder.key()).await {
            log::warn!("failed to release lease after a failed save: {unlock_err}");
        }
        self.in_work.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        self.in_long_work.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        holder.notify_waiters();
    }
}
