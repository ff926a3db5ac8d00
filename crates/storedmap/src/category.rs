use std::sync::Arc;

use crate::driver::Driver;
use crate::error::{StoreError, StoreResult};
use crate::identity_cache::IdentityCache;
use crate::name_translator;
use crate::sort_key::{Collator, SortKeyCodec};

/// A named group of records sharing one back-end index pair.
///
/// `name → Category` is 1:1 and stable for a store's lifetime; the internal
/// index name is persistently bound to `name` via the name translator's
/// directory entry, so it survives process restarts.
pub struct Category {
    name: String,
    internal_index: String,
    locales: Vec<String>,
    collator: Collator,
    sort_codec: SortKeyCodec,
    identity_cache: IdentityCache,
}

impl Category {
    /// Resolve (and, if needed, register) the category named `name`.
    pub async fn open(
        driver: &dyn Driver,
        app_code: &str,
        name: &str,
        locales: Vec<String>,
    ) -> StoreResult<Self> {
        let internal_index = name_translator::translate(driver, app_code, name).await?;
        let locales_index = format!("{}__locales", name_translator::sanitise(app_code));

        let locales = if locales.is_empty() {
            match driver.get(&locales_index, &internal_index).await? {
                Some(bytes) => serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::serialization(format!("invalid locales entry: {e}")))?,
                None => Vec::new(),
            }
        } else {
            let bytes = serde_json::to_vec(&locales)
                .map_err(|e| StoreError::serialization(format!("cannot encode locales: {e}")))?;
            driver.put_primary(&locales_index, &internal_index, bytes).await?;
            locales
        };

        let limits = driver.limits();
        Ok(Self {
            name: name.to_string(),
            identity_cache: IdentityCache::new(internal_index.clone()),
            collator: Collator::new(locales.clone()),
            sort_codec: SortKeyCodec::new(limits.max_sorter_len),
            internal_index,
            locales,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn internal_index(&self) -> &str {
        &self.internal_index
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn collator(&self) -> &Collator {
        &self.collator
    }

    pub fn sort_codec(&self) -> &SortKeyCodec {
        &self.sort_codec
    }

    pub fn identity_cache(&self) -> &IdentityCache {
        &self.identity_cache
    }
}

impl std::fmt::Debug for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Category")
            .field("name", &self.name)
            .field("internal_index", &self.internal_index)
            .finish()
    }
}

pub type SharedCategory = Arc<Category>;
