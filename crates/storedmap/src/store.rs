use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, OnceLock, Weak};

use tokio::sync::Mutex as AsyncMutex;

use crate::category::Category;
use crate::config::StoreConfig;
use crate::driver::{Driver, ListFilter};
use crate::error::StoreResult;
use crate::name_translator;
use crate::persister::Persister;
use crate::record::Record;

/// Index names the name translator's own bookkeeping owns (the directory
/// and locales indices); never a real category's internal index, so they're
/// filtered out of [`Store::category_names`].
fn is_bookkeeping_index(app_code_prefix: &str, index: &str) -> bool {
    index == format!("{app_code_prefix}__indices") || index == format!("{app_code_prefix}__locales")
}

type Registry = StdMutex<HashMap<StoreConfig, Weak<Store>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| StdMutex::new(HashMap::new()))
}

/// Process-wide handle encapsulating a driver connection, application code,
/// and the persister. Identified by its [`StoreConfig`]: two calls to
/// [`Store::open`] with equal configs return the same shared instance for
/// as long as any other reference to it is still alive.
pub struct Store {
    config: StoreConfig,
    driver: Arc<dyn Driver>,
    persister: Arc<Persister>,
    categories: AsyncMutex<HashMap<String, Arc<Category>>>,
}

impl Store {
    /// Open (or reuse) the store for `config`, backed by `driver`.
    ///
    /// If a live `Store` already exists for an equal `config`, `driver` is
    /// ignored and the existing instance is returned — opening a second,
    /// differently-configured connection under the same config is a misuse
    /// this crate does not guard against.
    pub async fn open(config: StoreConfig, driver: Arc<dyn Driver>) -> Arc<Self> {
        let mut reg = registry().lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = reg.get(&config).and_then(Weak::upgrade) {
            return existing;
        }
        let store = Arc::new(Self {
            config: config.clone(),
            persister: Persister::new(driver.clone()),
            driver,
            categories: AsyncMutex::new(HashMap::new()),
        });
        reg.insert(config, Arc::downgrade(&store));
        store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Resolve (registering on first use) the category named `name`, with
    /// driver-default locales.
    pub async fn category(&self, name: &str) -> StoreResult<Arc<Category>> {
        self.category_with_locales(name, Vec::new()).await
    }

    /// Resolve `name`, pinning its locales on first registration. Later
    /// calls for an already-registered category ignore `locales` and return
    /// the stored category as-is ("Category" name→category is 1:1 and
    /// stable for the store's lifetime).
    pub async fn category_with_locales(&self, name: &str, locales: Vec<String>) -> StoreResult<Arc<Category>> {
        let mut categories = self.categories.lock().await;
        if let Some(category) = categories.get(name) {
            return Ok(category.clone());
        }
        let category = Arc::new(
            Category::open(self.driver.as_ref(), self.config.application_code(), name, locales).await?,
        );
        categories.insert(name.to_string(), category.clone());
        Ok(category)
    }

    /// Look up (materialising the Holder if needed) the record identified
    /// by `key` within `category`.
    pub fn record(&self, category: &Arc<Category>, key: &str) -> Record {
        let holder = category.identity_cache().lookup(key);
        Record::new(category.clone(), holder, self.persister.clone())
    }

    /// Enumerate keys in `category` matching `filter`, unioned with keys
    /// that only exist in the identity cache so far (scenario: a record
    /// just mutated but not yet persisted still shows up in enumeration).
    pub async fn list_keys(&self, category: &Category, filter: &ListFilter) -> StoreResult<Vec<String>> {
        let mut keys = self.driver.list(category.internal_index(), filter).await?;
        let already: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let mut extra: Vec<String> = category
            .identity_cache()
            .keys()
            .into_iter()
            .filter(|k| !already.contains(k.as_str()))
            .collect();
        keys.append(&mut extra);
        Ok(keys)
    }

    /// Count keys in `category` matching `filter`. Unlike [`Store::list_keys`]
    /// this does not union in cached-but-unpersisted keys: the driver's
    /// count is authoritative for the back-end's own state.
    pub async fn count(&self, category: &Category, filter: &ListFilter) -> StoreResult<u64> {
        self.driver.count(category.internal_index(), filter).await
    }

    /// Recover the set of registered category names by enumerating the
    /// driver's known indices and inverting each back through the name
    /// translator, skipping the translator's own directory/locales
    /// bookkeeping indices.
    pub async fn category_names(&self) -> StoreResult<Vec<String>> {
        let prefix = name_translator::sanitise(self.config.application_code());
        let mut names = Vec::new();
        for index in self.driver.list_indices().await? {
            if is_bookkeeping_index(&prefix, &index) {
                continue;
            }
            let name = name_translator::inverse(self.driver.as_ref(), self.config.application_code(), &index).await?;
            names.push(name);
        }
        Ok(names)
    }

    /// Drain the persister (every in-flight lease released) and close the
    /// driver connection.
    pub async fn close(&self) -> StoreResult<()> {
        self.persister.stop().await;
        self.driver.close().await
    }
}
