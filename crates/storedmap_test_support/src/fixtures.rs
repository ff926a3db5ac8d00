use storedmap::{Category, Store, StoreConfig};

use crate::fake_driver::FakeDriver;

/// A store backed by a fresh [`FakeDriver`] with default limits, registered
/// under a throwaway application code so concurrent tests never collide in
/// the process-wide store registry.
pub async fn test_store(application_code: impl Into<String>) -> (std::sync::Arc<Store>, FakeDriver) {
    let driver = FakeDriver::new();
    let config = StoreConfig::new("fake").with_application_code(application_code);
    let store = Store::open(config, driver.clone().as_driver_arc()).await;
    (store, driver)
}

pub async fn test_category(store: &Store, name: &str) -> std::sync::Arc<Category> {
    store.category(name).await.expect("opening a category against a fake driver never fails")
}
