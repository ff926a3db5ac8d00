pub mod fake_driver;
pub mod fixtures;

pub use fake_driver::{FakeDriver, FakeDriverStats};
pub use fixtures::{test_category, test_store};
