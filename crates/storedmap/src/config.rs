use std::collections::BTreeMap;

/// Recognised, string-keyed configuration for a [`crate::store::Store`].
///
/// Two configurations that compare equal resolve to the same process-wide
/// `Store` instance, so this type must be `Hash + Eq + Clone`; `extra` uses
/// a `BTreeMap` rather than a `HashMap` purely so derived `Hash`/`Eq` don't
/// depend on iteration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreConfig {
    driver: String,
    application_code: String,
    extra: BTreeMap<String, String>,
}

impl StoreConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            application_code: "storedmap".to_string(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_application_code(mut self, code: impl Into<String>) -> Self {
        self.application_code = code.into();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn application_code(&self) -> &str {
        &self.application_code
    }

    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("generic-relational")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_application_code_is_storedmap() {
        assert_eq!(StoreConfig::default().application_code(), "storedmap");
    }

    #[test]
    fn equal_configs_hash_equal() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let a = StoreConfig::new("d").with_extra("x", "1").with_extra("y", "2");
        let b = StoreConfig::new("d").with_extra("y", "2").with_extra("x", "1");
        assert_eq!(a, b);

        let mut ha = DefaultHasher::new();
        a.hash(&mut ha);
        let mut hb = DefaultHasher::new();
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }
}
