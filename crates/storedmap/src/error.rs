use thiserror::Error;

/// Errors surfaced by the store.
///
/// All fallible operations in this crate return this error type so callers
/// get consistent handling whether the failure originated in the store
/// itself or propagated up from a [`crate::driver::Driver`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be created: the configured driver failed to open
    /// a connection, or required configuration was missing.
    #[error("configuration failure: {0}")]
    Configuration(String),

    /// A driver operation failed (primary write, secondary write, lock,
    /// enumeration, ...). Carries the driver's own error message.
    #[error("driver error: {0}")]
    Driver(String),

    /// The in-memory payload could not be serialised or deserialised.
    #[error("serialization failure: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether a caller observing this error (e.g. via the persister's
    /// uncaught-error sink) can reasonably retry the operation.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Driver(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
