mod category;
mod config;
mod driver;
mod error;
mod holder;
mod identity_cache;
mod name_translator;
mod payload;
mod persisted;
mod persister;
mod record;
mod sort_key;
mod store;
mod value;

pub use category::{Category, SharedCategory};
pub use config::StoreConfig;
pub use driver::{Driver, DriverLimits, ListFilter, LockOutcome, SortRange};
pub use error::{StoreError, StoreResult};
pub use holder::{Holder, HolderState};
pub use identity_cache::IdentityCache;
pub use name_translator::{inverse, sanitise, translate};
pub use payload::Payload;
pub use record::Record;
pub use sort_key::{Collator, SortKeyCodec, SortValue};
pub use store::Store;
pub use value::MapValue;

pub use chrono;
pub use indexmap;
