//! Storage abstractions and backends.
//!
//! The engine talks to storage only through the traits in [`traits`]. Two
//! backends implement them: [`memory`] for embedded use and tests, and
//! `persistent` (feature `persistent`) for a durable single-process database.

pub(crate) mod index;
pub mod memory;
pub mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::InMemoryStores;
pub use traits::{
    ConditionStore, ConditionTypeStore, ConfigFileStore, HardwareStore, LogStore, RunStore,
    StorageError,
};
