#![forbid(unsafe_code)]

pub mod cycle_log;
pub mod documents;
pub mod error;
pub mod probe_cache;
pub mod registry;

pub use error::StorageError;
