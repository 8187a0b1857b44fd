#![forbid(unsafe_code)]

pub mod common;
pub mod matrix;
pub mod metrics;
pub mod outcome;
pub mod probe;
pub mod scoring;
pub mod unit;

pub use common::{ContractViolation, ReasonCodeId, SchemaVersion, Validate};
