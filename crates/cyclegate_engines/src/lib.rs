#![forbid(unsafe_code)]

pub mod executor;
pub mod gates;
pub mod host_checks;
pub mod lane;
pub mod lineage;
pub mod matrix;
pub mod metrics;
pub mod probe;
pub mod scoring;
