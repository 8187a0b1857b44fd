#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod cycle;
pub mod error;
pub mod evaluate;
pub mod probe_flow;
pub mod summary;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::OrchestratorConfig;
pub use context::CycleContext;
pub use error::OrchestratorError;
