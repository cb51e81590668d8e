//! The execution engine: bounded dispatch over containerized code runs.
//!
//! A request flows validation → queue → worker → workspace → sandbox
//! launch → harvest → cleanup → stats. See [`dispatch::Dispatcher`] for
//! the admission contract.

pub mod batch;
pub mod dispatch;
pub mod docker;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod sandbox;
pub mod stats;
pub mod validate;
pub mod workspace;

#[cfg(test)]
mod docker_tests;

pub use batch::{BatchOutcome, CASE_TIMEOUT_SENTINEL};
pub use dispatch::{prepare_sandbox_root, Dispatcher, JobOutcome, SingleOutcome};
pub use error::ExecError;
pub use sandbox::TIMEOUT_SENTINEL;
