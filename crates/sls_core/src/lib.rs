//! Serverless microservice domain primitives.
//!
//! This crate owns the runner, the parameter store client, environment
//! reconciliation and the feature registry. It intentionally excludes AWS SDK
//! and Lambda runtime concerns: storage and deployment are reached through
//! the [`pstore::ParameterBackend`] and [`deploy::DeploymentBackend`] traits,
//! implemented for AWS in `sls_lambda`.

pub mod deploy;
pub mod env;
pub mod failure;
pub mod invocation;
pub mod naming;
pub mod params;
pub mod pstore;
pub mod reconcile;
pub mod runner;
pub mod service;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod trigger;

pub use failure::{Failure, FailureKind};
