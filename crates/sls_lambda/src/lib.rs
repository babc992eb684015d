//! AWS-facing adapters and Lambda front-controllers for serverless features.
//!
//! This crate owns runtime integration details (trigger adapters, the SSM
//! parameter backend, Lambda deployment and logging bootstrap). Domain rules
//! live in `sls_core`; nothing here decides policy, it only translates.

pub mod adapters;
pub mod handlers;
pub mod telemetry;

/// Shared AWS configuration with optional region and profile overrides.
pub async fn load_aws_config(region: Option<&str>, profile: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}
