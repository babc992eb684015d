//! Deployment seam between a feature and the function that runs it.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::env::EnvMap;
use crate::failure::{Failure, FailureContext};
use crate::params::{feature_params, strip_app_title};
use crate::pstore::{Client, ParameterBackend};
use crate::service::Feature;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePayload {
    pub qualified_name: String,
    pub zip_file: Vec<u8>,
    pub publish: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSettings {
    pub qualified_name: String,
    pub env_vars: EnvMap,
}

/// What the platform reported back after an update. Fields the platform
/// left out stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureUpdateReport {
    pub code_sha256: String,
    pub code_size: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_error: Option<String>,
    pub lambda_arn: String,
    pub lambda_name: String,
    pub last_modified: String,
    pub last_update_status: String,
    pub last_update_reason: String,
    pub last_update_reason_code: String,
    pub package_type: String,
    pub revision_id: String,
    pub role: String,
    pub state: String,
    pub state_reason: String,
    pub state_reason_code: String,
    pub timeout: i32,
    pub version: String,
}

#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    async fn update_code(&self, payload: CodePayload) -> Result<FeatureUpdateReport, Failure>;

    async fn update_config(&self, settings: FeatureSettings)
        -> Result<FeatureUpdateReport, Failure>;
}

/// Pushes the feature's stored parameters to its function as environment
/// variables, named without the app title.
pub async fn deploy_feature_config<B, D>(
    store: &Client<B>,
    deployer: &D,
    app_title: &str,
    feature: &mut Feature,
) -> Result<FeatureUpdateReport, Failure>
where
    B: ParameterBackend,
    D: DeploymentBackend + ?Sized,
{
    let params = feature_params(store, app_title, feature)
        .await
        .wrap_err("feature_params failed")?;
    let env_vars = strip_app_title(app_title, params);

    let settings = FeatureSettings {
        qualified_name: feature.qualified_name.clone(),
        env_vars,
    };
    let report = deployer
        .update_config(settings)
        .await
        .wrap_err_with(|| format!("update_config failed ({})", feature.qualified_name))?;
    info!(function = %feature.qualified_name, "function configuration updated");
    Ok(report)
}

pub async fn deploy_feature_code<D>(
    deployer: &D,
    feature: &Feature,
    zip_file: Vec<u8>,
) -> Result<FeatureUpdateReport, Failure>
where
    D: DeploymentBackend + ?Sized,
{
    if zip_file.is_empty() {
        return Err(Failure::invalid_param(format!(
            "deployment package for ({}) is empty",
            feature.name
        )));
    }

    let payload = CodePayload {
        qualified_name: feature.qualified_name.clone(),
        zip_file,
        publish: false,
        dry_run: false,
    };
    let report = deployer
        .update_code(payload)
        .await
        .wrap_err_with(|| format!("update_code failed ({})", feature.qualified_name))?;
    info!(
        function = %feature.qualified_name,
        code_size = report.code_size,
        "function code updated"
    );
    Ok(report)
}
