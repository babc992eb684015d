//! Deployment backend over the AWS Lambda control plane.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::Environment;
use sls_core::deploy::{CodePayload, DeploymentBackend, FeatureSettings, FeatureUpdateReport};
use sls_core::Failure;

#[derive(Clone)]
pub struct AwsLambdaDeployer {
    client: aws_sdk_lambda::Client,
}

impl AwsLambdaDeployer {
    pub fn new(client: aws_sdk_lambda::Client) -> Self {
        Self { client }
    }

    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(aws_sdk_lambda::Client::new(config))
    }
}

// Both update calls answer with the same function configuration fields on
// distinct output types.
macro_rules! update_report {
    ($output:expr) => {{
        let output = $output;
        FeatureUpdateReport {
            code_sha256: output.code_sha256().unwrap_or_default().to_string(),
            code_size: output.code_size(),
            description: output.description().unwrap_or_default().to_string(),
            env_error: output
                .environment()
                .and_then(|env| env.error())
                .and_then(|error| error.message())
                .map(str::to_string),
            lambda_arn: output.function_arn().unwrap_or_default().to_string(),
            lambda_name: output.function_name().unwrap_or_default().to_string(),
            last_modified: output.last_modified().unwrap_or_default().to_string(),
            last_update_status: output
                .last_update_status()
                .map(|status| status.as_str().to_string())
                .unwrap_or_default(),
            last_update_reason: output
                .last_update_status_reason()
                .unwrap_or_default()
                .to_string(),
            last_update_reason_code: output
                .last_update_status_reason_code()
                .map(|code| code.as_str().to_string())
                .unwrap_or_default(),
            package_type: output
                .package_type()
                .map(|kind| kind.as_str().to_string())
                .unwrap_or_default(),
            revision_id: output.revision_id().unwrap_or_default().to_string(),
            role: output.role().unwrap_or_default().to_string(),
            state: output
                .state()
                .map(|state| state.as_str().to_string())
                .unwrap_or_default(),
            state_reason: output.state_reason().unwrap_or_default().to_string(),
            state_reason_code: output
                .state_reason_code()
                .map(|code| code.as_str().to_string())
                .unwrap_or_default(),
            timeout: output.timeout().unwrap_or_default(),
            version: output.version().unwrap_or_default().to_string(),
        }
    }};
}

#[async_trait]
impl DeploymentBackend for AwsLambdaDeployer {
    async fn update_code(&self, payload: CodePayload) -> Result<FeatureUpdateReport, Failure> {
        let output = self
            .client
            .update_function_code()
            .function_name(&payload.qualified_name)
            .zip_file(Blob::new(payload.zip_file))
            .publish(payload.publish)
            .dry_run(payload.dry_run)
            .send()
            .await
            .map_err(|err| {
                Failure::system(format!(
                    "lambda.UpdateFunctionCode failed ({}): {}",
                    payload.qualified_name,
                    DisplayErrorContext(&err)
                ))
            })?;

        Ok(update_report!(&output))
    }

    async fn update_config(
        &self,
        settings: FeatureSettings,
    ) -> Result<FeatureUpdateReport, Failure> {
        let variables: HashMap<String, String> = settings.env_vars.into_iter().collect();
        let output = self
            .client
            .update_function_configuration()
            .function_name(&settings.qualified_name)
            .environment(Environment::builder().set_variables(Some(variables)).build())
            .send()
            .await
            .map_err(|err| {
                Failure::system(format!(
                    "lambda.UpdateFunctionConfiguration failed ({}): {}",
                    settings.qualified_name,
                    DisplayErrorContext(&err)
                ))
            })?;

        Ok(update_report!(&output))
    }
}
