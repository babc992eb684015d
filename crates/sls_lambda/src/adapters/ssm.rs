//! Parameter backend over AWS Systems Manager Parameter Store.

use async_trait::async_trait;
use aws_sdk_ssm::error::{DisplayErrorContext, SdkError};
use aws_sdk_ssm::types::ParameterType as SsmParameterType;
use sls_core::pstore::{
    BatchOutput, Parameter, ParameterBackend, ParameterPage, ParameterType, PathRequest,
    PutRequest,
};
use sls_core::{Failure, FailureKind};

#[derive(Clone)]
pub struct SsmBackend {
    client: aws_sdk_ssm::Client,
}

impl SsmBackend {
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }

    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(aws_sdk_ssm::Client::new(config))
    }
}

fn sdk_failure<E>(kind: FailureKind, err: SdkError<E>, context: String) -> Failure
where
    E: std::error::Error + 'static,
{
    Failure::new(kind, format!("{context}: {}", DisplayErrorContext(&err)))
}

fn classify<E>(err: &SdkError<E>, is_not_found: impl Fn(&E) -> bool) -> FailureKind {
    match err {
        SdkError::ServiceError(service_err) if is_not_found(service_err.err()) => {
            FailureKind::NotFound
        }
        _ => FailureKind::System,
    }
}

fn to_parameter(parameter: &aws_sdk_ssm::types::Parameter) -> Parameter {
    Parameter {
        name: parameter.name().unwrap_or_default().to_string(),
        value: parameter.value().unwrap_or_default().to_string(),
    }
}

fn to_ssm_type(kind: ParameterType) -> SsmParameterType {
    match kind {
        ParameterType::String => SsmParameterType::String,
        ParameterType::SecureString => SsmParameterType::SecureString,
    }
}

#[async_trait]
impl ParameterBackend for SsmBackend {
    async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<String, Failure> {
        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(with_decryption)
            .send()
            .await
            .map_err(|err| {
                let kind = classify(&err, |e| e.is_parameter_not_found());
                sdk_failure(kind, err, format!("ssm.GetParameter failed ({name})"))
            })?;

        output
            .parameter()
            .and_then(|parameter| parameter.value())
            .map(str::to_string)
            .ok_or_else(|| Failure::not_found(format!("parameter ({name}) has no value")))
    }

    async fn get_parameters_by_path(
        &self,
        request: &PathRequest,
        next_token: Option<String>,
    ) -> Result<ParameterPage, Failure> {
        let output = self
            .client
            .get_parameters_by_path()
            .path(&request.path)
            .recursive(request.recursive)
            .with_decryption(request.with_decryption)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|err| {
                sdk_failure(
                    FailureKind::System,
                    err,
                    format!("ssm.GetParametersByPath failed ({})", request.path),
                )
            })?;

        Ok(ParameterPage {
            parameters: output.parameters().iter().map(to_parameter).collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn get_parameters(
        &self,
        names: &[String],
        with_decryption: bool,
    ) -> Result<BatchOutput, Failure> {
        let output = self
            .client
            .get_parameters()
            .set_names(Some(names.to_vec()))
            .with_decryption(with_decryption)
            .send()
            .await
            .map_err(|err| {
                sdk_failure(
                    FailureKind::System,
                    err,
                    format!("ssm.GetParameters failed ({} names)", names.len()),
                )
            })?;

        Ok(BatchOutput {
            parameters: output.parameters().iter().map(to_parameter).collect(),
            invalid: output.invalid_parameters().to_vec(),
        })
    }

    async fn delete_parameter(&self, name: &str) -> Result<(), Failure> {
        self.client
            .delete_parameter()
            .name(name)
            .send()
            .await
            .map_err(|err| {
                let kind = classify(&err, |e| e.is_parameter_not_found());
                sdk_failure(kind, err, format!("ssm.DeleteParameter failed ({name})"))
            })?;
        Ok(())
    }

    async fn put_parameter(&self, request: &PutRequest) -> Result<(), Failure> {
        self.client
            .put_parameter()
            .name(&request.name)
            .value(&request.value)
            .r#type(to_ssm_type(request.kind))
            .overwrite(request.overwrite)
            .send()
            .await
            .map_err(|err| {
                let kind = match &err {
                    SdkError::ServiceError(service_err)
                        if service_err.err().is_parameter_already_exists() =>
                    {
                        FailureKind::Conflict
                    }
                    _ => FailureKind::System,
                };
                sdk_failure(kind, err, format!("ssm.PutParameter failed ({})", request.name))
            })?;
        Ok(())
    }
}
