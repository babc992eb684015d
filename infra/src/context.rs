use aws_config::SdkConfig;
use sls_core::naming::{Prefix, Region, ServiceName};
use sls_core::pstore::Client;
use sls_core::reconcile::EnvReportOptions;
use sls_core::service::{CodeLayout, MicroService};
use sls_lambda::adapters::deploy::AwsLambdaDeployer;
use sls_lambda::adapters::ssm::SsmBackend;
use sls_lambda::load_aws_config;

use crate::cli::GlobalArgs;
use crate::error::CliError;

/// Settings shared by every command, resolved from the global flags.
#[derive(Debug, Clone)]
pub struct CmdContext {
    pub global: GlobalArgs,
}

impl CmdContext {
    pub fn new(global: GlobalArgs) -> Self {
        Self { global }
    }

    pub fn env_name(&self) -> Result<&str, CliError> {
        self.global
            .env
            .as_deref()
            .map(str::trim)
            .filter(|env| !env.is_empty())
            .ok_or_else(|| CliError::usage("--env (or ENV) is required"))
    }

    pub fn region(&self) -> Result<Region, CliError> {
        Ok(self.global.region.parse()?)
    }

    /// Service label from `--app`, else the root directory's name.
    pub fn app_label(&self) -> Result<String, CliError> {
        if let Some(app) = self.global.app.as_deref().filter(|app| !app.is_empty()) {
            return Ok(app.to_string());
        }

        let root = self
            .global
            .root
            .canonicalize()
            .map_err(|e| CliError::io("failed to resolve service root", &self.global.root, e))?;
        root.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| CliError::usage("--app is required when the root has no name"))
    }

    pub fn service_name(&self) -> Result<ServiceName, CliError> {
        let prefix = Prefix::new(self.region()?, self.env_name()?)?;
        Ok(ServiceName::new(prefix, self.app_label()?)?)
    }

    /// The service with every feature found under the root directory.
    pub fn load_service(&self) -> Result<MicroService, CliError> {
        let layout = CodeLayout::new(&self.global.root);
        let mut service = MicroService::new(self.service_name()?, layout);
        service.load_features_from_filesystem()?;
        Ok(service)
    }

    /// Title of the feature the operator named.
    pub fn resolve_feature(&self, service: &MicroService, name: &str) -> Result<String, CliError> {
        Ok(service.resolve_feature(name, self.global.name_includes_trigger)?)
    }

    pub fn report_options(&self, names_only: bool) -> EnvReportOptions {
        EnvReportOptions {
            names_only,
            skip_defaults: self.global.skip_defaults,
            with_trigger: self.global.name_includes_trigger,
        }
    }

    pub async fn aws_config(&self) -> SdkConfig {
        load_aws_config(Some(&self.global.region), self.global.profile.as_deref()).await
    }

    pub fn pstore_client(&self, config: &SdkConfig) -> Client<SsmBackend> {
        Client::new(SsmBackend::from_conf(config), self.global.encrypt)
    }

    pub fn deployer(&self, config: &SdkConfig) -> AwsLambdaDeployer {
        AwsLambdaDeployer::from_conf(config)
    }
}
