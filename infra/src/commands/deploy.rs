//! `infra deploy FEATURE`: build, zip and upload a feature, or push only its
//! environment with `--env-only`.

use std::io::Write;

use sls_core::deploy::{deploy_feature_code, deploy_feature_config, DeploymentBackend};
use sls_core::pstore::{Client, ParameterBackend};
use sls_core::service::MicroService;
use tracing::info;

use crate::build::{BuildSettings, Packager};
use crate::cli::DeployArgs;
use crate::context::CmdContext;
use crate::error::CliError;
use crate::output::Output;

pub async fn run<B, D, O, E>(
    ctx: &CmdContext,
    service: &mut MicroService,
    args: DeployArgs,
    store: &Client<B>,
    deployer: &D,
    packager: &dyn Packager,
    out: &mut Output<O, E>,
) -> Result<(), CliError>
where
    B: ParameterBackend,
    D: DeploymentBackend,
    O: Write,
    E: Write,
{
    let title = ctx.resolve_feature(service, &args.feature)?;
    let app_title = service.app_title();

    let report = if args.env_only {
        let feature = service.feature_mut(&title)?;
        deploy_feature_config(store, deployer, &app_title, feature).await?
    } else {
        let feature = service.feature(&title)?;
        let settings =
            BuildSettings::for_feature(service.layout(), feature, &args.target, args.profile);
        let build = packager.package(&settings)?;
        info!(
            feature = %feature.name,
            zip = %build.zip_path.display(),
            "deploying package"
        );
        deploy_feature_code(deployer, feature, build.zip_data).await?
    };

    if ctx.global.verbose {
        out.display_json(&report)?;
    }
    Ok(())
}
