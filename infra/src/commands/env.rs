//! `infra env [FEATURE]` and `infra env export`.

use std::io::Write;
use std::path::Path;

use sls_core::reconcile::{feature_env_report, service_env_report};
use sls_core::service::MicroService;
use sls_core::Failure;

use crate::cli::{EnvArgs, EnvCommand};
use crate::context::CmdContext;
use crate::error::CliError;
use crate::output::{write_json_file, Output};

pub fn run<O: Write, E: Write>(
    ctx: &CmdContext,
    service: &mut MicroService,
    args: EnvArgs,
    out: &mut Output<O, E>,
) -> Result<(), CliError> {
    match args.command {
        None => report(ctx, service, args.feature.as_deref(), args.names_only, None, out),
        Some(EnvCommand::Export {
            feature,
            file,
            names_only,
        }) => report(ctx, service, feature.as_deref(), names_only, file.as_deref(), out),
    }
}

fn report<O: Write, E: Write>(
    ctx: &CmdContext,
    service: &mut MicroService,
    feature: Option<&str>,
    names_only: bool,
    file: Option<&Path>,
    out: &mut Output<O, E>,
) -> Result<(), CliError> {
    let options = ctx.report_options(names_only);

    if ctx.global.all {
        let label = service.app_title();
        let (merged, conflicts) = service_env_report(service, options)?;
        if !conflicts.is_empty() {
            out.display_error_json(&conflicts)?;
        }
        return match file {
            Some(path) => write_json_file(path, &merged),
            None => out.display_map(&label, &merged),
        };
    }

    let name = feature.ok_or_else(|| Failure::invalid_param("feature or --all flag is required"))?;
    let title = ctx.resolve_feature(service, name)?;
    let feature = service.feature_mut(&title)?;
    let label = if ctx.global.qualified_name {
        feature.qualified_name.clone()
    } else {
        feature.name.clone()
    };
    let result = feature_env_report(feature.conf_mut(), options)?;

    match file {
        Some(path) => write_json_file(path, &result),
        None => out.display_map(&label, &result),
    }
}
