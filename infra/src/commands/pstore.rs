//! `infra pstore [FEATURE]`, `import`, `export` and `delete`.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use sls_core::env::EnvMap;
use sls_core::params::{
    delete_all_feature_params, delete_all_service_params, delete_service_param, feature_params,
    import_params, service_params, strip_app_title,
};
use sls_core::pstore::{Client, ParameterBackend, PartialResult};
use sls_core::reconcile::collect_service_params;
use sls_core::service::MicroService;
use sls_core::Failure;

use crate::cli::{PstoreArgs, PstoreCommand};
use crate::context::CmdContext;
use crate::error::CliError;
use crate::output::{write_json_file, Output};

/// Failures that did not stop a batch, as printed on stderr.
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub errors: Vec<String>,
}

impl ErrorReport {
    pub fn from_failure(failure: &Failure) -> Self {
        let errors = if failure.is_multiple() {
            failure.errors().iter().map(ToString::to_string).collect()
        } else {
            vec![failure.to_string()]
        };
        Self { errors }
    }
}

pub async fn run<B, O, E>(
    ctx: &CmdContext,
    service: &mut MicroService,
    args: PstoreArgs,
    store: &Client<B>,
    out: &mut Output<O, E>,
) -> Result<(), CliError>
where
    B: ParameterBackend,
    O: Write,
    E: Write,
{
    match args.command {
        None => show(ctx, service, args.feature.as_deref(), store, out).await,
        Some(PstoreCommand::Export { feature, file }) => {
            export(ctx, service, feature.as_deref(), file.as_deref(), store, out).await
        }
        Some(PstoreCommand::Import {
            file,
            from_env,
            overwrite,
        }) => import(service, file.as_deref(), from_env, overwrite, store, out).await,
        Some(PstoreCommand::Delete { key, feature }) => {
            delete(ctx, service, key.as_deref(), feature.as_deref(), store, out).await
        }
    }
}

/// Stored values for the feature, or for the service with `--all`. Keys
/// keep their full path.
async fn lookup<B: ParameterBackend>(
    ctx: &CmdContext,
    service: &mut MicroService,
    feature: Option<&str>,
    store: &Client<B>,
) -> Result<EnvMap, CliError> {
    let app_title = service.app_title();
    if ctx.global.all {
        return Ok(service_params(store, &app_title).await?);
    }

    let name = feature.ok_or_else(|| Failure::invalid_param("feature or --all flag is required"))?;
    let title = ctx.resolve_feature(service, name)?;
    let feature = service.feature_mut(&title)?;
    Ok(feature_params(store, &app_title, feature).await?)
}

async fn show<B, O, E>(
    ctx: &CmdContext,
    service: &mut MicroService,
    feature: Option<&str>,
    store: &Client<B>,
    out: &mut Output<O, E>,
) -> Result<(), CliError>
where
    B: ParameterBackend,
    O: Write,
    E: Write,
{
    let params = lookup(ctx, service, feature, store).await?;
    out.display_map(&service.app_title(), &params)
}

async fn export<B, O, E>(
    ctx: &CmdContext,
    service: &mut MicroService,
    feature: Option<&str>,
    file: Option<&Path>,
    store: &Client<B>,
    out: &mut Output<O, E>,
) -> Result<(), CliError>
where
    B: ParameterBackend,
    O: Write,
    E: Write,
{
    let app_title = service.app_title();
    let params = strip_app_title(&app_title, lookup(ctx, service, feature, store).await?);
    match file {
        Some(path) => write_json_file(path, &params),
        None => out.display_map(&app_title, &params),
    }
}

fn read_params_file(path: &Path) -> Result<EnvMap, CliError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| CliError::io("failed to read params file", path, e))?;
    Ok(serde_json::from_str(&raw)?)
}

async fn import<B, O, E>(
    service: &MicroService,
    file: Option<&Path>,
    from_env: bool,
    overwrite: bool,
    store: &Client<B>,
    out: &mut Output<O, E>,
) -> Result<(), CliError>
where
    B: ParameterBackend,
    O: Write,
    E: Write,
{
    let app_title = service.app_title();
    let params = match (file, from_env) {
        (Some(path), _) => read_params_file(path)?,
        (None, true) => collect_service_params(service, &app_title)?,
        (None, false) => return Err(CliError::usage("--file or --from-env is required")),
    };

    let report = import_params(store, &app_title, &params, overwrite).await?;
    if let Some(failure) = &report.failure {
        out.display_error_json(&ErrorReport::from_failure(failure))?;
    }
    out.display_json(&report.backup)
}

/// Prints what was deleted, then fails if any key could not be deleted.
fn finish_delete<O: Write, E: Write>(
    result: PartialResult,
    out: &mut Output<O, E>,
) -> Result<(), CliError> {
    out.display_json(&result.values)?;
    match result.failure {
        Some(failure) => {
            out.display_error_json(&ErrorReport::from_failure(&failure))?;
            Err(failure.wrap("some params were not deleted").into())
        }
        None => Ok(()),
    }
}

async fn delete<B, O, E>(
    ctx: &CmdContext,
    service: &mut MicroService,
    key: Option<&str>,
    feature: Option<&str>,
    store: &Client<B>,
    out: &mut Output<O, E>,
) -> Result<(), CliError>
where
    B: ParameterBackend,
    O: Write,
    E: Write,
{
    let app_title = service.app_title();

    if ctx.global.all {
        let result = match feature {
            Some(name) => {
                let title = ctx.resolve_feature(service, name)?;
                let feature = service.feature_mut(&title)?;
                delete_all_feature_params(store, &app_title, feature).await?
            }
            None => delete_all_service_params(store, &app_title).await?,
        };
        return finish_delete(result, out);
    }

    let key = key.ok_or_else(|| Failure::invalid_param("parameter name is missing"))?;
    let deleted = delete_service_param(store, &app_title, key).await?;
    out.display_json(&deleted)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use sls_core::env::{EnvSource, EnvSpec};
    use sls_core::testing::MemoryBackend;

    use super::*;
    use crate::commands::test_support::{context, service_with};

    fn spec() -> EnvSpec {
        EnvSpec::new()
            .with_var("TABLE")
            .with_default("LOG_LEVEL", "info")
            .with_source(EnvSource::Fixed(EnvMap::from([(
                "TABLE".to_string(),
                "orders".to_string(),
            )])))
    }

    fn store(values: &[(&str, &str)]) -> Client<MemoryBackend> {
        Client::new(MemoryBackend::with_values(values.iter().copied()), true)
    }

    fn args(command: Option<PstoreCommand>, feature: Option<&str>) -> PstoreArgs {
        PstoreArgs {
            command,
            feature: feature.map(str::to_string),
        }
    }

    fn output() -> Output<Vec<u8>, Vec<u8>> {
        Output::new(Vec::new(), Vec::new(), false)
    }

    fn split(out: Output<Vec<u8>, Vec<u8>>) -> (Value, String) {
        let (stdout, stderr) = out.into_parts();
        (
            serde_json::from_slice(&stdout).expect("json on stdout"),
            String::from_utf8(stderr).expect("utf8"),
        )
    }

    #[tokio::test]
    async fn shows_feature_params_by_full_path() {
        let ctx = context(&[]);
        let mut service = service_with(vec![("create", spec())]);
        let store = store(&[("/use1-dev-orders/TABLE", "orders")]);
        let mut out = output();

        run(&ctx, &mut service, args(None, Some("create")), &store, &mut out)
            .await
            .expect("shown");
        let (value, _) = split(out);
        assert_eq!(value, json!({"/use1-dev-orders/TABLE": "orders"}));
    }

    #[tokio::test]
    async fn export_strips_the_app_title() {
        let ctx = context(&["--all"]);
        let mut service = service_with(vec![("create", spec())]);
        let store = store(&[
            ("/use1-dev-orders/TABLE", "orders"),
            ("/use1-dev-orders/QUEUE", "jobs"),
            ("/use1-dev-billing/TABLE", "invoices"),
        ]);
        let mut out = output();

        let command = PstoreCommand::Export {
            feature: None,
            file: None,
        };
        run(&ctx, &mut service, args(Some(command), None), &store, &mut out)
            .await
            .expect("exported");
        let (value, _) = split(out);
        assert_eq!(value, json!({"QUEUE": "jobs", "TABLE": "orders"}));
    }

    #[tokio::test]
    async fn import_from_file_returns_backup_of_replaced_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("params.json");
        fs::write(&path, r#"{"TABLE": "orders-v2", "QUEUE": "jobs"}"#).expect("file");

        let ctx = context(&[]);
        let mut service = service_with(vec![("create", spec())]);
        let store = store(&[("/use1-dev-orders/TABLE", "orders")]);
        let mut out = output();

        let command = PstoreCommand::Import {
            file: Some(path),
            from_env: false,
            overwrite: true,
        };
        run(&ctx, &mut service, args(Some(command), None), &store, &mut out)
            .await
            .expect("imported");

        let (value, stderr) = split(out);
        assert_eq!(value, json!({"/use1-dev-orders/TABLE": "orders"}));
        assert!(stderr.is_empty());
        assert_eq!(
            store.backend().value("/use1-dev-orders/TABLE").as_deref(),
            Some("orders-v2")
        );
    }

    #[tokio::test]
    async fn import_conflicts_are_reported_and_not_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("params.json");
        fs::write(&path, r#"{"TABLE": "orders-v2"}"#).expect("file");

        let ctx = context(&[]);
        let mut service = service_with(vec![("create", spec())]);
        let store = store(&[("/use1-dev-orders/TABLE", "orders")]);
        let mut out = output();

        let command = PstoreCommand::Import {
            file: Some(path),
            from_env: false,
            overwrite: false,
        };
        run(&ctx, &mut service, args(Some(command), None), &store, &mut out)
            .await
            .expect("import finishes");

        let (value, stderr) = split(out);
        assert_eq!(value, json!({}));
        let errors: Value = serde_json::from_str(stderr.trim()).expect("json on stderr");
        assert_eq!(errors["errors"].as_array().map(Vec::len), Some(1));
        assert_eq!(
            store.backend().value("/use1-dev-orders/TABLE").as_deref(),
            Some("orders")
        );
    }

    #[tokio::test]
    async fn import_from_env_uses_feature_values() {
        let ctx = context(&[]);
        let mut service = service_with(vec![("create", spec())]);
        let store = store(&[]);
        let mut out = output();

        let command = PstoreCommand::Import {
            file: None,
            from_env: true,
            overwrite: false,
        };
        run(&ctx, &mut service, args(Some(command), None), &store, &mut out)
            .await
            .expect("imported");
        assert_eq!(
            store.backend().value("/use1-dev-orders/TABLE").as_deref(),
            Some("orders")
        );
    }

    #[tokio::test]
    async fn import_needs_a_source() {
        let ctx = context(&[]);
        let mut service = service_with(vec![("create", spec())]);
        let mut out = output();
        let command = PstoreCommand::Import {
            file: None,
            from_env: false,
            overwrite: false,
        };
        let result = run(&ctx, &mut service, args(Some(command), None), &store(&[]), &mut out).await;
        assert!(matches!(result, Err(CliError::Usage(_))));
    }

    #[tokio::test]
    async fn deletes_a_single_key() {
        let ctx = context(&[]);
        let mut service = service_with(vec![("create", spec())]);
        let store = store(&[("/use1-dev-orders/TABLE", "orders")]);
        let mut out = output();

        let command = PstoreCommand::Delete {
            key: Some("TABLE".to_string()),
            feature: None,
        };
        run(&ctx, &mut service, args(Some(command), None), &store, &mut out)
            .await
            .expect("deleted");
        let (value, _) = split(out);
        assert_eq!(value, json!({"/use1-dev-orders/TABLE": "orders"}));
        assert!(store.backend().value("/use1-dev-orders/TABLE").is_none());
    }

    #[tokio::test]
    async fn delete_all_removes_every_service_param() {
        let ctx = context(&["--all"]);
        let mut service = service_with(vec![("create", spec())]);
        let store = store(&[
            ("/use1-dev-orders/TABLE", "orders"),
            ("/use1-dev-orders/QUEUE", "jobs"),
        ]);
        let mut out = output();

        let command = PstoreCommand::Delete {
            key: None,
            feature: None,
        };
        run(&ctx, &mut service, args(Some(command), None), &store, &mut out)
            .await
            .expect("deleted");
        assert_eq!(store.backend().deletes().len(), 2);
        let (value, _) = split(out);
        assert_eq!(
            value,
            json!({"/use1-dev-orders/QUEUE": "jobs", "/use1-dev-orders/TABLE": "orders"})
        );
    }
}
