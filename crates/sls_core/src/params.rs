//! Service-level parameter operations.
//!
//! Parameters of a service live under `/<app_title>/`. Keys given by an
//! operator may be bare (`TABLE_NAME`), app-relative (`use1-dev-orders/TABLE_NAME`)
//! or absolute (`/use1-dev-orders/TABLE_NAME`); [`qualify_key`] maps all of
//! them to the absolute form.

use serde::Serialize;
use tracing::{info, warn};

use crate::env::{DefaultsPolicy, EnvMap, EnvReporter};
use crate::failure::{Failure, FailureContext, FailureSet};
use crate::pstore::{Client, ParameterBackend, PartialResult};
use crate::service::Feature;

fn require_app_title(app_title: &str) -> Result<&str, Failure> {
    let app = app_title.trim_matches('/');
    if app.is_empty() {
        return Err(Failure::invalid_param(
            "app title is empty, should be the qualified name of the service",
        ));
    }
    Ok(app)
}

pub fn qualify_key(app_title: &str, key: &str) -> Result<String, Failure> {
    let app = require_app_title(app_title)?;
    let relative = key.trim_start_matches('/');
    if relative.is_empty() {
        return Err(Failure::invalid_param("parameter key is empty"));
    }

    let under_app = relative
        .strip_prefix(app)
        .is_some_and(|rest| rest.starts_with('/'));
    if under_app {
        Ok(format!("/{relative}"))
    } else {
        Ok(format!("/{app}/{relative}"))
    }
}

/// Drops the `/<app_title>/` prefix so keys read as environment variable
/// names again. Keys outside the app are kept as they are.
pub fn strip_app_title(app_title: &str, params: EnvMap) -> EnvMap {
    let prefix = format!("/{}/", app_title.trim_matches('/'));
    params
        .into_iter()
        .map(|(key, value)| match key.strip_prefix(&prefix) {
            Some(name) => (name.to_string(), value),
            None => (key, value),
        })
        .collect()
}

pub async fn service_param<B: ParameterBackend>(
    client: &Client<B>,
    app_title: &str,
    key: &str,
) -> Result<String, Failure> {
    let path = qualify_key(app_title, key)?;
    client
        .param(&path)
        .await
        .wrap_err_with(|| format!("param failed ({app_title}, {key})"))
}

/// Writes one service parameter and returns `{path: old}` when a value was
/// replaced or already matched.
pub async fn put_service_param<B: ParameterBackend>(
    client: &Client<B>,
    app_title: &str,
    key: &str,
    value: &str,
    overwrite: bool,
) -> Result<EnvMap, Failure> {
    let path = qualify_key(app_title, key)?;
    let old = client
        .put(&path, value, overwrite)
        .await
        .wrap_err_with(|| format!("put failed ({app_title}, {key})"))?;

    Ok(old.into_iter().map(|old| (path.clone(), old)).collect())
}

pub async fn delete_service_param<B: ParameterBackend>(
    client: &Client<B>,
    app_title: &str,
    key: &str,
) -> Result<EnvMap, Failure> {
    let path = qualify_key(app_title, key)?;
    let old = client
        .delete(&path)
        .await
        .wrap_err_with(|| format!("delete failed ({app_title}, {key})"))?;
    Ok(EnvMap::from([(path, old)]))
}

/// Every parameter stored under the service's root.
pub async fn service_params<B: ParameterBackend>(
    client: &Client<B>,
    app_title: &str,
) -> Result<EnvMap, Failure> {
    let app = require_app_title(app_title)?;
    client
        .path(app, true)
        .await
        .into_result()
        .wrap_err("path failed")
}

/// Stored values of the variables the feature reads, defaults excluded.
/// Every variable must exist in the store.
pub async fn feature_params<B: ParameterBackend>(
    client: &Client<B>,
    app_title: &str,
    feature: &mut Feature,
) -> Result<EnvMap, Failure> {
    let app = require_app_title(app_title)?;

    let conf = feature.conf_mut();
    conf.mark_defaults_as_excluded();
    let names = conf
        .env_names()
        .wrap_err_with(|| format!("env_names failed for ({app}, {})", feature.name))?;

    let mut result = EnvMap::new();
    for name in names {
        let key = format!("/{app}/{name}");
        let value = client
            .param(&key)
            .await
            .wrap_err_with(|| format!("param failed ({app}, {}, {key})", feature.name))?;
        result.insert(key, value);
    }
    Ok(result)
}

async fn delete_keys<B: ParameterBackend>(client: &Client<B>, keys: EnvMap) -> PartialResult {
    let mut deleted = EnvMap::new();
    let mut failures = FailureSet::new();

    for key in keys.into_keys() {
        match client.delete(&key).await {
            Ok(old) => {
                deleted.insert(key, old);
            }
            Err(failure) => failures.push(failure),
        }
    }

    PartialResult {
        values: deleted,
        failure: failures.into_failure(),
    }
}

/// Deletes the feature's stored parameters. The values that were removed are
/// returned together with any per-key failures.
pub async fn delete_all_feature_params<B: ParameterBackend>(
    client: &Client<B>,
    app_title: &str,
    feature: &mut Feature,
) -> Result<PartialResult, Failure> {
    let params = feature_params(client, app_title, feature)
        .await
        .wrap_err("feature_params failed")?;
    let result = delete_keys(client, params).await;
    info!(feature = %feature.name, deleted = result.values.len(), "feature params deleted");
    Ok(result)
}

pub async fn delete_all_service_params<B: ParameterBackend>(
    client: &Client<B>,
    app_title: &str,
) -> Result<PartialResult, Failure> {
    let params = service_params(client, app_title)
        .await
        .wrap_err_with(|| format!("service_params failed for ({app_title})"))?;
    let result = delete_keys(client, params).await;
    info!(app = %app_title, deleted = result.values.len(), "service params deleted");
    Ok(result)
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    /// Previous values of keys that already existed, keyed by full path.
    pub backup: EnvMap,
    #[serde(skip)]
    pub failure: Option<Failure>,
}

/// Writes every entry of `params` under the service root. Each key is
/// attempted; failures are gathered instead of aborting the import.
pub async fn import_params<B: ParameterBackend>(
    client: &Client<B>,
    app_title: &str,
    params: &EnvMap,
    overwrite: bool,
) -> Result<ImportReport, Failure> {
    require_app_title(app_title)?;

    let mut backup = EnvMap::new();
    let mut failures = FailureSet::new();
    for (key, value) in params {
        match put_service_param(client, app_title, key, value, overwrite).await {
            Ok(old) => backup.extend(old),
            Err(failure) => {
                warn!(key = %key, error = %failure, "param import failed");
                failures.push(failure);
            }
        }
    }

    Ok(ImportReport {
        backup,
        failure: failures.into_failure(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::env::{EnvSource, EnvSpec};
    use crate::failure::FailureKind;
    use crate::naming::{Prefix, Region, ServiceName};
    use crate::service::{CodeLayout, MicroService};
    use crate::testing::MemoryBackend;
    use crate::trigger::InvokeTrigger;

    const APP: &str = "use1-dev-orders";

    fn client(values: &[(&str, &str)]) -> Client<MemoryBackend> {
        Client::new(MemoryBackend::with_values(values.iter().copied()), false)
    }

    fn service_with(spec: EnvSpec) -> MicroService {
        let prefix = Prefix::new(Region::UsEast1, "dev").expect("prefix");
        let name = ServiceName::new(prefix, "orders").expect("name");
        let mut service = MicroService::new(name, CodeLayout::new(Path::new("/repo")));
        service
            .add_feature(InvokeTrigger::Apigw, "create", Box::new(spec))
            .expect("feature added");
        service
    }

    #[test]
    fn qualify_key_handles_every_form() {
        assert_eq!(qualify_key(APP, "TABLE").expect("bare"), "/use1-dev-orders/TABLE");
        assert_eq!(
            qualify_key(APP, "use1-dev-orders/TABLE").expect("relative"),
            "/use1-dev-orders/TABLE"
        );
        assert_eq!(
            qualify_key(APP, "/use1-dev-orders/TABLE").expect("absolute"),
            "/use1-dev-orders/TABLE"
        );
        assert_eq!(
            qualify_key(APP, "use1-dev-orders-extra/TABLE").expect("lookalike"),
            "/use1-dev-orders/use1-dev-orders-extra/TABLE"
        );
        assert_eq!(
            qualify_key("", "TABLE").expect_err("no app").kind(),
            FailureKind::InvalidParam
        );
    }

    #[test]
    fn strip_app_title_leaves_env_names() {
        let params = EnvMap::from([
            ("/use1-dev-orders/TABLE".to_string(), "t".to_string()),
            ("/other/KEY".to_string(), "k".to_string()),
        ]);
        let stripped = strip_app_title(APP, params);
        assert_eq!(stripped.get("TABLE").map(String::as_str), Some("t"));
        assert_eq!(stripped.get("/other/KEY").map(String::as_str), Some("k"));
    }

    #[tokio::test]
    async fn put_and_read_service_param() {
        let client = client(&[]);

        let old = put_service_param(&client, APP, "TABLE", "orders", false)
            .await
            .expect("created");
        assert!(old.is_empty());
        assert_eq!(
            service_param(&client, APP, "TABLE").await.expect("read back"),
            "orders"
        );

        let old = put_service_param(&client, APP, "TABLE", "orders-v2", true)
            .await
            .expect("replaced");
        assert_eq!(
            old.get("/use1-dev-orders/TABLE").map(String::as_str),
            Some("orders")
        );
    }

    #[tokio::test]
    async fn delete_service_param_reports_old_value() {
        let client = client(&[("/use1-dev-orders/TABLE", "orders")]);
        let deleted = delete_service_param(&client, APP, "TABLE").await.expect("deleted");
        assert_eq!(
            deleted.get("/use1-dev-orders/TABLE").map(String::as_str),
            Some("orders")
        );
    }

    #[tokio::test]
    async fn feature_params_excludes_defaults_and_requires_values() {
        let spec = EnvSpec::new()
            .with_var("TABLE")
            .with_default("LOG_LEVEL", "info")
            .with_source(EnvSource::Fixed(EnvMap::new()));
        let mut service = service_with(spec);
        let feature = service.feature_mut("create").expect("feature");

        let client = client(&[("/use1-dev-orders/TABLE", "orders")]);
        let params = feature_params(&client, APP, feature).await.expect("params");
        assert_eq!(params.len(), 1);
        assert_eq!(
            params.get("/use1-dev-orders/TABLE").map(String::as_str),
            Some("orders")
        );

        let empty = self::client(&[]);
        let error = feature_params(&empty, APP, feature).await.expect_err("missing");
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn delete_all_service_params_removes_everything_under_root() {
        let client = client(&[
            ("/use1-dev-orders/A", "1"),
            ("/use1-dev-orders/B", "2"),
            ("/use1-dev-billing/C", "3"),
        ]);

        let result = delete_all_service_params(&client, APP).await.expect("deleted");
        assert!(result.failure.is_none());
        assert_eq!(result.values.len(), 2);
        assert!(client.backend().value("/use1-dev-billing/C").is_some());
    }

    #[tokio::test]
    async fn delete_all_feature_params_uses_feature_keys() {
        let spec = EnvSpec::new()
            .with_var("TABLE")
            .with_source(EnvSource::Fixed(EnvMap::new()));
        let mut service = service_with(spec);
        let feature = service.feature_mut("create").expect("feature");
        let client = client(&[("/use1-dev-orders/TABLE", "t"), ("/use1-dev-orders/OTHER", "o")]);

        let result = delete_all_feature_params(&client, APP, feature)
            .await
            .expect("deleted");
        assert_eq!(result.values.len(), 1);
        assert!(client.backend().value("/use1-dev-orders/OTHER").is_some());
    }

    #[tokio::test]
    async fn import_collects_every_failure_and_backs_up_old_values() {
        let client = client(&[("/use1-dev-orders/A", "old"), ("/use1-dev-orders/B", "keep")]);
        let params = EnvMap::from([
            ("A".to_string(), "old".to_string()),
            ("B".to_string(), "changed".to_string()),
            ("/use1-dev-orders/C".to_string(), "new".to_string()),
        ]);

        let report = import_params(&client, APP, &params, false)
            .await
            .expect("import ran");

        assert_eq!(report.backup.get("/use1-dev-orders/A").map(String::as_str), Some("old"));
        assert!(!report.backup.contains_key("/use1-dev-orders/C"));
        assert_eq!(
            client.backend().value("/use1-dev-orders/C").as_deref(),
            Some("new")
        );

        let failure = report.failure.expect("B conflicts");
        assert!(failure.is_multiple());
        assert_eq!(failure.errors().len(), 1);
        assert!(failure.errors()[0].is_conflict());
        assert_eq!(
            client.backend().value("/use1-dev-orders/B").as_deref(),
            Some("keep")
        );
    }

    #[tokio::test]
    async fn import_keeps_going_when_writes_fail() {
        let client = client(&[("/use1-dev-orders/A", "old")]);
        client.backend().fail_puts("access denied");
        let params = EnvMap::from([
            ("A".to_string(), "old".to_string()),
            ("B".to_string(), "new".to_string()),
            ("C".to_string(), "new".to_string()),
        ]);

        let report = import_params(&client, APP, &params, true)
            .await
            .expect("import ran");

        assert_eq!(report.backup.get("/use1-dev-orders/A").map(String::as_str), Some("old"));
        let failure = report.failure.expect("writes failed");
        assert_eq!(failure.errors().len(), 2);
        assert!(failure.errors().iter().all(Failure::is_system));
        assert!(failure.errors()[0].to_string().contains("put failed (use1-dev-orders, B)"));
        assert!(failure.errors()[1].to_string().contains("put failed (use1-dev-orders, C)"));
    }
}
