//! Environment reports for one feature or a whole service.
//!
//! Service reports merge every feature's variables into one map. The first
//! feature (in title order) to declare a name decides its value. Later
//! features that disagree are listed in a separate conflict map under their
//! own key, and their values are never applied. Conflicts do not fail the
//! report; callers decide whether to surface or reject them.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::env::{Configurable, EnvMap};
use crate::failure::{Failure, FailureContext};
use crate::service::MicroService;

/// Conflicting values keyed by the feature that declared them.
pub type ConflictMap = BTreeMap<String, EnvMap>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnvReportOptions {
    /// Report names with empty values.
    pub names_only: bool,
    /// Leave out variables whose only value is their declared default.
    pub skip_defaults: bool,
    /// Key conflicts by `<trigger>_<name>` instead of the feature name.
    pub with_trigger: bool,
}

pub fn feature_env_report(
    config: &mut dyn Configurable,
    options: EnvReportOptions,
) -> Result<EnvMap, Failure> {
    config.set_exclude_defaults(options.skip_defaults);

    if options.names_only {
        let names = config.env_names().wrap_err("env_names failed")?;
        return Ok(names.into_iter().map(|name| (name, String::new())).collect());
    }

    config.env_to_map().wrap_err("env_to_map failed")
}

pub fn service_env_report(
    service: &mut MicroService,
    options: EnvReportOptions,
) -> Result<(EnvMap, ConflictMap), Failure> {
    let mut merged = EnvMap::new();
    let mut conflicts = ConflictMap::new();

    for feature in service.features_mut() {
        let key = if options.with_trigger {
            feature.name_with_trigger()
        } else {
            feature.name.clone()
        };

        let report = feature_env_report(feature.conf_mut(), options)
            .wrap_err_with(|| format!("feature_env_report failed for ({key})"))?;

        for (name, value) in report {
            match merged.get(&name) {
                None => {
                    merged.insert(name, value);
                }
                Some(existing) if *existing == value => {}
                Some(existing) => {
                    warn!(
                        feature = %key,
                        env = %name,
                        kept = %existing,
                        rejected = %value,
                        "conflicting env value ignored"
                    );
                    conflicts.entry(key.clone()).or_default().insert(name, value);
                }
            }
        }
    }

    Ok((merged, conflicts))
}

/// Parameter store paths and values for every feature of the service.
/// Unlike the env report, two features resolving the same path to different
/// values is an error: there is no safe value to import.
pub fn collect_service_params(service: &MicroService, app_title: &str) -> Result<EnvMap, Failure> {
    let mut params = EnvMap::new();

    for feature in service.features() {
        let collected = feature
            .conf()
            .collect_params_from_env(app_title)
            .wrap_err_with(|| format!("collect_params_from_env failed for ({})", feature.name))?;

        for (key, value) in collected {
            match params.get(&key) {
                None => {
                    params.insert(key, value);
                }
                Some(existing) if *existing == value => {}
                Some(existing) => {
                    return Err(Failure::conflict(format!(
                        "({key}) is already set to ({existing}), feature ({}) wants ({value})",
                        feature.name
                    )));
                }
            }
        }
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::env::{DefaultsPolicy, EnvSource, EnvSpec};
    use crate::naming::{Prefix, Region, ServiceName};
    use crate::service::CodeLayout;
    use crate::trigger::InvokeTrigger;

    fn fixed(pairs: &[(&str, &str)]) -> EnvSource {
        EnvSource::Fixed(
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    fn service_with(features: Vec<(InvokeTrigger, &str, EnvSpec)>) -> MicroService {
        let prefix = Prefix::new(Region::UsEast1, "dev").expect("prefix");
        let name = ServiceName::new(prefix, "orders").expect("name");
        let mut service = MicroService::new(name, CodeLayout::new(Path::new("/repo")));
        for (trigger, title, spec) in features {
            service
                .add_feature(trigger, title, Box::new(spec))
                .expect("feature added");
        }
        service
    }

    fn foo(value: &str) -> EnvSpec {
        EnvSpec::new().with_var("FOO").with_source(fixed(&[("FOO", value)]))
    }

    #[test]
    fn feature_report_honours_names_only_and_skip_defaults() {
        let mut spec = EnvSpec::new()
            .with_var("TABLE")
            .with_default("LOG_LEVEL", "info")
            .with_source(fixed(&[("TABLE", "orders")]));

        let names = feature_env_report(
            &mut spec,
            EnvReportOptions {
                names_only: true,
                ..EnvReportOptions::default()
            },
        )
        .expect("names");
        assert_eq!(names.get("TABLE").map(String::as_str), Some(""));
        assert_eq!(names.get("LOG_LEVEL").map(String::as_str), Some(""));

        let values = feature_env_report(
            &mut spec,
            EnvReportOptions {
                skip_defaults: true,
                ..EnvReportOptions::default()
            },
        )
        .expect("values");
        assert!(spec.is_defaults_excluded());
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("TABLE").map(String::as_str), Some("orders"));
    }

    #[test]
    fn names_only_keeps_overridden_defaults_when_skipping_defaults() {
        let options = EnvReportOptions {
            names_only: true,
            skip_defaults: true,
            ..EnvReportOptions::default()
        };
        let mut spec = EnvSpec::new()
            .with_var("TABLE")
            .with_default("LOG_LEVEL", "info")
            .with_default("REGION_HINT", "use1")
            .with_source(fixed(&[("TABLE", "orders"), ("LOG_LEVEL", "debug")]));

        let names = feature_env_report(&mut spec, options).expect("names");
        let values = feature_env_report(
            &mut spec,
            EnvReportOptions {
                names_only: false,
                ..options
            },
        )
        .expect("values");

        assert_eq!(names.keys().collect::<Vec<_>>(), vec!["LOG_LEVEL", "TABLE"]);
        assert!(names.values().all(String::is_empty));
        assert_eq!(
            names.keys().collect::<Vec<_>>(),
            values.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn identical_values_merge_without_conflicts() {
        let mut service = service_with(vec![
            (InvokeTrigger::Apigw, "a", foo("bar")),
            (InvokeTrigger::Sqs, "b", foo("bar")),
        ]);

        let (merged, conflicts) =
            service_env_report(&mut service, EnvReportOptions::default()).expect("report");

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.get("FOO").map(String::as_str), Some("bar"));
        assert!(conflicts.is_empty());
    }

    #[test]
    fn first_writer_wins_and_later_values_are_reported() {
        let mut service = service_with(vec![
            (InvokeTrigger::Apigw, "a", foo("bar")),
            (InvokeTrigger::Sqs, "b", foo("baz")),
        ]);

        let (merged, conflicts) =
            service_env_report(&mut service, EnvReportOptions::default()).expect("report");

        assert_eq!(merged.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(conflicts.len(), 1);
        assert_eq!(
            conflicts
                .get("b")
                .and_then(|envs| envs.get("FOO"))
                .map(String::as_str),
            Some("baz")
        );
    }

    #[test]
    fn conflicts_accumulate_per_feature_and_use_trigger_keys() {
        let spec = EnvSpec::new()
            .with_var("FOO")
            .with_var("BAR")
            .with_source(fixed(&[("FOO", "x"), ("BAR", "y")]));
        let mut service = service_with(vec![
            (
                InvokeTrigger::Apigw,
                "a",
                EnvSpec::new()
                    .with_var("FOO")
                    .with_var("BAR")
                    .with_source(fixed(&[("FOO", "1"), ("BAR", "2")])),
            ),
            (InvokeTrigger::Sqs, "b", spec),
        ]);

        let (_, conflicts) = service_env_report(
            &mut service,
            EnvReportOptions {
                with_trigger: true,
                ..EnvReportOptions::default()
            },
        )
        .expect("report");

        let envs = conflicts.get("sqs_b").expect("keyed with trigger");
        assert_eq!(envs.len(), 2);
        assert_eq!(envs.get("FOO").map(String::as_str), Some("x"));
        assert_eq!(envs.get("BAR").map(String::as_str), Some("y"));
    }

    #[test]
    fn empty_service_reports_empty_maps() {
        let mut service = service_with(Vec::new());
        let (merged, conflicts) =
            service_env_report(&mut service, EnvReportOptions::default()).expect("report");
        assert!(merged.is_empty());
        assert!(conflicts.is_empty());
    }

    #[test]
    fn collect_service_params_rejects_disagreeing_features() {
        let agreeing = service_with(vec![
            (InvokeTrigger::Apigw, "a", foo("bar")),
            (InvokeTrigger::Sqs, "b", foo("bar")),
        ]);
        let params = collect_service_params(&agreeing, "use1-dev-orders").expect("collects");
        assert_eq!(
            params.get("/use1-dev-orders/FOO").map(String::as_str),
            Some("bar")
        );

        let disagreeing = service_with(vec![
            (InvokeTrigger::Apigw, "a", foo("bar")),
            (InvokeTrigger::Sqs, "b", foo("baz")),
        ]);
        let error =
            collect_service_params(&disagreeing, "use1-dev-orders").expect_err("conflict");
        assert!(error.is_conflict());
    }
}
