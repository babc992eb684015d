//! Microservice registry: the set of lambda features a service deploys and
//! where their code lives on disk.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::env::{Configurable, EnvSpec};
use crate::failure::{Failure, FailureContext};
use crate::naming::ServiceName;
use crate::trigger::InvokeTrigger;

pub const DEFAULT_BINARY_NAME: &str = "bootstrap";
pub const DEFAULT_ZIP_NAME: &str = "deployment.zip";
pub const DEFAULT_APP_DIR: &str = "app";
pub const DEFAULT_LAMBDAS_DIR: &str = "lambdas";
pub const DEFAULT_INFRA_DIR: &str = "infra";
pub const DEFAULT_BUILD_DIR: &str = "build";
/// Marks a directory under `app/lambdas/<trigger>/` as a feature.
pub const FEATURE_MANIFEST_FILE: &str = "Cargo.toml";
/// Optional per-feature list of environment variables.
pub const ENV_MANIFEST_FILE: &str = "env.json";

/// Directory layout of a service repository:
/// `<root>/app/lambdas/<trigger>/<feature>` for code and
/// `<root>/infra/build` for artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLayout {
    pub root: PathBuf,
    pub app: String,
    pub lambdas: String,
    pub infra: String,
    pub build: String,
}

impl CodeLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            app: DEFAULT_APP_DIR.to_string(),
            lambdas: DEFAULT_LAMBDAS_DIR.to_string(),
            infra: DEFAULT_INFRA_DIR.to_string(),
            build: DEFAULT_BUILD_DIR.to_string(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    pub fn app_dir(&self) -> PathBuf {
        self.root.join(&self.app)
    }

    pub fn lambdas_dir(&self) -> PathBuf {
        self.app_dir().join(&self.lambdas)
    }

    pub fn trigger_dir(&self, trigger: InvokeTrigger) -> PathBuf {
        self.lambdas_dir().join(trigger.as_str())
    }

    pub fn infra_dir(&self) -> PathBuf {
        self.root.join(&self.infra)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.infra_dir().join(&self.build)
    }
}

pub struct Feature {
    pub name: String,
    pub qualified_name: String,
    pub trigger: InvokeTrigger,
    pub binary_name: String,
    pub zip_name: String,
    conf: Box<dyn Configurable>,
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("name", &self.name)
            .field("qualified_name", &self.qualified_name)
            .field("trigger", &self.trigger)
            .field("binary_name", &self.binary_name)
            .field("zip_name", &self.zip_name)
            .finish_non_exhaustive()
    }
}

impl Feature {
    /// `<trigger>_<name>`, the form accepted on the command line when names
    /// include their trigger.
    pub fn name_with_trigger(&self) -> String {
        format!("{}_{}", self.trigger, self.name)
    }

    /// Path of the feature's code relative to the lambdas directory.
    pub fn code_dir(&self) -> PathBuf {
        Path::new(self.trigger.as_str()).join(&self.name)
    }

    pub fn conf(&self) -> &dyn Configurable {
        self.conf.as_ref()
    }

    pub fn conf_mut(&mut self) -> &mut dyn Configurable {
        self.conf.as_mut()
    }
}

pub struct MicroService {
    name: ServiceName,
    layout: CodeLayout,
    features: BTreeMap<String, Feature>,
}

impl fmt::Debug for MicroService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicroService")
            .field("name", &self.name.qualified_name())
            .field("layout", &self.layout)
            .field("features", &self.features.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MicroService {
    pub fn new(name: ServiceName, layout: CodeLayout) -> Self {
        Self {
            name,
            layout,
            features: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn layout(&self) -> &CodeLayout {
        &self.layout
    }

    pub fn app_title(&self) -> String {
        self.name.app_title()
    }

    /// Registers a feature under its title. Titles are unique across
    /// triggers.
    pub fn add_feature(
        &mut self,
        trigger: InvokeTrigger,
        title: &str,
        conf: Box<dyn Configurable>,
    ) -> Result<&mut Feature, Failure> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Failure::invalid_param("feature title is empty"));
        }
        if let Some(existing) = self.features.get(title) {
            return Err(Failure::conflict(format!(
                "feature ({title}) is already registered under trigger ({})",
                existing.trigger
            )));
        }

        let feature = Feature {
            name: title.to_string(),
            qualified_name: format!("{}-{}_{}", self.name.qualified_name(), trigger, title),
            trigger,
            binary_name: DEFAULT_BINARY_NAME.to_string(),
            zip_name: DEFAULT_ZIP_NAME.to_string(),
            conf,
        };
        Ok(self.features.entry(title.to_string()).or_insert(feature))
    }

    pub fn feature(&self, title: &str) -> Result<&Feature, Failure> {
        self.features
            .get(title)
            .ok_or_else(|| Failure::not_found(format!("feature ({title})")))
    }

    pub fn feature_mut(&mut self, title: &str) -> Result<&mut Feature, Failure> {
        self.features
            .get_mut(title)
            .ok_or_else(|| Failure::not_found(format!("feature ({title})")))
    }

    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    pub fn features_mut(&mut self) -> impl Iterator<Item = &mut Feature> {
        self.features.values_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Maps a user-supplied feature name to a registered title. When
    /// `name_includes_trigger` is set, `<trigger>_<name>` is accepted as well
    /// and the trigger part must be a known trigger.
    pub fn resolve_feature(
        &self,
        name: &str,
        name_includes_trigger: bool,
    ) -> Result<String, Failure> {
        let lookup = match self.feature(name) {
            Ok(feature) => return Ok(feature.name.clone()),
            Err(failure) => failure.wrap(format!("feature lookup failed for ({name})")),
        };
        if !name_includes_trigger {
            return Err(lookup);
        }

        let Some((trigger, title)) = name.split_once('_') else {
            return Err(lookup.wrap("invalid format, should be (<trigger>_<feature>)"));
        };
        let trigger: InvokeTrigger = trigger.parse().wrap_err("trigger prefix is not valid")?;

        let feature = self.feature(title).wrap_err_with(|| {
            format!("feature lookup failed with trigger taken into account ({trigger}, {title})")
        })?;
        if feature.trigger != trigger {
            return Err(Failure::not_found(format!(
                "feature ({title}) is registered under trigger ({}), not ({trigger})",
                feature.trigger
            )));
        }
        Ok(feature.name.clone())
    }

    /// Scans `app/lambdas/<trigger>/<feature>/` and registers every feature
    /// directory that holds a `Cargo.toml`. An `env.json` next to it becomes
    /// the feature's configuration; without one the feature declares no
    /// variables. Directories are visited in name order.
    pub fn load_features_from_filesystem(&mut self) -> Result<(), Failure> {
        let lambdas_dir = self.layout.lambdas_dir();
        for trigger_dir in sorted_dirs(&lambdas_dir)? {
            let trigger_name = dir_name(&trigger_dir);
            let trigger: InvokeTrigger = trigger_name
                .parse()
                .wrap_err("invalid lambda trigger directory")?;

            for feature_dir in sorted_dirs(&trigger_dir)? {
                if !feature_dir.join(FEATURE_MANIFEST_FILE).is_file() {
                    continue;
                }

                let env_manifest = feature_dir.join(ENV_MANIFEST_FILE);
                let conf = if env_manifest.is_file() {
                    EnvSpec::from_json_file(&env_manifest)?
                } else {
                    EnvSpec::new()
                };

                let title = dir_name(&feature_dir);
                debug!(trigger = %trigger, feature = %title, "discovered feature");
                self.add_feature(trigger, &title, Box::new(conf))
                    .wrap_err("add_feature failed")?;
            }
        }
        Ok(())
    }
}

fn sorted_dirs(dir: &Path) -> Result<Vec<PathBuf>, Failure> {
    let entries = std::fs::read_dir(dir).map_err(|error| {
        Failure::to_system(error, format!("read_dir failed for {}", dir.display()))
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|error| Failure::to_system(error, "read_dir entry failed"))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::env::EnvReporter;
    use crate::naming::{Prefix, Region};

    fn service(root: &Path) -> MicroService {
        let prefix = Prefix::new(Region::UsEast1, "dev").expect("prefix");
        let name = ServiceName::new(prefix, "orders").expect("name");
        MicroService::new(name, CodeLayout::new(root))
    }

    fn write_feature(root: &Path, trigger: &str, name: &str, env_json: Option<&str>) {
        let dir = root.join("app/lambdas").join(trigger).join(name);
        fs::create_dir_all(&dir).expect("create feature dir");
        fs::write(dir.join("Cargo.toml"), "[package]\nname = \"x\"\n").expect("write manifest");
        if let Some(env_json) = env_json {
            fs::write(dir.join("env.json"), env_json).expect("write env manifest");
        }
    }

    #[test]
    fn layout_paths_follow_conventions() {
        let layout = CodeLayout::new("/repo");
        assert_eq!(layout.lambdas_dir(), PathBuf::from("/repo/app/lambdas"));
        assert_eq!(
            layout.trigger_dir(InvokeTrigger::Apigw),
            PathBuf::from("/repo/app/lambdas/apigw")
        );
        assert_eq!(layout.build_dir(), PathBuf::from("/repo/infra/build"));
    }

    #[test]
    fn add_feature_derives_qualified_name() {
        let mut service = service(Path::new("/repo"));
        let feature = service
            .add_feature(InvokeTrigger::Apigw, "create_order", Box::new(EnvSpec::new()))
            .expect("added");

        assert_eq!(feature.qualified_name, "use1-dev-orders-apigw_create_order");
        assert_eq!(feature.name_with_trigger(), "apigw_create_order");
        assert_eq!(feature.binary_name, DEFAULT_BINARY_NAME);
        assert_eq!(feature.code_dir(), PathBuf::from("apigw/create_order"));
    }

    #[test]
    fn duplicate_titles_conflict() {
        let mut service = service(Path::new("/repo"));
        service
            .add_feature(InvokeTrigger::Apigw, "sync", Box::new(EnvSpec::new()))
            .expect("first");
        let error = service
            .add_feature(InvokeTrigger::Sqs, "sync", Box::new(EnvSpec::new()))
            .expect_err("duplicate");
        assert!(error.is_conflict());
    }

    #[test]
    fn resolves_trigger_qualified_names_only_when_enabled() {
        let mut service = service(Path::new("/repo"));
        service
            .add_feature(InvokeTrigger::Apigw, "create_order", Box::new(EnvSpec::new()))
            .expect("added");

        assert_eq!(
            service.resolve_feature("create_order", false).expect("plain"),
            "create_order"
        );
        assert!(service
            .resolve_feature("apigw_create_order", false)
            .expect_err("trigger names disabled")
            .is_not_found());
        assert_eq!(
            service
                .resolve_feature("apigw_create_order", true)
                .expect("trigger qualified"),
            "create_order"
        );
        assert!(service.resolve_feature("sqs_create_order", true).is_err());
        assert!(service.resolve_feature("bogus_create_order", true).is_err());
    }

    #[test]
    fn loads_features_from_filesystem() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_feature(dir.path(), "apigw", "health", None);
        write_feature(
            dir.path(),
            "cognito",
            "pre_signup",
            Some(r#"{"vars":[{"name":"POOL_ID"},{"name":"LOG_LEVEL","default":"info"}]}"#),
        );
        fs::create_dir_all(dir.path().join("app/lambdas/apigw/notes")).expect("non-feature dir");

        let mut service = service(dir.path());
        service.load_features_from_filesystem().expect("loads");

        let titles: Vec<&str> = service.features().map(|feature| feature.name.as_str()).collect();
        assert_eq!(titles, vec!["health", "pre_signup"]);

        let signup = service.feature("pre_signup").expect("present");
        assert_eq!(signup.trigger, InvokeTrigger::Cognito);
        assert_eq!(
            signup.conf().env_names().expect("names"),
            vec!["POOL_ID".to_string(), "LOG_LEVEL".to_string()]
        );
    }

    #[test]
    fn unknown_trigger_directory_fails_discovery() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_feature(dir.path(), "kinesis", "stream", None);

        let error = service(dir.path())
            .load_features_from_filesystem()
            .expect_err("unknown trigger");
        assert_eq!(error.kind(), crate::failure::FailureKind::Validation);
    }
}
