//! Environment configuration capabilities of a feature.
//!
//! A feature's configuration is inspected through three narrow capabilities:
//! [`EnvReporter`] lists and resolves the environment variables it reads,
//! [`ParamCollector`] turns resolved values into parameter store paths, and
//! [`DefaultsPolicy`] decides whether declared defaults count as values.
//! [`Configurable`] is implemented for anything that has all three.
//!
//! [`EnvSpec`] is the declarative implementation used by discovered features:
//! a list of variables with optional defaults, read from a feature's
//! `env.json` manifest.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::failure::Failure;

pub type EnvMap = BTreeMap<String, String>;

pub trait EnvReporter {
    fn env_names(&self) -> Result<Vec<String>, Failure>;

    fn env_to_map(&self) -> Result<EnvMap, Failure>;
}

pub trait ParamCollector {
    /// Resolved values keyed by their parameter path `/<app_title>/<NAME>`.
    fn collect_params_from_env(&self, app_title: &str) -> Result<EnvMap, Failure>;
}

pub trait DefaultsPolicy {
    fn set_exclude_defaults(&mut self, value: bool);

    fn is_defaults_excluded(&self) -> bool;

    fn mark_defaults_as_excluded(&mut self) {
        self.set_exclude_defaults(true);
    }

    fn mark_defaults_as_included(&mut self) {
        self.set_exclude_defaults(false);
    }
}

pub trait Configurable: EnvReporter + ParamCollector + DefaultsPolicy + Send + Sync {}

impl<T> Configurable for T where T: EnvReporter + ParamCollector + DefaultsPolicy + Send + Sync {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl EnvVar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// Where an [`EnvSpec`] reads values from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EnvSource {
    #[default]
    Process,
    Fixed(EnvMap),
}

impl EnvSource {
    fn lookup(&self, name: &str) -> Option<String> {
        match self {
            Self::Process => std::env::var(name).ok(),
            Self::Fixed(values) => values.get(name).cloned(),
        }
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvSpec {
    /// Prepended to each variable name when reading the environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub vars: Vec<EnvVar>,
    #[serde(skip)]
    source: EnvSource,
    #[serde(skip)]
    exclude_defaults: bool,
}

impl fmt::Debug for EnvSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvSpec")
            .field("prefix", &self.prefix)
            .field("vars", &self.vars)
            .field("exclude_defaults", &self.exclude_defaults)
            .finish()
    }
}

impl EnvSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, name: impl Into<String>) -> Self {
        self.vars.push(EnvVar::new(name));
        self
    }

    pub fn with_default(mut self, name: impl Into<String>, default: impl Into<String>) -> Self {
        self.vars.push(EnvVar::with_default(name, default));
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_source(mut self, source: EnvSource) -> Self {
        self.source = source;
        self
    }

    pub fn set_source(&mut self, source: EnvSource) {
        self.source = source;
    }

    pub fn from_json_str(raw: &str) -> Result<Self, Failure> {
        serde_json::from_str(raw)
            .map_err(|error| Failure::to_system(error, "env manifest is not valid json"))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, Failure> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            Failure::to_system(error, format!("failed to read {}", path.display()))
        })?;
        Self::from_json_str(&raw).map_err(|failure| failure.wrap(path.display()))
    }

    pub fn env_name(&self, var: &EnvVar) -> String {
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}_{}", var.name),
            _ => var.name.clone(),
        }
    }

    /// Environment value first, then the default unless defaults are excluded.
    fn resolve(&self, var: &EnvVar) -> Option<String> {
        let name = self.env_name(var);
        if let Some(value) = self.source.lookup(&name) {
            return Some(value);
        }
        if self.exclude_defaults {
            return None;
        }
        var.default.clone()
    }

    fn duplicate_check(&self) -> Result<(), Failure> {
        let mut seen = BTreeSet::new();
        for var in &self.vars {
            if var.name.trim().is_empty() {
                return Err(Failure::config("env var name is empty"));
            }
            if !seen.insert(self.env_name(var)) {
                return Err(Failure::config(format!(
                    "env var ({}) is declared more than once",
                    var.name
                )));
            }
        }
        Ok(())
    }
}

impl EnvReporter for EnvSpec {
    /// Same names, in declaration order, as the keys of [`Self::env_to_map`].
    fn env_names(&self) -> Result<Vec<String>, Failure> {
        self.duplicate_check()?;
        Ok(self
            .vars
            .iter()
            .filter(|var| {
                !(self.exclude_defaults && var.default.is_some()) || self.resolve(var).is_some()
            })
            .map(|var| self.env_name(var))
            .collect())
    }

    fn env_to_map(&self) -> Result<EnvMap, Failure> {
        self.duplicate_check()?;
        let mut out = EnvMap::new();
        for var in &self.vars {
            let name = self.env_name(var);
            match self.resolve(var) {
                Some(value) => {
                    out.insert(name, value);
                }
                None if self.exclude_defaults && var.default.is_some() => {}
                None => {
                    out.insert(name, String::new());
                }
            }
        }
        Ok(out)
    }
}

impl ParamCollector for EnvSpec {
    fn collect_params_from_env(&self, app_title: &str) -> Result<EnvMap, Failure> {
        let app = app_title.trim_matches('/');
        if app.is_empty() {
            return Err(Failure::invalid_param("app title is empty"));
        }

        self.duplicate_check()?;
        let mut out = EnvMap::new();
        for var in &self.vars {
            if let Some(value) = self.resolve(var) {
                out.insert(format!("/{app}/{}", self.env_name(var)), value);
            }
        }
        Ok(out)
    }
}

impl DefaultsPolicy for EnvSpec {
    fn set_exclude_defaults(&mut self, value: bool) {
        self.exclude_defaults = value;
    }

    fn is_defaults_excluded(&self) -> bool {
        self.exclude_defaults
    }
}
