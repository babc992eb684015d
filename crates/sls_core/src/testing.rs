//! In-memory backends for tests of code built on this crate.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::deploy::{CodePayload, DeploymentBackend, FeatureSettings, FeatureUpdateReport};
use crate::failure::Failure;
use crate::pstore::{
    BatchOutput, Parameter, ParameterBackend, ParameterPage, PathPager, PathRequest, PutRequest,
};

type ScriptedPage = Result<Vec<(String, String)>, String>;

#[derive(Default)]
struct MemoryState {
    values: BTreeMap<String, String>,
    puts: Vec<PutRequest>,
    deletes: Vec<String>,
    path_calls: usize,
    page_size: Option<usize>,
    get_error: Option<String>,
    put_error: Option<String>,
    scripted_pages: Option<Vec<ScriptedPage>>,
}

/// Parameter backend over a map. Writes and deletes are recorded so tests
/// can assert which backend calls happened.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<'a>(values: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let backend = Self::new();
        for (key, value) in values {
            backend.insert(key, value);
        }
        backend
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("poisoned mutex")
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.state().values.insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.state().values.get(key).cloned()
    }

    pub fn puts(&self) -> Vec<PutRequest> {
        self.state().puts.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state().deletes.clone()
    }

    pub fn path_calls(&self) -> usize {
        self.state().path_calls
    }

    /// Splits path results into pages of `size`, linked by a token.
    pub fn set_page_size(&self, size: usize) {
        self.state().page_size = Some(size.max(1));
    }

    pub fn fail_gets(&self, message: &str) {
        self.state().get_error = Some(message.to_string());
    }

    pub fn fail_puts(&self, message: &str) {
        self.state().put_error = Some(message.to_string());
    }

    /// Replaces path lookups with a fixed sequence of pages, each either a
    /// list of parameters or an error. Every page is served, failed or not.
    pub fn script_pages(&self, pages: Vec<Result<Vec<(&str, &str)>, &str>>) {
        let pages = pages
            .into_iter()
            .map(|page| {
                page.map(|parameters| {
                    parameters
                        .into_iter()
                        .map(|(name, value)| (name.to_string(), value.to_string()))
                        .collect()
                })
                .map_err(str::to_string)
            })
            .collect();
        self.state().scripted_pages = Some(pages);
    }
}

fn under_path(key: &str, request: &PathRequest) -> bool {
    let root = request.path.trim_end_matches('/');
    let Some(rest) = key.strip_prefix(root).and_then(|rest| rest.strip_prefix('/')) else {
        return false;
    };
    request.recursive || !rest.contains('/')
}

#[async_trait]
impl ParameterBackend for MemoryBackend {
    async fn get_parameter(&self, name: &str, _with_decryption: bool) -> Result<String, Failure> {
        let state = self.state();
        if let Some(message) = &state.get_error {
            return Err(Failure::system(message.clone()));
        }
        state
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| Failure::not_found(format!("parameter ({name})")))
    }

    async fn get_parameters_by_path(
        &self,
        request: &PathRequest,
        next_token: Option<String>,
    ) -> Result<ParameterPage, Failure> {
        let mut state = self.state();
        state.path_calls += 1;

        let matching: Vec<Parameter> = state
            .values
            .iter()
            .filter(|(key, _)| under_path(key, request))
            .map(|(name, value)| Parameter {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();

        let Some(page_size) = state.page_size else {
            return Ok(ParameterPage {
                parameters: matching,
                next_token: None,
            });
        };

        let start = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Failure::system(format!("invalid next token ({token})")))?,
            None => 0,
        };
        let end = (start + page_size).min(matching.len());
        Ok(ParameterPage {
            parameters: matching.get(start..end).map(<[_]>::to_vec).unwrap_or_default(),
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn get_parameters(
        &self,
        names: &[String],
        _with_decryption: bool,
    ) -> Result<BatchOutput, Failure> {
        let state = self.state();
        if let Some(message) = &state.get_error {
            return Err(Failure::system(message.clone()));
        }

        let mut output = BatchOutput::default();
        for name in names {
            match state.values.get(name) {
                Some(value) => output.parameters.push(Parameter {
                    name: name.clone(),
                    value: value.clone(),
                }),
                None => output.invalid.push(name.clone()),
            }
        }
        Ok(output)
    }

    async fn delete_parameter(&self, name: &str) -> Result<(), Failure> {
        let mut state = self.state();
        state.deletes.push(name.to_string());
        match state.values.remove(name) {
            Some(_) => Ok(()),
            None => Err(Failure::not_found(format!("parameter ({name})"))),
        }
    }

    async fn put_parameter(&self, request: &PutRequest) -> Result<(), Failure> {
        let mut state = self.state();
        if let Some(message) = &state.put_error {
            return Err(Failure::system(message.clone()));
        }
        if !request.overwrite && state.values.contains_key(&request.name) {
            return Err(Failure::conflict(format!(
                "parameter ({}) already exists",
                request.name
            )));
        }

        state.puts.push(request.clone());
        state
            .values
            .insert(request.name.clone(), request.value.clone());
        Ok(())
    }

    fn path_pager(&self, request: PathRequest) -> Box<dyn PathPager + '_> {
        let scripted = self.state().scripted_pages.clone();
        match scripted {
            Some(pages) => Box::new(ScriptedPager {
                pages: pages.into_iter().rev().collect(),
            }),
            None => Box::new(crate::pstore::TokenPager::new(self, request)),
        }
    }
}

struct ScriptedPager {
    /// Remaining pages, last page first.
    pages: Vec<ScriptedPage>,
}

#[async_trait]
impl PathPager for ScriptedPager {
    fn has_more_pages(&self) -> bool {
        !self.pages.is_empty()
    }

    async fn next_page(&mut self) -> Result<ParameterPage, Failure> {
        match self.pages.pop() {
            Some(Ok(parameters)) => Ok(ParameterPage {
                parameters: parameters
                    .into_iter()
                    .map(|(name, value)| Parameter { name, value })
                    .collect(),
                next_token: None,
            }),
            Some(Err(message)) => Err(Failure::system(message)),
            None => Err(Failure::invalid_state("no pages left")),
        }
    }
}

/// Deployment backend that records every request it receives.
#[derive(Default)]
pub struct RecordingDeployer {
    payloads: Mutex<Vec<CodePayload>>,
    configs: Mutex<Vec<FeatureSettings>>,
}

impl RecordingDeployer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> Vec<CodePayload> {
        self.payloads.lock().expect("poisoned mutex").clone()
    }

    pub fn configs(&self) -> Vec<FeatureSettings> {
        self.configs.lock().expect("poisoned mutex").clone()
    }
}

#[async_trait]
impl DeploymentBackend for RecordingDeployer {
    async fn update_code(&self, payload: CodePayload) -> Result<FeatureUpdateReport, Failure> {
        let report = FeatureUpdateReport {
            lambda_name: payload.qualified_name.clone(),
            code_size: payload.zip_file.len() as i64,
            last_update_status: "InProgress".to_string(),
            ..FeatureUpdateReport::default()
        };
        self.payloads.lock().expect("poisoned mutex").push(payload);
        Ok(report)
    }

    async fn update_config(
        &self,
        settings: FeatureSettings,
    ) -> Result<FeatureUpdateReport, Failure> {
        let report = FeatureUpdateReport {
            lambda_name: settings.qualified_name.clone(),
            last_update_status: "InProgress".to_string(),
            ..FeatureUpdateReport::default()
        };
        self.configs.lock().expect("poisoned mutex").push(settings);
        Ok(report)
    }
}
