//! Parameter store client.
//!
//! [`Client`] hides backend pagination and separates "absent" from "failed":
//! a missing parameter is a `NotFound` failure, any other backend problem is
//! a `System` failure, and an empty string is a legitimate value. Every key
//! is normalized to a leading `/` before it reaches the backend.
//!
//! `put` reads the current value before writing. The read and the write are
//! two separate backend calls, so a concurrent external writer can slip in
//! between them. That is acceptable for a single operator and nothing here
//! tries to lock around it.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::env::EnvMap;
use crate::failure::{Failure, FailureContext, FailureSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParameterType {
    String,
    SecureString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRequest {
    pub path: String,
    pub recursive: bool,
    pub with_decryption: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterPage {
    pub parameters: Vec<Parameter>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutput {
    pub parameters: Vec<Parameter>,
    pub invalid: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRequest {
    pub name: String,
    pub value: String,
    pub kind: ParameterType,
    pub overwrite: bool,
}

/// Storage the client talks to. Implementations report an absent parameter
/// as a `NotFound` failure and everything else as `System`.
#[async_trait]
pub trait ParameterBackend: Send + Sync {
    async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<String, Failure>;

    /// One page of parameters under `request.path`.
    async fn get_parameters_by_path(
        &self,
        request: &PathRequest,
        next_token: Option<String>,
    ) -> Result<ParameterPage, Failure>;

    async fn get_parameters(
        &self,
        names: &[String],
        with_decryption: bool,
    ) -> Result<BatchOutput, Failure>;

    async fn delete_parameter(&self, name: &str) -> Result<(), Failure>;

    async fn put_parameter(&self, request: &PutRequest) -> Result<(), Failure>;

    /// Pager used by [`Client::path`]. The default follows `next_token`.
    fn path_pager(&self, request: PathRequest) -> Box<dyn PathPager + '_>
    where
        Self: Sized,
    {
        Box::new(TokenPager::new(self, request))
    }
}

#[async_trait]
pub trait PathPager: Send {
    fn has_more_pages(&self) -> bool;

    async fn next_page(&mut self) -> Result<ParameterPage, Failure>;
}

/// Follows the backend's continuation token until it runs out. A failed
/// page ends paging, since there is no token to continue from.
pub struct TokenPager<'a, B: ParameterBackend + ?Sized> {
    backend: &'a B,
    request: PathRequest,
    next_token: Option<String>,
    done: bool,
}

impl<'a, B: ParameterBackend + ?Sized> TokenPager<'a, B> {
    pub fn new(backend: &'a B, request: PathRequest) -> Self {
        Self {
            backend,
            request,
            next_token: None,
            done: false,
        }
    }
}

#[async_trait]
impl<'a, B: ParameterBackend + ?Sized> PathPager for TokenPager<'a, B> {
    fn has_more_pages(&self) -> bool {
        !self.done
    }

    async fn next_page(&mut self) -> Result<ParameterPage, Failure> {
        let page = self
            .backend
            .get_parameters_by_path(&self.request, self.next_token.take())
            .await;
        match &page {
            Ok(page) if page.next_token.as_deref().is_some_and(|token| !token.is_empty()) => {
                self.next_token = page.next_token.clone();
            }
            _ => self.done = true,
        }
        page
    }
}

/// Values gathered by a batch operation together with the errors it
/// collected along the way.
#[derive(Debug, Default)]
pub struct PartialResult {
    pub values: EnvMap,
    pub failure: Option<Failure>,
}

impl PartialResult {
    pub fn into_result(self) -> Result<EnvMap, Failure> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.values),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    pub values: EnvMap,
    /// Keys the backend could not resolve.
    pub invalid: Vec<String>,
}

/// Prepends `/` unless the key already starts with one.
pub fn ensure_path_prefix(key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{key}")
    }
}

/// Drains `pager`, merging every page. Failed pages are collected and
/// paging carries on with whatever the pager offers next.
pub async fn resolve_path_pages(pager: &mut dyn PathPager) -> PartialResult {
    let mut values = EnvMap::new();
    let mut failures = FailureSet::new();

    while pager.has_more_pages() {
        match pager.next_page().await {
            Ok(page) => {
                for parameter in page.parameters {
                    values.insert(parameter.name, parameter.value);
                }
            }
            Err(failure) => failures.push(failure.wrap("next_page failed")),
        }
    }

    PartialResult {
        values,
        failure: failures.into_failure(),
    }
}

pub struct Client<B> {
    backend: B,
    encrypted: bool,
}

impl<B: ParameterBackend> Client<B> {
    pub fn new(backend: B, encrypted: bool) -> Self {
        Self { backend, encrypted }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn set_encryption(&mut self, value: bool) {
        self.encrypted = value;
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn ensure_path_prefix(&self, key: &str) -> String {
        ensure_path_prefix(key)
    }

    fn normalize(&self, key: &str) -> Result<String, Failure> {
        if key.trim().is_empty() {
            return Err(Failure::invalid_param("key is empty, a non empty key is required"));
        }
        Ok(ensure_path_prefix(key))
    }

    pub async fn param(&self, key: &str) -> Result<String, Failure> {
        let key = self.normalize(key)?;
        self.backend
            .get_parameter(&key, self.encrypted)
            .await
            .wrap_err_with(|| format!("get_parameter failed ({key})"))
    }

    /// Looks up each key on its own; failures are gathered rather than
    /// stopping at the first one.
    pub async fn params(&self, keys: &[String]) -> PartialResult {
        let mut values = EnvMap::new();
        let mut failures = FailureSet::new();

        for key in keys {
            match self.param(key).await {
                Ok(value) => {
                    values.insert(ensure_path_prefix(key), value);
                }
                Err(failure) => failures.push(failure.wrap("param failed")),
            }
        }

        PartialResult {
            values,
            failure: failures.into_failure(),
        }
    }

    pub async fn path(&self, prefix: &str, recursive: bool) -> PartialResult {
        let path = match self.normalize(prefix) {
            Ok(path) => path,
            Err(failure) => {
                return PartialResult {
                    values: EnvMap::new(),
                    failure: Some(failure.wrap("path is empty")),
                }
            }
        };

        let request = PathRequest {
            path,
            recursive,
            with_decryption: self.encrypted,
        };
        let mut pager = self.backend.path_pager(request);
        let mut result = resolve_path_pages(pager.as_mut()).await;
        result.failure = result
            .failure
            .map(|failure| failure.wrap("resolve_path_pages failed"));
        result
    }

    pub async fn collect(&self, keys: &[String]) -> Result<Collection, Failure> {
        if keys.is_empty() {
            return Err(Failure::invalid_param("keys must have at least one key"));
        }
        let names = keys
            .iter()
            .map(|key| self.normalize(key))
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .backend
            .get_parameters(&names, self.encrypted)
            .await
            .wrap_err_with(|| format!("get_parameters failed ({})", names.join(", ")))?;

        Ok(Collection {
            values: output
                .parameters
                .into_iter()
                .map(|parameter| (parameter.name, parameter.value))
                .collect(),
            invalid: output
                .invalid
                .into_iter()
                .filter(|name| !name.is_empty())
                .collect(),
        })
    }

    /// Removes `key` and returns the value it held. Absent keys fail with
    /// `NotFound` and nothing is deleted.
    pub async fn delete(&self, key: &str) -> Result<String, Failure> {
        let key = self.normalize(key)?;
        let old = self.param(&key).await.wrap_err("delete needs the current value")?;

        self.backend
            .delete_parameter(&key)
            .await
            .wrap_err_with(|| format!("delete_parameter failed ({key})"))?;
        debug!(key = %key, "parameter deleted");
        Ok(old)
    }

    /// Writes `value` unless it is already stored. Returns the previous value
    /// when there was one. A differing existing value is only replaced with
    /// `overwrite`; otherwise the call fails with `Conflict` and writes
    /// nothing.
    pub async fn put(
        &self,
        key: &str,
        value: &str,
        overwrite: bool,
    ) -> Result<Option<String>, Failure> {
        let key = self.normalize(key)?;
        let old = match self.param(&key).await {
            Ok(old) => Some(old),
            Err(failure) if failure.is_not_found() => None,
            Err(failure) => return Err(failure.wrap("put needs the current value")),
        };

        if old.as_deref() == Some(value) {
            return Ok(old);
        }
        if old.is_some() && !overwrite {
            return Err(Failure::conflict(format!(
                "param ({key}) exists but overwrite is false"
            )));
        }

        let request = PutRequest {
            name: key.clone(),
            value: value.to_string(),
            kind: if self.encrypted {
                ParameterType::SecureString
            } else {
                ParameterType::String
            },
            overwrite,
        };
        self.backend
            .put_parameter(&request)
            .await
            .wrap_err_with(|| format!("put_parameter failed ({key})"))?;
        debug!(key = %key, replaced = old.is_some(), "parameter written");
        Ok(old)
    }
}
