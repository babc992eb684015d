//! Failure taxonomy shared by every layer of the toolkit.
//!
//! A [`Failure`] always carries a [`FailureKind`]. Wrapping a failure with
//! extra context rewrites the message but never the kind, so callers can keep
//! classifying with `is_not_found`, `is_timeout`, `is_panic` after the error
//! has crossed several layers.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    System,
    Validation,
    InvalidParam,
    InvalidState,
    Config,
    Conflict,
    Timeout,
    Panic,
    Multiple,
    NotAuthorized,
    NotAuthenticated,
    RestApi,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::System => "system",
            Self::Validation => "validation",
            Self::InvalidParam => "invalid_param",
            Self::InvalidState => "invalid_state",
            Self::Config => "config",
            Self::Conflict => "conflict",
            Self::Timeout => "timeout",
            Self::Panic => "panic",
            Self::Multiple => "multiple",
            Self::NotAuthorized => "not_authorized",
            Self::NotAuthenticated => "not_authenticated",
            Self::RestApi => "rest_api",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct Failure {
    kind: FailureKind,
    message: String,
    status: Option<u16>,
    public_message: Option<String>,
    fields: BTreeMap<String, String>,
    errors: Vec<Failure>,
    #[source]
    source: Option<BoxError>,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            public_message: None,
            fields: BTreeMap::new(),
            errors: Vec::new(),
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn system(message: impl Into<String>) -> Self {
        Self::new(FailureKind::System, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidParam, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidState, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Config, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Conflict, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn panic(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Panic, message)
    }

    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotAuthorized, message)
    }

    pub fn not_authenticated(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotAuthenticated, message)
    }

    /// A failure whose HTTP status and client-facing message are chosen by the
    /// handler rather than derived from the kind.
    pub fn rest_api(status: u16, public_message: impl Into<String>) -> Self {
        let public_message = public_message.into();
        let mut failure = Self::new(FailureKind::RestApi, public_message.clone());
        failure.status = Some(status);
        failure.public_message = Some(public_message);
        failure
    }

    /// Aggregate of independent failures collected by a batch operation.
    pub fn multiple(errors: Vec<Failure>) -> Self {
        let summary = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        let mut failure = Self::new(
            FailureKind::Multiple,
            format!("{} error(s) occurred: {summary}", errors.len()),
        );
        failure.errors = errors;
        failure
    }

    /// Classify a foreign error as a system failure, keeping it as the source.
    pub fn to_system(
        source: impl std::error::Error + Send + Sync + 'static,
        context: impl fmt::Display,
    ) -> Self {
        Self::from_source(FailureKind::System, source, context)
    }

    pub fn to_not_found(
        source: impl std::error::Error + Send + Sync + 'static,
        context: impl fmt::Display,
    ) -> Self {
        Self::from_source(FailureKind::NotFound, source, context)
    }

    pub fn from_source(
        kind: FailureKind,
        source: impl std::error::Error + Send + Sync + 'static,
        context: impl fmt::Display,
    ) -> Self {
        let mut failure = Self::new(kind, format!("{context}: {source}"));
        failure.source = Some(Box::new(source));
        failure
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, problem: impl Into<String>) -> Self {
        self.fields.insert(name.into(), problem.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Prefix the message with what was being attempted. The kind is kept.
    pub fn wrap(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{context}: {}", self.message);
        self
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn public_message(&self) -> Option<&str> {
        self.public_message.as_deref()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn errors(&self) -> &[Failure] {
        &self.errors
    }

    pub fn is(&self, kind: FailureKind) -> bool {
        self.kind == kind
    }

    pub fn is_not_found(&self) -> bool {
        self.is(FailureKind::NotFound)
    }

    pub fn is_system(&self) -> bool {
        self.is(FailureKind::System)
    }

    pub fn is_conflict(&self) -> bool {
        self.is(FailureKind::Conflict)
    }

    pub fn is_timeout(&self) -> bool {
        self.is(FailureKind::Timeout)
    }

    pub fn is_panic(&self) -> bool {
        self.is(FailureKind::Panic)
    }

    pub fn is_multiple(&self) -> bool {
        self.is(FailureKind::Multiple)
    }

    pub fn is_rest_api(&self) -> bool {
        self.is(FailureKind::RestApi)
    }
}

/// Adds operation context to `Result<T, Failure>` at layer boundaries.
pub trait FailureContext<T> {
    fn wrap_err(self, context: impl fmt::Display) -> Result<T, Failure>;

    fn wrap_err_with<C, F>(self, context: F) -> Result<T, Failure>
    where
        C: fmt::Display,
        F: FnOnce() -> C;
}

impl<T> FailureContext<T> for Result<T, Failure> {
    fn wrap_err(self, context: impl fmt::Display) -> Result<T, Failure> {
        self.map_err(|failure| failure.wrap(context))
    }

    fn wrap_err_with<C, F>(self, context: F) -> Result<T, Failure>
    where
        C: fmt::Display,
        F: FnOnce() -> C,
    {
        self.map_err(|failure| failure.wrap(context()))
    }
}

/// Accumulator for batch operations that keep going after individual errors.
#[derive(Debug, Default)]
pub struct FailureSet {
    errors: Vec<Failure>,
}

impl FailureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, failure: Failure) {
        self.errors.push(failure);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_failure(self) -> Option<Failure> {
        if self.errors.is_empty() {
            None
        } else {
            Some(Failure::multiple(self.errors))
        }
    }
}
