//! Request-scoped invocation context.
//!
//! An [`Invocation`] is built by a trigger adapter when an event arrives and is
//! passed by value down to the runner and handler. It owns the tracing span
//! that carries the per-request fields, so every event logged while the
//! handler runs is tagged with them. It is dropped when the request ends.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::Span;

use crate::trigger::InvokeTrigger;

#[derive(Debug, Clone, Default)]
pub struct InvocationMeta {
    pub request_id: String,
    pub trace_id: String,
    pub function_name: String,
    pub function_version: String,
    pub invoked_function_arn: String,
    pub trigger: Option<InvokeTrigger>,
    pub deadline: Option<Instant>,
    pub user_id: Option<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    meta: InvocationMeta,
    span: Span,
}

impl Invocation {
    pub fn new(meta: InvocationMeta) -> Self {
        let span = tracing::info_span!(
            "invocation",
            function_name = %meta.function_name,
            function_version = %meta.function_version,
            request_id = %meta.request_id,
            amzn_trace_id = %meta.trace_id,
            invoke_function_arn = %meta.invoked_function_arn,
            invocation_type = meta.trigger.map(InvokeTrigger::as_str).unwrap_or(""),
        );
        Self { meta, span }
    }

    /// Replace the span, typically with a trigger-specific child of the
    /// default one that records request fields.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Records the caller resolved by the trigger adapter. The span is kept.
    pub fn with_identity(mut self, user_id: Option<String>, roles: Vec<String>) -> Self {
        self.meta.user_id = user_id;
        self.meta.roles = roles;
        self
    }

    pub fn meta(&self) -> &InvocationMeta {
        &self.meta
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.meta.deadline
    }

    pub fn request_id(&self) -> &str {
        &self.meta.request_id
    }

    pub fn trace_id(&self) -> &str {
        &self.meta.trace_id
    }
}

/// Converts the runtime's wall-clock deadline (milliseconds since the Unix
/// epoch) into a monotonic instant. Zero means the runtime gave no deadline.
pub fn deadline_from_epoch_millis(deadline_ms: u64) -> Option<Instant> {
    if deadline_ms == 0 {
        return None;
    }

    let now_wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    let deadline_wall = Duration::from_millis(deadline_ms);
    let now = Instant::now();

    match deadline_wall.checked_sub(now_wall) {
        Some(remaining) => Some(now + remaining),
        None => Some(now),
    }
}

/// Extracts the root trace id from an X-Ray header such as
/// `Root=1-5abc5ca4-f07ab5d0a2c2b2f0730acb08;Parent=200406d9510e71a3;Sampled=0`.
pub fn parse_trace_id(header: &str) -> String {
    header
        .split(';')
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| key.trim() == "Root")
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_default()
}
