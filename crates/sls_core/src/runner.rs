//! Bounded-time, panic-safe execution of feature handlers.
//!
//! The handler runs on its own tokio task and its result comes back over a
//! oneshot channel. The caller races that channel against a timer sized to
//! the invocation deadline minus a safety margin. On timeout the task is
//! abandoned, not cancelled: it may keep running, and its late send into the
//! dropped channel fails without blocking. Stopping it early would need a
//! cancellation token handed to the handler.

use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::{error, warn, Instrument, Span};

use crate::failure::Failure;
use crate::invocation::Invocation;

pub const DEFAULT_FEATURE_TIMEOUT_MS: u64 = 100;
pub const FEATURE_TIMEOUT_ENV: &str = "SLS_FEATURE_HANDLER_TIMEOUT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Milliseconds reserved before the platform deadline for the runtime's
    /// own cleanup.
    pub period_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_FEATURE_TIMEOUT_MS,
        }
    }
}

impl TimeoutConfig {
    /// Reads `SLS_FEATURE_HANDLER_TIMEOUT` (`150` or `150ms`). Unset or
    /// unparsable values fall back to the default margin.
    pub fn from_env() -> Self {
        std::env::var(FEATURE_TIMEOUT_ENV)
            .ok()
            .and_then(|raw| parse_millis(&raw))
            .map(|period_ms| Self { period_ms })
            .unwrap_or_default()
    }
}

fn parse_millis(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_suffix("ms").unwrap_or(trimmed).trim();
    digits.parse().ok()
}

#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    margin: Duration,
}

impl Default for Timeout {
    fn default() -> Self {
        Self::new(TimeoutConfig::default())
    }
}

impl Timeout {
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            margin: Duration::from_millis(config.period_ms),
        }
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    /// Time the handler may use, or `None` when the deadline is already
    /// inside the safety margin.
    pub fn budget(&self, deadline: Instant, now: Instant) -> Option<Duration> {
        deadline
            .checked_duration_since(now)
            .and_then(|remaining| remaining.checked_sub(self.margin))
            .filter(|budget| !budget.is_zero())
    }

    /// Runs `handler` within the invocation's time budget.
    ///
    /// The caller is released exactly once: with the handler's own result,
    /// with a `Timeout` failure, or with a `Panic` failure when the handler
    /// panicked. Panics never unwind into the caller.
    pub async fn with_time_constraint<F, Fut, T>(
        &self,
        invocation: &Invocation,
        handler: F,
    ) -> Result<T, Failure>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Failure>> + Send + 'static,
        T: Send + 'static,
    {
        let span = invocation.span().clone();

        let Some(deadline) = invocation.deadline() else {
            span.in_scope(|| warn!("no deadline in context, timeout cannot be captured"));
            return run_guarded(handler, span).await;
        };

        let Some(budget) = self.budget(deadline, Instant::now()) else {
            span.in_scope(|| {
                warn!(
                    timeout = true,
                    margin_ms = self.margin.as_millis() as u64,
                    "deadline inside safety margin, handler not started"
                )
            });
            return Err(Failure::timeout("invocation timeout"));
        };

        let (completed_tx, completed_rx) = oneshot::channel();
        let task_span = span.clone();
        tokio::spawn(async move {
            let outcome = run_guarded(handler, task_span).await;
            // The receiver is gone when the caller already timed out.
            let _ = completed_tx.send(outcome);
        });

        match tokio::time::timeout(budget, completed_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Failure::system(
                "handler task ended without reporting a result",
            )),
            Err(_) => {
                span.in_scope(|| {
                    warn!(
                        timeout = true,
                        budget_ms = budget.as_millis() as u64,
                        "handler exceeded its time budget"
                    )
                });
                Err(Failure::timeout("invocation timeout"))
            }
        }
    }
}

async fn run_guarded<F, Fut, T>(handler: F, span: Span) -> Result<T, Failure>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let guarded = AssertUnwindSafe(async move { handler().await }).catch_unwind();
    match guarded.instrument(span.clone()).await {
        Ok(outcome) => outcome,
        Err(payload) => {
            let recovered = panic_message(payload.as_ref());
            let stack = Backtrace::force_capture().to_string();
            span.in_scope(|| {
                error!(
                    recover = %recovered,
                    stack = %stack,
                    panic = true,
                    "invocation panicked"
                )
            });
            Err(Failure::panic(format!("invocation panicked: {recovered}")))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
