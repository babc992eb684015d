//! Cognito user pool trigger front-controllers.
//!
//! Cognito reads failure from the returned error rather than a status code,
//! so the runner only logs and passes the failure through.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use aws_lambda_events::cognito::CognitoEventUserPoolsPreSignup;
use lambda_runtime::{service_fn, LambdaEvent};
use sls_core::invocation::Invocation;
use sls_core::runner::{Timeout, TimeoutConfig};
use sls_core::trigger::InvokeTrigger;
use sls_core::Failure;
use tracing::{error, info, info_span, warn};

use super::{invocation_meta, is_client_failure};

#[async_trait]
pub trait PreSignupHandler: Send + Sync + 'static {
    /// Returns the event, with any response flags the feature decided on.
    async fn run(
        &self,
        invocation: Invocation,
        event: CognitoEventUserPoolsPreSignup,
    ) -> Result<CognitoEventUserPoolsPreSignup, Failure>;
}

pub struct PreSignupRunner<H> {
    feature: Arc<H>,
    timeout: Timeout,
}

impl<H: PreSignupHandler> PreSignupRunner<H> {
    pub fn new(feature: H, timeout: Timeout) -> Self {
        Self {
            feature: Arc::new(feature),
            timeout,
        }
    }

    pub fn from_env(feature: H) -> Self {
        Self::new(feature, Timeout::new(TimeoutConfig::from_env()))
    }

    pub async fn handle(
        &self,
        event: LambdaEvent<CognitoEventUserPoolsPreSignup>,
    ) -> Result<CognitoEventUserPoolsPreSignup, Failure> {
        let invocation =
            Invocation::new(invocation_meta(&event.context, InvokeTrigger::Cognito));
        self.handle_with(invocation, event.payload).await
    }

    pub async fn handle_with(
        &self,
        invocation: Invocation,
        event: CognitoEventUserPoolsPreSignup,
    ) -> Result<CognitoEventUserPoolsPreSignup, Failure> {
        let header = &event.cognito_event_user_pools_header;
        let span = info_span!(
            parent: invocation.span(),
            "cognito_pre_signup",
            user_name = ?header.user_name,
            user_pool_id = ?header.user_pool_id,
            trigger_source = ?header.trigger_source,
        );
        let invocation = invocation.with_span(span.clone());

        let start = Instant::now();
        let feature = Arc::clone(&self.feature);
        let feature_invocation = invocation.clone();
        let outcome = self
            .timeout
            .with_time_constraint(&invocation, move || async move {
                feature.run(feature_invocation, event).await
            })
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        span.in_scope(|| match &outcome {
            Ok(_) => info!(elapsed_ms, "pre signup completed"),
            Err(failure) if failure.is_timeout() => {
                warn!(elapsed_ms, timeout = true, "{failure}")
            }
            Err(failure) if failure.is_panic() => {
                error!(elapsed_ms, panic = true, "{failure}")
            }
            Err(failure) if is_client_failure(failure) => {
                warn!(elapsed_ms, kind = %failure.kind(), "pre signup rejected: {failure}")
            }
            Err(failure) => {
                error!(elapsed_ms, kind = %failure.kind(), "pre signup failed: {failure}")
            }
        });
        outcome
    }
}

/// Serves pre sign-up events with `handler` until the runtime shuts down.
pub async fn run_pre_signup<H: PreSignupHandler>(handler: H) -> Result<(), lambda_runtime::Error> {
    let runner = Arc::new(PreSignupRunner::from_env(handler));
    lambda_runtime::run(service_fn(
        move |event: LambdaEvent<CognitoEventUserPoolsPreSignup>| {
            let runner = Arc::clone(&runner);
            async move {
                runner
                    .handle(event)
                    .await
                    .map_err(lambda_runtime::Error::from)
            }
        },
    ))
    .await
}
