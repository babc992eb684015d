//! Trigger front-controllers. Each builds the request-scoped
//! [`sls_core::invocation::Invocation`] from the runtime context, runs the
//! feature through the timeout runner and converts the outcome into the
//! trigger's response shape.

pub mod apigw;
pub mod cognito;

use lambda_runtime::Context;
use sls_core::invocation::{deadline_from_epoch_millis, parse_trace_id, InvocationMeta};
use sls_core::trigger::InvokeTrigger;
use sls_core::{Failure, FailureKind};

/// Invocation fields every trigger shares, read from the Lambda context.
pub fn invocation_meta(context: &Context, trigger: InvokeTrigger) -> InvocationMeta {
    InvocationMeta {
        request_id: context.request_id.clone(),
        trace_id: context
            .xray_trace_id
            .as_deref()
            .map(parse_trace_id)
            .unwrap_or_default(),
        function_name: context.env_config.function_name.clone(),
        function_version: context.env_config.version.clone(),
        invoked_function_arn: context.invoked_function_arn.clone(),
        trigger: Some(trigger),
        deadline: deadline_from_epoch_millis(context.deadline),
        ..InvocationMeta::default()
    }
}

/// Failures caused by the caller's input rather than by the feature. These
/// are logged as warnings.
pub fn is_client_failure(failure: &Failure) -> bool {
    match failure.kind() {
        FailureKind::Validation
        | FailureKind::InvalidParam
        | FailureKind::NotFound
        | FailureKind::Conflict
        | FailureKind::NotAuthorized
        | FailureKind::NotAuthenticated => true,
        FailureKind::RestApi => failure.status().is_some_and(|status| status < 500),
        _ => false,
    }
}
