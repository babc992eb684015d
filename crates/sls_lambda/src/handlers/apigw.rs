//! API Gateway (REST proxy) front-controller.
//!
//! [`RestRunner`] wraps a [`RestHandler`] with the timeout runner, request
//! scoped logging and the mapping from [`Failure`] kinds to HTTP responses.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use aws_lambda_events::encodings::Body;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use lambda_runtime::{service_fn, LambdaEvent};
use serde::Serialize;
use serde_json::Value;
use sls_core::failure::FailureContext;
use sls_core::invocation::Invocation;
use sls_core::runner::{Timeout, TimeoutConfig};
use sls_core::trigger::InvokeTrigger;
use sls_core::{Failure, FailureKind};
use tracing::{error, info, info_span, warn};

use super::invocation_meta;

pub const JSON_MEDIA_TYPE: &str = "application/json";
pub const PLAIN_TEXT_MEDIA_TYPE: &str = "text/plain";
pub const HEADER_ACCESS_CTRL_ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_CLIENT_NAME: &str = "x-client-name";
pub const HEADER_CLIENT_VERSION: &str = "x-client-version";

#[derive(Debug, Clone, PartialEq)]
pub enum SuccessBody {
    Empty,
    Text(String),
    Json(Value),
}

/// Takes full control of the response sent back to API Gateway.
pub type ResponseFn = Arc<
    dyn Fn(u16, &SuccessBody, &ApiGatewayProxyRequest) -> Result<ApiGatewayProxyResponse, Failure>
        + Send
        + Sync,
>;

/// What a handler returns when it succeeds.
#[derive(Clone)]
pub struct Success {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: SuccessBody,
    pub response_fn: Option<ResponseFn>,
}

impl Success {
    pub fn new(status_code: u16, body: SuccessBody) -> Self {
        Self {
            status_code,
            headers: BTreeMap::new(),
            body,
            response_fn: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(200, SuccessBody::Empty)
    }

    pub fn no_content() -> Self {
        Self::new(204, SuccessBody::Empty)
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new(200, SuccessBody::Text(body.into()))
    }

    pub fn json<T: Serialize>(body: &T) -> Result<Self, Failure> {
        let value = serde_json::to_value(body)
            .map_err(|err| Failure::to_system(err, "serde_json::to_value failed"))?;
        Ok(Self::new(200, SuccessBody::Json(value)))
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_response_fn(mut self, response_fn: ResponseFn) -> Self {
        self.response_fn = Some(response_fn);
        self
    }
}

impl std::fmt::Debug for Success {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Success")
            .field("status_code", &self.status_code)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("response_fn", &self.response_fn.is_some())
            .finish()
    }
}

/// JSON body of every failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    pub id: String,
    pub status: u16,
}

#[async_trait]
pub trait RestHandler: Send + Sync + 'static {
    async fn run(
        &self,
        invocation: Invocation,
        request: ApiGatewayProxyRequest,
    ) -> Result<Success, Failure>;
}

pub struct RestRunner<H> {
    feature: Arc<H>,
    timeout: Timeout,
}

impl<H: RestHandler> RestRunner<H> {
    pub fn new(feature: H, timeout: Timeout) -> Self {
        Self {
            feature: Arc::new(feature),
            timeout,
        }
    }

    /// Runner whose safety margin comes from the process environment.
    pub fn from_env(feature: H) -> Self {
        Self::new(feature, Timeout::new(TimeoutConfig::from_env()))
    }

    pub async fn handle(
        &self,
        event: LambdaEvent<ApiGatewayProxyRequest>,
    ) -> Result<ApiGatewayProxyResponse, Failure> {
        let invocation = Invocation::new(invocation_meta(&event.context, InvokeTrigger::Apigw));
        self.handle_with(invocation, event.payload).await
    }

    pub async fn handle_with(
        &self,
        invocation: Invocation,
        request: ApiGatewayProxyRequest,
    ) -> Result<ApiGatewayProxyResponse, Failure> {
        let start = Instant::now();
        let invocation = with_request_span(invocation, &request);
        let span = invocation.span().clone();
        let request_id = request_id(&request).to_string();

        let feature = Arc::clone(&self.feature);
        let feature_request = request.clone();
        let feature_invocation = invocation.clone();
        let outcome = self
            .timeout
            .with_time_constraint(&invocation, move || async move {
                feature.run(feature_invocation, feature_request).await
            })
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        span.in_scope(|| match outcome {
            Err(failure) => process_failure(&failure, &request, elapsed_ms)
                .wrap_err_with(|| format!("process_failure failed ({request_id})")),
            Ok(success) => {
                let response = process_success(&success, &request)
                    .wrap_err_with(|| format!("process_success failed ({request_id})"))?;
                info!(
                    status = response.status_code,
                    elapsed_ms,
                    "{}",
                    request.path.as_deref().unwrap_or_default()
                );
                Ok(response)
            }
        })
    }
}

/// Serves API Gateway events with `handler` until the runtime shuts down.
pub async fn run<H: RestHandler>(handler: H) -> Result<(), lambda_runtime::Error> {
    let runner = Arc::new(RestRunner::from_env(handler));
    lambda_runtime::run(service_fn(move |event: LambdaEvent<ApiGatewayProxyRequest>| {
        let runner = Arc::clone(&runner);
        async move {
            runner
                .handle(event)
                .await
                .map_err(lambda_runtime::Error::from)
        }
    }))
    .await
}

fn request_id(request: &ApiGatewayProxyRequest) -> &str {
    request
        .request_context
        .request_id
        .as_deref()
        .unwrap_or_default()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Caller identity from a Cognito or custom authorizer, if one ran.
fn request_identity(request: &ApiGatewayProxyRequest) -> (Option<String>, Vec<String>) {
    match serde_json::to_value(&request.request_context) {
        Ok(context) => authorizer_identity(context.get("authorizer").unwrap_or(&Value::Null)),
        Err(_) => (None, Vec::new()),
    }
}

fn authorizer_identity(authorizer: &Value) -> (Option<String>, Vec<String>) {
    let user_id = authorizer
        .pointer("/claims/sub")
        .or_else(|| authorizer.get("principalId"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let roles = match authorizer.pointer("/claims/cognito:groups") {
        Some(Value::Array(groups)) => groups
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(groups)) => groups
            .trim_matches(|c| c == '[' || c == ']')
            .split([',', ' '])
            .filter(|group| !group.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    (user_id, roles)
}

fn with_request_span(invocation: Invocation, request: &ApiGatewayProxyRequest) -> Invocation {
    let (user_id, roles) = request_identity(request);
    let span = info_span!(
        parent: invocation.span(),
        "apigw_request",
        method = %request.http_method,
        path = request.path.as_deref().unwrap_or_default(),
        resource_path = request
            .request_context
            .resource_path
            .as_deref()
            .unwrap_or_default(),
        api_gateway_request_id = request_id(request),
        user_arn = request
            .request_context
            .identity
            .user_arn
            .as_deref()
            .unwrap_or_default(),
        client_name = header(&request.headers, HEADER_CLIENT_NAME).unwrap_or("unknown"),
        client_version = header(&request.headers, HEADER_CLIENT_VERSION).unwrap_or_default(),
        path_parameters = ?request.path_parameters,
        query_parameters = ?request.query_string_parameters,
        user_id = user_id.as_deref().unwrap_or_default(),
        roles = %roles.join(","),
    );

    invocation.with_identity(user_id, roles).with_span(span)
}

/// HTTP status a failure kind maps to.
pub fn failure_status(failure: &Failure) -> u16 {
    match failure.kind() {
        FailureKind::Panic => 502,
        FailureKind::Timeout => 504,
        FailureKind::RestApi => failure.status().unwrap_or(500),
        FailureKind::NotFound => 404,
        FailureKind::NotAuthorized => 401,
        FailureKind::NotAuthenticated => 403,
        _ => 500,
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), Failure> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|err| Failure::to_system(err, format!("invalid header name ({name})")))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|err| Failure::to_system(err, format!("invalid header value ({name})")))?;
    headers.insert(header_name, header_value);
    Ok(())
}

/// Logs the failure and renders it as a JSON error response.
pub fn process_failure(
    failure: &Failure,
    request: &ApiGatewayProxyRequest,
    elapsed_ms: u64,
) -> Result<ApiGatewayProxyResponse, Failure> {
    let status = failure_status(failure);
    let timeout = failure.is_timeout();
    let panic = failure.is_panic();
    if status >= 500 {
        error!(status, elapsed_ms, timeout, panic, body = ?request.body, "{failure}");
    } else {
        warn!(status, elapsed_ms, timeout, panic, body = ?request.body, "{failure}");
    }

    let mut failed = ErrorResponse {
        message: StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or_default()
            .to_string(),
        fields: BTreeMap::new(),
        id: request_id(request).to_string(),
        status,
    };
    if failure.is_rest_api() {
        if let Some(message) = failure.public_message() {
            failed.message = message.to_string();
        }
        failed.fields = failure.fields().clone();
        if let Some(code) = failure.status() {
            failed.status = code;
        }
    }

    let body = serde_json::to_string(&failed)
        .map_err(|err| Failure::to_system(err, "serde_json::to_string failed (ErrorResponse)"))?;

    let mut response = ApiGatewayProxyResponse::default();
    response.status_code = i64::from(status);
    insert_header(&mut response.headers, HEADER_ACCESS_CTRL_ALLOW_ORIGIN, "*")?;
    insert_header(&mut response.headers, HEADER_CONTENT_TYPE, JSON_MEDIA_TYPE)?;
    response.body = Some(Body::Text(body));
    Ok(response)
}

/// Renders a handler's success, honoring its custom response function.
pub fn process_success(
    success: &Success,
    request: &ApiGatewayProxyRequest,
) -> Result<ApiGatewayProxyResponse, Failure> {
    if let Some(response_fn) = &success.response_fn {
        return response_fn(success.status_code, &success.body, request).wrap_err_with(|| {
            format!("response_fn failed ({})", success.status_code)
        });
    }

    let status = if (200..400).contains(&success.status_code) {
        success.status_code
    } else {
        200
    };

    let mut response = ApiGatewayProxyResponse::default();
    response.status_code = i64::from(status);
    for (name, value) in &success.headers {
        insert_header(&mut response.headers, name, value)?;
    }
    if !response.headers.contains_key(HEADER_ACCESS_CTRL_ALLOW_ORIGIN) {
        insert_header(&mut response.headers, HEADER_ACCESS_CTRL_ALLOW_ORIGIN, "*")?;
    }

    if status == 204 {
        return Ok(response);
    }

    match &success.body {
        SuccessBody::Text(text) => {
            insert_header(&mut response.headers, HEADER_CONTENT_TYPE, PLAIN_TEXT_MEDIA_TYPE)?;
            response.body = Some(Body::Text(text.clone()));
        }
        SuccessBody::Json(value) => {
            insert_header(&mut response.headers, HEADER_CONTENT_TYPE, JSON_MEDIA_TYPE)?;
            let body = serde_json::to_string(value)
                .map_err(|err| Failure::to_system(err, "serde_json::to_string failed (body)"))?;
            response.body = Some(Body::Text(body));
        }
        SuccessBody::Empty => {
            insert_header(&mut response.headers, HEADER_CONTENT_TYPE, JSON_MEDIA_TYPE)?;
        }
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use sls_core::invocation::InvocationMeta;

    use super::*;

    struct Fixed(fn() -> Result<Success, Failure>);

    #[async_trait]
    impl RestHandler for Fixed {
        async fn run(
            &self,
            _invocation: Invocation,
            _request: ApiGatewayProxyRequest,
        ) -> Result<Success, Failure> {
            (self.0)()
        }
    }

    struct Sleepy;

    #[async_trait]
    impl RestHandler for Sleepy {
        async fn run(
            &self,
            _invocation: Invocation,
            _request: ApiGatewayProxyRequest,
        ) -> Result<Success, Failure> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(Success::ok())
        }
    }

    struct Panicky;

    #[async_trait]
    impl RestHandler for Panicky {
        async fn run(
            &self,
            _invocation: Invocation,
            _request: ApiGatewayProxyRequest,
        ) -> Result<Success, Failure> {
            panic!("handler blew up");
        }
    }

    struct EchoIdentity;

    #[async_trait]
    impl RestHandler for EchoIdentity {
        async fn run(
            &self,
            invocation: Invocation,
            _request: ApiGatewayProxyRequest,
        ) -> Result<Success, Failure> {
            Success::json(&json!({
                "user_id": invocation.meta().user_id,
                "roles": invocation.meta().roles,
            }))
        }
    }

    fn request() -> ApiGatewayProxyRequest {
        let mut request = ApiGatewayProxyRequest::default();
        request.path = Some("/orders".to_string());
        request.request_context.request_id = Some("req-42".to_string());
        request
    }

    fn invocation(deadline_in: Option<Duration>) -> Invocation {
        Invocation::new(InvocationMeta {
            request_id: "lambda-req".to_string(),
            trigger: Some(InvokeTrigger::Apigw),
            deadline: deadline_in.map(|remaining| Instant::now() + remaining),
            ..InvocationMeta::default()
        })
    }

    fn body_json(response: &ApiGatewayProxyResponse) -> Value {
        match &response.body {
            Some(Body::Text(text)) => serde_json::from_str(text).expect("json body"),
            other => panic!("unexpected body {other:?}"),
        }
    }

    fn header_value<'a>(response: &'a ApiGatewayProxyResponse, name: &str) -> Option<&'a str> {
        header(&response.headers, name)
    }

    #[test]
    fn request_span_keeps_lambda_fields() {
        let scoped = with_request_span(invocation(Some(Duration::from_secs(5))), &request());
        assert_eq!(scoped.request_id(), "lambda-req");
        assert_eq!(scoped.meta().trigger, Some(InvokeTrigger::Apigw));
        assert!(scoped.deadline().is_some());
        assert!(scoped.meta().user_id.is_none());
        assert!(scoped.meta().roles.is_empty());
    }

    #[test]
    fn failure_kinds_map_to_http_status() {
        assert_eq!(failure_status(&Failure::panic("p")), 502);
        assert_eq!(failure_status(&Failure::timeout("t")), 504);
        assert_eq!(failure_status(&Failure::not_found("n")), 404);
        assert_eq!(failure_status(&Failure::not_authorized("a")), 401);
        assert_eq!(failure_status(&Failure::not_authenticated("a")), 403);
        assert_eq!(failure_status(&Failure::rest_api(422, "bad order")), 422);
        assert_eq!(failure_status(&Failure::conflict("c")), 500);
        assert_eq!(failure_status(&Failure::system("s")), 500);
    }

    #[test]
    fn failure_body_uses_status_text_and_request_id() {
        let response = process_failure(&Failure::not_found("order (7)"), &request(), 3)
            .expect("rendered");
        assert_eq!(response.status_code, 404);
        assert_eq!(header_value(&response, HEADER_CONTENT_TYPE), Some(JSON_MEDIA_TYPE));
        assert_eq!(
            header_value(&response, HEADER_ACCESS_CTRL_ALLOW_ORIGIN),
            Some("*")
        );
        assert_eq!(
            body_json(&response),
            json!({"message": "Not Found", "id": "req-42", "status": 404})
        );
    }

    #[test]
    fn rest_api_failure_overrides_message_and_fields() {
        let failure = Failure::rest_api(422, "order is invalid").with_field("qty", "must be > 0");
        let response = process_failure(&failure, &request(), 1).expect("rendered");
        assert_eq!(response.status_code, 422);
        assert_eq!(
            body_json(&response),
            json!({
                "message": "order is invalid",
                "fields": {"qty": "must be > 0"},
                "id": "req-42",
                "status": 422
            })
        );
    }

    #[test]
    fn success_status_outside_success_range_becomes_200() {
        let response = process_success(&Success::text("hi").with_status(404), &request())
            .expect("rendered");
        assert_eq!(response.status_code, 200);

        let response = process_success(&Success::text("moved").with_status(302), &request())
            .expect("rendered");
        assert_eq!(response.status_code, 302);
    }

    #[test]
    fn text_body_is_plain_and_json_body_is_json() {
        let response = process_success(&Success::text("pong"), &request()).expect("rendered");
        assert_eq!(
            header_value(&response, HEADER_CONTENT_TYPE),
            Some(PLAIN_TEXT_MEDIA_TYPE)
        );
        assert_eq!(response.body, Some(Body::Text("pong".to_string())));

        let success = Success::json(&json!({"id": 7})).expect("json");
        let response = process_success(&success, &request()).expect("rendered");
        assert_eq!(header_value(&response, HEADER_CONTENT_TYPE), Some(JSON_MEDIA_TYPE));
        assert_eq!(body_json(&response), json!({"id": 7}));
    }

    #[test]
    fn no_content_has_no_body() {
        let response = process_success(&Success::no_content(), &request()).expect("rendered");
        assert_eq!(response.status_code, 204);
        assert!(response.body.is_none());
        assert_eq!(
            header_value(&response, HEADER_ACCESS_CTRL_ALLOW_ORIGIN),
            Some("*")
        );
    }

    #[test]
    fn explicit_cors_header_is_kept() {
        let success = Success::text("x")
            .with_header(HEADER_ACCESS_CTRL_ALLOW_ORIGIN, "https://app.example.com");
        let response = process_success(&success, &request()).expect("rendered");
        assert_eq!(
            header_value(&response, HEADER_ACCESS_CTRL_ALLOW_ORIGIN),
            Some("https://app.example.com")
        );
    }

    #[test]
    fn custom_response_fn_takes_over() {
        let response_fn: ResponseFn = Arc::new(|status, _body, _request| {
            let mut response = ApiGatewayProxyResponse::default();
            response.status_code = i64::from(status) + 1;
            Ok(response)
        });
        let success = Success::ok().with_status(201).with_response_fn(response_fn);
        let response = process_success(&success, &request()).expect("rendered");
        assert_eq!(response.status_code, 202);
        assert!(response.headers.is_empty());
    }

    #[tokio::test]
    async fn runner_renders_handler_success() {
        let runner = RestRunner::new(Fixed(|| Ok(Success::text("ok"))), Timeout::default());
        let response = runner
            .handle_with(invocation(Some(Duration::from_secs(5))), request())
            .await
            .expect("response");
        assert_eq!(response.status_code, 200);
    }

    #[tokio::test]
    async fn runner_renders_handler_failure() {
        let runner = RestRunner::new(
            Fixed(|| Err(Failure::not_authenticated("no token"))),
            Timeout::default(),
        );
        let response = runner
            .handle_with(invocation(Some(Duration::from_secs(5))), request())
            .await
            .expect("response");
        assert_eq!(response.status_code, 403);
    }

    #[tokio::test]
    async fn runner_maps_timeout_to_504() {
        let runner = RestRunner::new(Sleepy, Timeout::default());
        let started = Instant::now();
        let response = runner
            .handle_with(invocation(Some(Duration::from_millis(300))), request())
            .await
            .expect("response");
        assert_eq!(response.status_code, 504);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn runner_maps_panic_to_502() {
        let runner = RestRunner::new(Panicky, Timeout::default());
        let response = runner
            .handle_with(invocation(Some(Duration::from_secs(5))), request())
            .await
            .expect("response");
        assert_eq!(response.status_code, 502);
        assert_eq!(body_json(&response)["message"], "Bad Gateway");
    }

    #[tokio::test]
    async fn runner_hands_request_identity_to_handler() {
        let runner = RestRunner::new(EchoIdentity, Timeout::default());
        let response = runner
            .handle_with(invocation(Some(Duration::from_secs(5))), request())
            .await
            .expect("response");
        assert_eq!(body_json(&response), json!({"user_id": null, "roles": []}));
    }

    #[test]
    fn cognito_claims_give_user_and_roles() {
        let authorizer = json!({"claims": {"sub": "user-1", "cognito:groups": "admin,support"}});
        assert_eq!(
            authorizer_identity(&authorizer),
            (
                Some("user-1".to_string()),
                vec!["admin".to_string(), "support".to_string()]
            )
        );

        let authorizer = json!({"claims": {"sub": "user-2", "cognito:groups": ["ops"]}});
        assert_eq!(authorizer_identity(&authorizer).1, vec!["ops".to_string()]);
    }

    #[test]
    fn custom_authorizer_principal_is_the_user() {
        let authorizer = json!({"principalId": "svc-7"});
        assert_eq!(
            authorizer_identity(&authorizer),
            (Some("svc-7".to_string()), Vec::new())
        );
        assert_eq!(authorizer_identity(&Value::Null), (None, Vec::new()));
    }
}
