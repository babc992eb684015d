use async_trait::async_trait;
use aws_lambda_events::apigw::ApiGatewayProxyRequest;
use serde::Serialize;
use sls_core::invocation::Invocation;
use sls_core::Failure;
use sls_lambda::handlers::apigw::{self, RestHandler, Success};
use sls_lambda::telemetry::init_lambda_tracing;

#[derive(Serialize)]
struct Health<'a> {
    status: &'a str,
    function: &'a str,
    version: &'a str,
    request_id: &'a str,
}

struct HealthCheck;

#[async_trait]
impl RestHandler for HealthCheck {
    async fn run(
        &self,
        invocation: Invocation,
        _request: ApiGatewayProxyRequest,
    ) -> Result<Success, Failure> {
        let meta = invocation.meta();
        Success::json(&Health {
            status: "ok",
            function: &meta.function_name,
            version: &meta.function_version,
            request_id: &meta.request_id,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    init_lambda_tracing();
    apigw::run(HealthCheck).await
}
