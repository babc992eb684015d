use tracing_subscriber::EnvFilter;

/// Installs JSON logging for a Lambda process. `RUST_LOG` overrides the
/// default `info` level. Calling it twice keeps the first subscriber.
pub fn init_lambda_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .with_span_list(false)
        .with_target(false)
        .without_time()
        .try_init();
}
