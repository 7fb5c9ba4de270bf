use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub fn init_metrics() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("metrics handle already initialized"))?;

    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Record the outcome of a signature check.
pub fn record_verification(gateway: &'static str, valid: bool) {
    let outcome = if valid { "valid" } else { "invalid" };
    counter!(
        "payment_signature_verifications_total",
        "gateway" => gateway,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record an outbound gateway call.
pub fn record_gateway_request(gateway: &'static str, operation: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        "payment_gateway_requests_total",
        "gateway" => gateway,
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}
