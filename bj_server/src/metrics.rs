//! Prometheus metrics for the rewards server.
//!
//! Metrics are recorded through the `metrics` facade and only exported when
//! [`init_metrics`] installs the Prometheus listener. Without it every
//! recording call is a cheap no-op.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: request counts and duration by route and status
//! - **Auth Metrics**: logins by outcome, 2FA verifications
//! - **Ledger Metrics**: codes issued by kind, codes claimed, daily job results
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use bj_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/api/login", 200);
//! metrics::login_attempts_total("returning");
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Sets up a Prometheus scrape endpoint on the specified address.
/// Metrics will be available at `http://<addr>/metrics`.
///
/// # Arguments
///
/// - `addr`: Address to bind the metrics server to (e.g., `0.0.0.0:9090`)
///
/// # Returns
///
/// Result indicating success or error message
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
///
/// Increments the total HTTP request counter with method, path, and status labels.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Auth Metrics
// ============================================================================

/// Increment login attempts counter.
///
/// `outcome` is one of `new_user`, `returning`, `2fa_required` or `failed`.
pub fn login_attempts_total(outcome: &'static str) {
    metrics::counter!("login_attempts_total", "outcome" => outcome).increment(1);
}

/// Increment 2FA verification counter.
pub fn two_factor_verifications_total(success: bool) {
    metrics::counter!("two_factor_verifications_total",
        "success" => success.to_string()
    )
    .increment(1);
}

// ============================================================================
// Ledger Metrics
// ============================================================================

/// Increment issued codes counter.
pub fn codes_issued_total(kind: &'static str) {
    metrics::counter!("codes_issued_total", "kind" => kind).increment(1);
}

/// Increment claimed codes counter and record the credited amount.
pub fn codes_claimed_total(amount: i64) {
    metrics::counter!("codes_claimed_total").increment(1);
    metrics::histogram!("claimed_amount_coins").record(amount as f64);
}

/// Record the outcome of one daily bonus batch.
pub fn daily_job_results(issued: usize, skipped: usize, failed: usize) {
    metrics::counter!("daily_job_issued_total").increment(issued as u64);
    metrics::counter!("daily_job_skipped_total").increment(skipped as u64);
    metrics::counter!("daily_job_failed_total").increment(failed as u64);
}
