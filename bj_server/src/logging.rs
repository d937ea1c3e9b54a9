//! Structured logging configuration.
//!
//! Installs a `tracing` subscriber that also receives the `log` records
//! emitted by `blackjack_rewards`, and provides helpers for security events
//! and request summaries. E-mail addresses never reach the logs in clear
//! text; they are replaced by a short SHA-256 fingerprint.

use sha2::{Digest, Sha256};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use bj_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Stable, non-reversible fingerprint of an e-mail address for log correlation
///
/// Case and surrounding whitespace do not change the fingerprint.
///
/// # Example
///
/// ```
/// use bj_server::logging::redact_email;
///
/// let id = redact_email("Player@Example.com");
/// assert_eq!(id, redact_email(" player@example.com "));
/// assert!(!id.contains("example"));
/// ```
pub fn redact_email(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!("user-{}", hex::encode(&digest[..6]))
}

/// Log security event with structured data
///
/// # Arguments
///
/// * `event_type` - Type of security event
/// * `email` - Optional account involved, logged as a fingerprint
/// * `request_id` - Optional request correlation ID
/// * `message` - Event message
///
/// # Example
///
/// ```
/// use bj_server::logging::log_security_event;
///
/// log_security_event(
///     "invalid_2fa_code",
///     Some("player@example.com"),
///     Some("3f1c..."),
///     "2FA verification failed",
/// );
/// ```
pub fn log_security_event(
    event_type: &str,
    email: Option<&str>,
    request_id: Option<&str>,
    message: &str,
) {
    let user = email.map(redact_email);
    tracing::warn!(
        event_type = event_type,
        user = user.as_deref(),
        request_id = request_id,
        "SECURITY: {}",
        message
    );
}

/// Log API request/response
///
/// # Arguments
///
/// * `method` - HTTP method
/// * `path` - Request path
/// * `status_code` - Response status code
/// * `duration_ms` - Request duration in milliseconds
/// * `request_id` - Request correlation ID
pub fn log_api_request(
    method: &str,
    path: &str,
    status_code: u16,
    duration_ms: u64,
    request_id: &str,
) {
    if status_code >= 500 {
        tracing::error!(
            http_method = method,
            http_path = path,
            http_status = status_code,
            duration_ms = duration_ms,
            request_id = request_id,
            "API request failed"
        );
    } else {
        tracing::info!(
            http_method = method,
            http_path = path,
            http_status = status_code,
            duration_ms = duration_ms,
            request_id = request_id,
            "API request completed"
        );
    }
}
