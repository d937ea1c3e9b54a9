//! HTTP API for the Blackjack rewards server.
//!
//! # Modules
//!
//! - [`auth`]: login, token verification, 2FA enrollment and verification
//! - [`rewards`]: daily bonus, claim, redeem, balance, admin trigger
//! - [`middleware`]: full-session guard and admin key check
//! - [`errors`]: JSON error bodies
//! - [`request_id`]: `x-request-id` propagation and request logging
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                      - Health check (public)
//! GET  /api/test                    - Liveness check (public)
//! POST /api/login                   - Login with a Firebase ID token (public)
//! POST /api/verify-token            - Check a provider token against an e-mail (public)
//! POST /api/verify-2fa              - Exchange pre-2FA token + TOTP code (public)
//! POST /api/setup-2fa               - Enroll in 2FA (any valid bearer)
//! POST /api/send-currency-code      - Issue and e-mail the daily bonus (full session)
//! POST /api/claim-currency-code     - Claim the oldest code (full session)
//! POST /api/redeem-currency-code    - Redeem a code by value (full session)
//! POST /api/update-balance          - Overwrite the balance (full session)
//! POST /api/trigger-daily-bonus     - Run the daily batch now (X-Admin-Key)
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use bj_server::api::{create_router, AppState};
//! # async fn example(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is permissive: the game client is served from a different origin.

pub mod auth;
pub mod errors;
pub mod middleware;
pub mod request_id;
pub mod rewards;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use blackjack_rewards::db::UserRepository;
use blackjack_rewards::{AuthManager, RewardsManager};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request (cheap due to Arc wrappers).
#[derive(Clone)]
pub struct AppState {
    pub auth_manager: Arc<AuthManager>,
    pub rewards_manager: Arc<RewardsManager>,
    /// Store handle used by the health check
    pub users: Arc<dyn UserRepository>,
    pub mail_configured: bool,
    pub daily_job_enabled: bool,
    pub admin_api_key: Option<Arc<str>>,
    /// Include internal error text in error bodies (off in production)
    pub expose_errors: bool,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Arguments
///
/// - `state`: Application state with managers
///
/// # Returns
///
/// Configured Axum router ready to serve requests
pub fn create_router(state: AppState) -> Router {
    // Public routes (no authentication middleware)
    let public_routes = Router::new()
        .route("/api/test", get(test_route))
        .route("/api/login", post(auth::login))
        .route("/api/verify-token", post(auth::verify_token))
        .route("/api/verify-2fa", post(auth::verify_two_factor))
        // Accepts provider and pre-2FA tokens, checked in the handler
        .route("/api/setup-2fa", post(auth::setup_two_factor))
        .route("/api/trigger-daily-bonus", post(rewards::trigger_daily_bonus));

    // Protected routes (require a 2FA-verified session)
    let protected_routes = Router::new()
        .route("/api/send-currency-code", post(rewards::send_currency_code))
        .route("/api/claim-currency-code", post(rewards::claim_currency_code))
        .route("/api/redeem-currency-code", post(rewards::redeem_currency_code))
        .route("/api/update-balance", post(rewards::update_balance))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_full_session,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn test_route() -> Json<serde_json::Value> {
    Json(json!({ "message": "Hello from the backend!" }))
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` while the store answers, `503 Service Unavailable`
/// otherwise. A missing identity provider or mail transport is reported but
/// does not fail the check.
///
/// # Example
///
/// ```bash
/// curl http://localhost:5000/health
/// # {"status":"healthy","database":true,"identityProvider":true,"mail":false,...}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = match state.users.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Health check: store unreachable");
            false
        }
    };
    let provider_configured = state.auth_manager.provider_configured();

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let status = match (db_healthy, provider_configured && state.mail_configured) {
        (false, _) => "unhealthy",
        (true, false) => "degraded",
        (true, true) => "healthy",
    };

    let response = json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "identityProvider": provider_configured,
        "mail": state.mail_configured,
        "dailyBonusJob": state.daily_job_enabled,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
