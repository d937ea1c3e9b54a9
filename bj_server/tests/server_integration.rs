//! Integration tests for the HTTP API.
//!
//! The router is driven in-process with `oneshot`; storage, mail and the
//! identity provider are in-memory stand-ins. A provider token is the string
//! `valid:<email>`.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bj_server::api::{AppState, create_router};
use blackjack_rewards::auth::totp::generate_code;
use blackjack_rewards::auth::{
    AuthManager, IdentityProvider, ProviderError, RetryPolicy, SessionTokenIssuer,
    UnavailableIdentityProvider, VerifiedIdentity,
};
use blackjack_rewards::db::{MemoryStore, Repositories};
use blackjack_rewards::mail::MemoryMailer;
use blackjack_rewards::rewards::{RewardsConfig, RewardsManager};
use http_body_util::BodyExt;
use rand::Rng;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // For `oneshot` method

const JWT_SECRET: &str = "server_test_secret_at_least_32_characters";
const ADMIN_KEY: &str = "admin-key-for-tests-0123";

struct PrefixProvider;

#[async_trait]
impl IdentityProvider for PrefixProvider {
    async fn verify_id_token(&self, token: &str) -> Result<VerifiedIdentity, ProviderError> {
        match token.strip_prefix("valid:") {
            Some(email) => Ok(VerifiedIdentity {
                email: email.to_string(),
                subject_id: format!("uid-{email}"),
            }),
            None => Err(ProviderError::Rejected("unknown token".to_string())),
        }
    }
}

struct TestServer {
    app: axum::Router,
    store: MemoryStore,
    mailer: MemoryMailer,
    tokens: SessionTokenIssuer,
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        attempt_timeout: Duration::from_secs(1),
        backoff: Duration::ZERO,
    }
}

fn build_server(
    provider: Arc<dyn IdentityProvider>,
    admin_key: Option<&str>,
    expose_errors: bool,
) -> TestServer {
    let store = MemoryStore::new();
    let mailer = MemoryMailer::new();
    let repos = Repositories::memory(store.clone());
    let rewards = RewardsManager::new(&repos, Arc::new(mailer.clone()), RewardsConfig::default());
    let tokens = SessionTokenIssuer::with_defaults(JWT_SECRET);
    let auth = AuthManager::new(
        &repos,
        provider,
        tokens.clone(),
        fast_policy(),
        rewards.clone(),
    );

    let state = AppState {
        auth_manager: Arc::new(auth),
        rewards_manager: Arc::new(rewards),
        users: repos.users.clone(),
        mail_configured: true,
        daily_job_enabled: false,
        admin_api_key: admin_key.map(Arc::from),
        expose_errors,
    };

    TestServer {
        app: create_router(state),
        store,
        mailer,
        tokens,
    }
}

fn server() -> TestServer {
    build_server(Arc::new(PrefixProvider), Some(ADMIN_KEY), true)
}

fn random_email() -> String {
    let n: u32 = rand::rng().random_range(100_000..999_999);
    format!("player{n}@example.com")
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn post(app: &axum::Router, uri: &str, bearer: Option<&str>, body: Value) -> (StatusCode, Value) {
    send(app, "POST", uri, bearer, Some(body)).await
}

/// Log in a fresh user and return the full session token
async fn login(app: &axum::Router, email: &str) -> String {
    let (status, body) = post(
        app,
        "/api/login",
        None,
        json!({ "providerToken": format!("valid:{email}") }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

// ===== Health and liveness =====

#[tokio::test]
async fn test_health_check_and_request_id() {
    let server = server();

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "client-42")
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "client-42");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], true);
    assert_eq!(body["identityProvider"], true);
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let server = server();
    let request = Request::builder().uri("/api/test").body(Body::empty()).unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    let id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert_eq!(id.len(), 36);
}

#[tokio::test]
async fn test_health_reports_store_outage() {
    let server = server();
    server.store.set_offline(true);

    let (status, body) = send(&server.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["database"], false);
}

#[tokio::test]
async fn test_health_degraded_without_provider() {
    let server = build_server(Arc::new(UnavailableIdentityProvider), None, true);
    let (status, body) = send(&server.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["identityProvider"], false);
}

#[tokio::test]
async fn test_test_route() {
    let server = server();
    let (status, body) = send(&server.app, "GET", "/api/test", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Hello from the backend!");
}

// ===== Login =====

#[tokio::test]
async fn test_login_missing_token() {
    let server = server();
    let (status, body) = post(&server.app, "/api/login", None, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("providerToken"));
}

#[tokio::test]
async fn test_login_malformed_body() {
    let server = server();
    let request = Request::builder()
        .method("POST")
        .uri("/api/login")
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_new_then_returning_user() {
    let server = server();
    let email = random_email();

    // Legacy field name
    let (status, body) = post(
        &server.app,
        "/api/login",
        None,
        json!({ "firebaseToken": format!("valid:{email}") }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["isNewUser"], true);
    assert_eq!(body["requires2FA"], false);
    let welcome = body["welcomeCode"].as_str().unwrap();
    assert!(welcome.starts_with("WELCOME-"));
    assert_eq!(server.mailer.sent_to(&email).len(), 1);

    let (status, body) = post(
        &server.app,
        "/api/login",
        None,
        json!({ "providerToken": format!("valid:{email}") }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isNewUser"], false);
    assert!(body.get("welcomeCode").is_none());
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn test_first_login_during_store_outage_can_be_retried() {
    let server = server();
    let email = random_email();
    let body = json!({ "providerToken": format!("valid:{email}") });

    server.store.set_offline(true);
    let (status, failed) = post(&server.app, "/api/login", None, body.clone()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(failed["message"], "Internal server error");
    server.store.set_offline(false);

    let (status, body) = post(&server.app, "/api/login", None, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isNewUser"], true);
    assert!(body["welcomeCode"].as_str().unwrap().starts_with("WELCOME-"));
}

#[tokio::test]
async fn test_login_rejected_token() {
    let server = server();
    let (status, body) = post(
        &server.app,
        "/api/login",
        None,
        json!({ "providerToken": "forged" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_login_provider_unavailable() {
    let server = build_server(Arc::new(UnavailableIdentityProvider), None, true);
    let (status, body) = post(
        &server.app,
        "/api/login",
        None,
        json!({ "providerToken": "valid:a@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
}

// ===== Token verification =====

#[tokio::test]
async fn test_verify_token() {
    let server = server();
    let email = random_email();
    login(&server.app, &email).await;

    let (status, body) = post(
        &server.app,
        "/api/verify-token",
        None,
        json!({ "providerToken": format!("valid:{email}"), "email": email }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], true);
    assert_eq!(body["email"], email.as_str());

    let (status, _) = post(
        &server.app,
        "/api/verify-token",
        None,
        json!({ "providerToken": format!("valid:{email}"), "email": "other@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post(
        &server.app,
        "/api/verify-token",
        None,
        json!({ "providerToken": "valid:ghost@example.com", "email": "ghost@example.com" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(&server.app, "/api/verify-token", None, json!({ "email": email })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ===== Two-factor flow =====

#[tokio::test]
async fn test_two_factor_flow() {
    let server = server();
    let email = random_email();
    let session = login(&server.app, &email).await;

    let (status, _) = send(&server.app, "POST", "/api/setup-2fa", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&server.app, "POST", "/api/setup-2fa", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["qrCode"].as_str().unwrap().starts_with("data:image/png;base64,"));
    assert!(body["otpauthUrl"].as_str().unwrap().starts_with("otpauth://totp/"));
    let secret = body["secret"].as_str().unwrap().to_string();

    let (status, body) = send(&server.app, "POST", "/api/setup-2fa", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alreadyEnabled"], true);

    let (status, body) = post(
        &server.app,
        "/api/login",
        None,
        json!({ "providerToken": format!("valid:{email}") }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requires2FA"], true);
    assert!(body.get("token").is_none());
    let temp = body["tempToken"].as_str().unwrap().to_string();

    // Pre-2FA token opens nothing that needs a full session
    let (status, _) = send(&server.app, "POST", "/api/claim-currency-code", Some(&temp), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = post(
        &server.app,
        "/api/verify-2fa",
        None,
        json!({ "email": email, "code": "abcdef", "tempToken": temp }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid 2FA code");

    let now = chrono::Utc::now().timestamp() as u64;
    let code = generate_code(&secret, now).unwrap();
    // `token` is the legacy name of `code`
    let (status, body) = post(
        &server.app,
        "/api/verify-2fa",
        None,
        json!({ "email": email, "token": code, "tempToken": temp }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let full = body["token"].as_str().unwrap().to_string();

    let (status, _) = send(&server.app, "POST", "/api/claim-currency-code", Some(&full), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_verify_two_factor_errors() {
    let server = server();
    let email = random_email();
    login(&server.app, &email).await;
    let temp = server.tokens.issue(&email, "uid", false).unwrap();

    let (status, _) = post(
        &server.app,
        "/api/verify-2fa",
        None,
        json!({ "email": email, "tempToken": temp }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 2FA never set up
    let (status, _) = post(
        &server.app,
        "/api/verify-2fa",
        None,
        json!({ "email": email, "code": "123456", "tempToken": temp }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(
        &server.app,
        "/api/verify-2fa",
        None,
        json!({ "email": "someone@example.com", "code": "123456", "tempToken": temp }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post(
        &server.app,
        "/api/verify-2fa",
        None,
        json!({ "email": email, "code": "123456", "tempToken": "garbage" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ===== Session gate =====

#[tokio::test]
async fn test_protected_routes_require_full_session() {
    let server = server();
    let email = random_email();
    login(&server.app, &email).await;
    let pre = server.tokens.issue(&email, "uid", false).unwrap();

    for uri in [
        "/api/send-currency-code",
        "/api/claim-currency-code",
        "/api/redeem-currency-code",
        "/api/update-balance",
    ] {
        let (status, _) = post(&server.app, uri, None, json!({})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri} without token");

        let (status, _) = post(&server.app, uri, Some("not-a-jwt"), json!({})).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri} with garbage");

        let (status, body) = post(&server.app, uri, Some(&pre), json!({})).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri} with pre-2FA token");
        assert_eq!(body["success"], false);
    }
}

// ===== Ledger =====

#[tokio::test]
async fn test_daily_bonus_then_cooldown() {
    let server = server();
    let email = random_email();
    let session = login(&server.app, &email).await;

    let (status, body) = send(&server.app, "POST", "/api/send-currency-code", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["code"].as_str().unwrap().starts_with("DAILY-"));
    assert_eq!(body["nextBonusIn"], 24);

    let (status, body) = send(&server.app, "POST", "/api/send-currency-code", Some(&session), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["hoursRemaining"], 24);
    assert_eq!(
        body["message"],
        "Please wait 24 hours before claiming another bonus"
    );
}

#[tokio::test]
async fn test_daily_bonus_delivery_failure_returns_code() {
    let server = server();
    let email = random_email();
    let session = login(&server.app, &email).await;
    server.mailer.set_failing(true);

    let (status, body) = send(&server.app, "POST", "/api/send-currency-code", Some(&session), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["code"].as_str().unwrap().starts_with("DAILY-"));
}

#[tokio::test]
async fn test_claim_credits_balance_once() {
    let server = server();
    let email = random_email();
    let session = login(&server.app, &email).await;

    // The welcome code is the only claimable code
    let (status, body) = send(&server.app, "POST", "/api/claim-currency-code", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amountAdded"], 1000);
    assert_eq!(body["previousBalance"], 0);
    assert_eq!(body["newBalance"], 1000);

    let (status, body) = send(&server.app, "POST", "/api/claim-currency-code", Some(&session), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_redeem_currency_code() {
    let server = server();
    let email = random_email();
    let (_, body) = post(
        &server.app,
        "/api/login",
        None,
        json!({ "providerToken": format!("valid:{email}") }),
    )
    .await;
    let session = body["token"].as_str().unwrap().to_string();
    let welcome = body["welcomeCode"].as_str().unwrap().to_string();

    let (status, body) = post(&server.app, "/api/redeem-currency-code", Some(&session), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No code provided");

    let (status, _) = post(
        &server.app,
        "/api/redeem-currency-code",
        Some(&session),
        json!({ "code": "WELCOME-NOTREAL1" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        &server.app,
        "/api/redeem-currency-code",
        Some(&session),
        json!({ "code": welcome }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], 1000);

    let (status, _) = post(
        &server.app,
        "/api/redeem-currency-code",
        Some(&session),
        json!({ "code": welcome }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_balance_validation() {
    let server = server();
    let email = random_email();
    let session = login(&server.app, &email).await;

    for bad in [json!("100"), json!(-5), json!(10.5), json!(null)] {
        let (status, body) = post(
            &server.app,
            "/api/update-balance",
            Some(&session),
            json!({ "balance": bad }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "balance {bad}");
        assert_eq!(body["success"], false);
    }

    let (status, body) = post(
        &server.app,
        "/api/update-balance",
        Some(&session),
        json!({ "balance": 2500 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newBalance"], 2500);
    assert_eq!(body["email"], email.as_str());

    let (_, body) = send(&server.app, "POST", "/api/claim-currency-code", Some(&session), None).await;
    assert_eq!(body["previousBalance"], 2500);
    assert_eq!(body["newBalance"], 3500);
}

#[tokio::test]
async fn test_claim_that_would_overflow_keeps_code() {
    let server = server();
    let email = random_email();
    let session = login(&server.app, &email).await;

    let (status, _) = post(
        &server.app,
        "/api/update-balance",
        Some(&session),
        json!({ "balance": i64::MAX }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&server.app, "POST", "/api/claim-currency-code", Some(&session), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Balance is too large to add this code");

    // The welcome code was not used up
    post(&server.app, "/api/update-balance", Some(&session), json!({ "balance": 0 })).await;
    let (status, body) = send(&server.app, "POST", "/api/claim-currency-code", Some(&session), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newBalance"], 1000);
}

// ===== Admin trigger =====

#[tokio::test]
async fn test_trigger_daily_bonus() {
    let server = server();
    for _ in 0..3 {
        login(&server.app, &random_email()).await;
    }

    let (status, _) = send(&server.app, "POST", "/api/trigger-daily-bonus", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("POST")
        .uri("/api/trigger-daily-bonus")
        .header("X-Admin-Key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["issued"], 3);
    assert_eq!(body["skipped"], 0);
    assert_eq!(body["failed"], 0);
}

#[tokio::test]
async fn test_trigger_hidden_without_admin_key() {
    let server = build_server(Arc::new(PrefixProvider), None, true);
    let request = Request::builder()
        .method("POST")
        .uri("/api/trigger-daily-bonus")
        .header("X-Admin-Key", "anything-at-all")
        .body(Body::empty())
        .unwrap();
    let response = server.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ===== Error bodies =====

#[tokio::test]
async fn test_error_details_hidden_in_production() {
    for expose in [true, false] {
        let server = build_server(Arc::new(PrefixProvider), None, expose);
        let email = random_email();
        let session = login(&server.app, &email).await;
        server.store.set_offline(true);

        let (status, body) = send(&server.app, "POST", "/api/claim-currency-code", Some(&session), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
        assert_eq!(body.get("error").is_some(), expose);
    }
}
