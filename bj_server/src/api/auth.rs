//! Authentication API handlers.
//!
//! - Login with a Firebase ID token (first login creates the account and
//!   issues the welcome bonus)
//! - Verify that a provider token belongs to an existing account
//! - Complete a 2FA login with a TOTP code
//! - Enroll in 2FA
//!
//! # Examples
//!
//! Login:
//! ```bash
//! curl -X POST http://localhost:5000/api/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"providerToken": "<firebase id token>"}'
//! ```
//!
//! Finish a 2FA login:
//! ```bash
//! curl -X POST http://localhost:5000/api/verify-2fa \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "player@example.com", "code": "123456", "tempToken": "<temp token>"}'
//! ```

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use blackjack_rewards::auth::{AuthError, LoginOutcome, TwoFactorSetup};
use serde::{Deserialize, Serialize};

use super::AppState;
use super::errors::ApiError;
use super::middleware::bearer_token;
use super::request_id::RequestId;
use crate::logging::log_security_event;
use crate::metrics;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    #[serde(default, alias = "firebaseToken")]
    pub provider_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "requires2FA")]
    pub requires_2fa: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new_user: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub welcome_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub welcome_email_sent: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTokenPayload {
    #[serde(default, alias = "firebaseToken")]
    pub provider_token: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyTokenResponse {
    pub success: bool,
    pub verified: bool,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTwoFactorPayload {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "token")]
    pub code: Option<String>,
    #[serde(default)]
    pub temp_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupTwoFactorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otpauth_url: Option<String>,
}

/// Log in with a Firebase ID token.
///
/// # Request Body
///
/// ```json
/// { "providerToken": "eyJhbGciOiJSUzI1NiIs..." }
/// ```
///
/// `firebaseToken` is accepted as an alias.
///
/// # Response
///
/// New or returning user without 2FA:
/// ```json
/// { "success": true, "token": "...", "requires2FA": false, "isNewUser": true, "welcomeCode": "WELCOME-7KQ2M9XA" }
/// ```
///
/// Returning user with 2FA:
/// ```json
/// { "success": true, "requires2FA": true, "tempToken": "..." }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: No token provided
/// - `403 Forbidden`: Token rejected by the provider
/// - `503 Service Unavailable`: Provider unreachable or timed out
pub async fn login(
    State(state): State<AppState>,
    request_id: RequestId,
    body: Result<Json<LoginPayload>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(payload) = body.map_err(|e| ApiError::from_json(e, state.expose_errors))?;
    let provider_token = payload.provider_token.unwrap_or_default();

    let outcome = match state.auth_manager.login(&provider_token).await {
        Ok(outcome) => outcome,
        Err(e) => {
            metrics::login_attempts_total("failed");
            if matches!(e, AuthError::InvalidCredential) {
                log_security_event(
                    "login_failed",
                    None,
                    Some(request_id.as_str()),
                    "Provider token rejected",
                );
            }
            return Err(ApiError::from_auth(e, state.expose_errors));
        }
    };

    let response = match outcome {
        LoginOutcome::NewUser {
            token,
            welcome_code,
            welcome_email_sent,
        } => {
            metrics::login_attempts_total("new_user");
            metrics::codes_issued_total("welcome");
            LoginResponse {
                success: true,
                message: "Welcome! Your account has been created".to_string(),
                requires_2fa: false,
                token: Some(token),
                temp_token: None,
                is_new_user: Some(true),
                welcome_code: Some(welcome_code),
                welcome_email_sent: Some(welcome_email_sent),
            }
        }
        LoginOutcome::TwoFactorRequired { temp_token } => {
            metrics::login_attempts_total("2fa_required");
            LoginResponse {
                success: true,
                message: "2FA verification required".to_string(),
                requires_2fa: true,
                token: None,
                temp_token: Some(temp_token),
                is_new_user: None,
                welcome_code: None,
                welcome_email_sent: None,
            }
        }
        LoginOutcome::Returning { token } => {
            metrics::login_attempts_total("returning");
            LoginResponse {
                success: true,
                message: "Login successful".to_string(),
                requires_2fa: false,
                token: Some(token),
                temp_token: None,
                is_new_user: Some(false),
                welcome_code: None,
                welcome_email_sent: None,
            }
        }
    };

    Ok(Json(response))
}

/// Check that a provider token belongs to `email` and the account exists.
///
/// # Errors
///
/// - `400 Bad Request`: Token or e-mail missing
/// - `403 Forbidden`: Token rejected, or issued for another e-mail
/// - `404 Not Found`: No account for `email`
pub async fn verify_token(
    State(state): State<AppState>,
    request_id: RequestId,
    body: Result<Json<VerifyTokenPayload>, JsonRejection>,
) -> Result<Json<VerifyTokenResponse>, ApiError> {
    let Json(payload) = body.map_err(|e| ApiError::from_json(e, state.expose_errors))?;

    let identity = state
        .auth_manager
        .verify_token(
            payload.provider_token.as_deref().unwrap_or_default(),
            payload.email.as_deref().unwrap_or_default(),
        )
        .await
        .map_err(|e| {
            if matches!(e, AuthError::EmailMismatch) {
                log_security_event(
                    "token_email_mismatch",
                    payload.email.as_deref(),
                    Some(request_id.as_str()),
                    "Provider token presented for another account",
                );
            }
            ApiError::from_auth(e, state.expose_errors)
        })?;

    Ok(Json(VerifyTokenResponse {
        success: true,
        verified: true,
        email: identity.email,
    }))
}

/// Exchange a pre-2FA token and a TOTP code for a full session token.
///
/// # Request Body
///
/// ```json
/// { "email": "player@example.com", "code": "123456", "tempToken": "..." }
/// ```
///
/// `token` is accepted as an alias of `code`.
///
/// # Errors
///
/// - `400 Bad Request`: Missing fields or wrong code
/// - `403 Forbidden`: Temp token invalid, expired or for another e-mail
/// - `404 Not Found`: Unknown user or 2FA not set up
pub async fn verify_two_factor(
    State(state): State<AppState>,
    request_id: RequestId,
    body: Result<Json<VerifyTwoFactorPayload>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(payload) = body.map_err(|e| ApiError::from_json(e, state.expose_errors))?;
    let email = payload.email.unwrap_or_default();

    match state
        .auth_manager
        .verify_two_factor(
            &email,
            payload.code.as_deref().unwrap_or_default(),
            payload.temp_token.as_deref().unwrap_or_default(),
        )
        .await
    {
        Ok(token) => {
            metrics::two_factor_verifications_total(true);
            Ok(Json(TokenResponse {
                success: true,
                message: "2FA verified successfully".to_string(),
                token,
            }))
        }
        Err(e) => {
            if matches!(e, AuthError::InvalidTwoFactorCode | AuthError::EmailMismatch) {
                metrics::two_factor_verifications_total(false);
                log_security_event(
                    "2fa_failed",
                    Some(&email),
                    Some(request_id.as_str()),
                    &e.to_string(),
                );
            }
            Err(ApiError::from_auth(e, state.expose_errors))
        }
    }
}

/// Enroll the caller in 2FA.
///
/// Accepts `Authorization: Bearer` with either a provider token or any
/// self-issued token (pre-2FA included). 2FA is active as soon as this
/// returns; the response carries the only copy of the secret.
///
/// # Errors
///
/// - `401 Unauthorized`: No bearer token
/// - `403 Forbidden`: Token invalid
/// - `404 Not Found`: No account for the token's e-mail
pub async fn setup_two_factor(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SetupTwoFactorResponse>, ApiError> {
    let Some(bearer) = bearer_token(&headers) else {
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "Authorization token required",
        ));
    };

    let setup = state
        .auth_manager
        .setup_two_factor(bearer)
        .await
        .map_err(|e| ApiError::from_auth(e, state.expose_errors))?;

    let response = match setup {
        TwoFactorSetup::AlreadyEnabled => SetupTwoFactorResponse {
            success: true,
            message: "2FA already enabled".to_string(),
            already_enabled: Some(true),
            qr_code: None,
            secret: None,
            otpauth_url: None,
        },
        TwoFactorSetup::Enrolled {
            secret,
            otpauth_url,
            qr_code,
        } => SetupTwoFactorResponse {
            success: true,
            message: "2FA setup successful".to_string(),
            already_enabled: None,
            qr_code: Some(qr_code),
            secret: Some(secret),
            otpauth_url: Some(otpauth_url),
        },
    };

    Ok(Json(response))
}
