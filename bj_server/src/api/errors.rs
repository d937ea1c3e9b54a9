//! Error responses for the HTTP API.
//!
//! Every failure is rendered as
//!
//! ```json
//! { "success": false, "message": "Invalid 2FA code", "error": "..." }
//! ```
//!
//! `message` is always safe to show a player. `error` carries the internal
//! error text and is omitted in production. Some failures add fields of their
//! own, such as `hoursRemaining` for an active cooldown.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use blackjack_rewards::{AuthError, RewardsError};
use serde::Serialize;
use serde_json::{Map, Value};

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// An HTTP status plus an [`ErrorResponse`]
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                success: false,
                message: message.into(),
                error: None,
                details: Map::new(),
            },
        }
    }

    /// Attach the internal error text when `expose` is set
    pub fn with_error(mut self, error: impl ToString, expose: bool) -> Self {
        if expose {
            self.body.error = Some(error.to_string());
        }
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.details.insert(key.to_string(), value.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Map an authentication failure
    pub fn from_auth(err: AuthError, expose: bool) -> Self {
        let status = match &err {
            AuthError::MissingField(_) | AuthError::InvalidTwoFactorCode => {
                StatusCode::BAD_REQUEST
            }
            AuthError::InvalidCredential
            | AuthError::TwoFactorRequired
            | AuthError::EmailMismatch => StatusCode::FORBIDDEN,
            AuthError::UserNotFound | AuthError::TwoFactorNotEnabled => StatusCode::NOT_FOUND,
            AuthError::VerificationTimeout | AuthError::ProviderUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AuthError::Jwt(_)
            | AuthError::Totp(_)
            | AuthError::Store(_)
            | AuthError::Registration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %err, "Authentication request failed");
        }

        ApiError::new(status, err.client_message()).with_error(&err, expose)
    }

    /// Map a ledger failure
    pub fn from_rewards(err: RewardsError, expose: bool) -> Self {
        let status = match &err {
            RewardsError::UserNotFound => StatusCode::NOT_FOUND,
            RewardsError::CooldownActive { .. }
            | RewardsError::NoClaimableCode
            | RewardsError::CodeNotFound
            | RewardsError::AlreadyClaimed
            | RewardsError::BalanceOverflow
            | RewardsError::InvalidBalance => StatusCode::BAD_REQUEST,
            RewardsError::DeliveryFailed { .. }
            | RewardsError::CodeGeneration
            | RewardsError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %err, "Ledger request failed");
        }

        let mut api_error = ApiError::new(status, err.client_message()).with_error(&err, expose);
        match &err {
            RewardsError::CooldownActive { hours_remaining } => {
                api_error = api_error.with_detail("hoursRemaining", *hours_remaining);
            }
            // The code exists and can still be claimed
            RewardsError::DeliveryFailed { code, .. } => {
                api_error = api_error.with_detail("code", code.clone());
            }
            _ => {}
        }
        api_error
    }

    /// Map a malformed JSON body
    pub fn from_json(rejection: JsonRejection, expose: bool) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, "Invalid request body")
            .with_error(rejection.body_text(), expose)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
