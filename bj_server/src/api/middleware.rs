//! Authentication middleware for protected endpoints.
//!
//! [`require_full_session`] guards the ledger routes: it accepts only
//! self-issued session tokens whose `twoFAVerified` flag is set, and injects
//! the decoded [`SessionClaims`] into request extensions for the handlers.
//!
//! # Extracting the session
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use blackjack_rewards::SessionClaims;
//!
//! async fn protected_handler(Extension(session): Extension<SessionClaims>) -> String {
//!     format!("Authenticated as {}", session.email)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use blackjack_rewards::SessionClaims;
use subtle::ConstantTimeEq;

use super::AppState;
use super::errors::ApiError;
use super::request_id::RequestId;
use crate::logging::log_security_event;

/// Header carrying the operator key for admin routes
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// Bearer token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware that requires a full (2FA verified) session token
///
/// # Behavior
///
/// - **Success**: Injects `SessionClaims` into request extensions and calls the next handler
/// - **Missing header**: Returns `401 Unauthorized`
/// - **Invalid/expired token**: Returns `403 Forbidden`
/// - **Pre-2FA token**: Returns `403 Forbidden` with "Two-factor authentication required"
pub async fn require_full_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return ApiError::new(StatusCode::UNAUTHORIZED, "Authorization token required")
            .into_response();
    };

    match state.auth_manager.require_full_session(token) {
        Ok(claims) => {
            request.extensions_mut().insert::<SessionClaims>(claims);
            next.run(request).await
        }
        Err(e) => {
            let request_id = request.extensions().get::<RequestId>();
            log_security_event(
                "session_rejected",
                None,
                request_id.map(RequestId::as_str),
                &format!("{} {}: {}", request.method(), request.uri().path(), e),
            );
            ApiError::from_auth(e, state.expose_errors).into_response()
        }
    }
}

/// Compare the `X-Admin-Key` header with the configured key in constant time
///
/// # Returns
///
/// * `Ok(())` - Key matches
/// * `Err(ApiError)` - `404` when no key is configured, `403` on mismatch
pub fn check_admin_key(
    state: &AppState,
    headers: &HeaderMap,
    request_id: &RequestId,
) -> Result<(), ApiError> {
    let Some(expected) = state.admin_api_key.as_deref() else {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "Not found"));
    };

    let provided = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        log_security_event(
            "admin_key_rejected",
            None,
            Some(request_id.as_str()),
            "Invalid admin key",
        );
        Err(ApiError::new(StatusCode::FORBIDDEN, "Invalid admin key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
