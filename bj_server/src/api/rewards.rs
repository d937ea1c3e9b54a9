//! Bonus code API handlers.
//!
//! All routes except the admin trigger run behind
//! [`require_full_session`](super::middleware::require_full_session) and act
//! on the e-mail in the session token.

use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use blackjack_rewards::SessionClaims;
use blackjack_rewards::rewards::{DailyBonusJob, JobReport, RewardsError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::AppState;
use super::errors::ApiError;
use super::middleware::check_admin_key;
use super::request_id::RequestId;
use crate::metrics;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBonusResponse {
    pub success: bool,
    pub message: String,
    pub code: String,
    pub next_bonus_in: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub success: bool,
    pub message: String,
    pub code: String,
    pub amount_added: i64,
    pub previous_balance: i64,
    pub new_balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct RedeemPayload {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub success: bool,
    pub message: String,
    pub amount: i64,
}

/// `balance` is kept raw so that strings and fractions get a clean 400
#[derive(Debug, Deserialize)]
pub struct BalancePayload {
    #[serde(default)]
    pub balance: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub success: bool,
    pub message: String,
    pub new_balance: i64,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: JobReport,
}

/// Issue and e-mail today's bonus code.
///
/// # Response
///
/// ```json
/// { "success": true, "code": "DAILY-4FJ8K2QZ", "nextBonusIn": 24 }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Cooldown active; body carries `hoursRemaining`
/// - `404 Not Found`: Unknown user
/// - `500 Internal Server Error`: E-mail failed; body carries the issued `code`,
///   which stays claimable
pub async fn send_currency_code(
    State(state): State<AppState>,
    Extension(session): Extension<SessionClaims>,
) -> Result<Json<DailyBonusResponse>, ApiError> {
    let bonus = state
        .rewards_manager
        .issue_daily(&session.email)
        .await
        .map_err(|e| {
            if matches!(e, RewardsError::DeliveryFailed { .. }) {
                metrics::codes_issued_total("daily");
            }
            ApiError::from_rewards(e, state.expose_errors)
        })?;

    metrics::codes_issued_total("daily");
    Ok(Json(DailyBonusResponse {
        success: true,
        message: "Daily bonus sent successfully!".to_string(),
        code: bonus.code,
        next_bonus_in: bonus.next_bonus_in_hours,
    }))
}

/// Claim the oldest unclaimed code and credit its amount.
///
/// # Errors
///
/// - `400 Bad Request`: Nothing to claim
pub async fn claim_currency_code(
    State(state): State<AppState>,
    Extension(session): Extension<SessionClaims>,
) -> Result<Json<ClaimResponse>, ApiError> {
    let receipt = state
        .rewards_manager
        .claim(&session.email)
        .await
        .map_err(|e| ApiError::from_rewards(e, state.expose_errors))?;

    metrics::codes_claimed_total(receipt.amount_added);
    Ok(Json(ClaimResponse {
        success: true,
        message: "Currency code claimed successfully!".to_string(),
        code: receipt.code,
        amount_added: receipt.amount_added,
        previous_balance: receipt.previous_balance,
        new_balance: receipt.new_balance,
    }))
}

/// Mark a specific code as claimed and report its amount.
///
/// The balance is not changed; see `claim-currency-code` for crediting.
///
/// # Errors
///
/// - `400 Bad Request`: No code given, unknown code, or already claimed
pub async fn redeem_currency_code(
    State(state): State<AppState>,
    Extension(session): Extension<SessionClaims>,
    body: Result<Json<RedeemPayload>, JsonRejection>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let Json(payload) = body.map_err(|e| ApiError::from_json(e, state.expose_errors))?;
    let Some(code) = payload.code.filter(|c| !c.trim().is_empty()) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No code provided"));
    };

    let amount = state
        .rewards_manager
        .redeem(&session.email, &code)
        .await
        .map_err(|e| ApiError::from_rewards(e, state.expose_errors))?;

    Ok(Json(RedeemResponse {
        success: true,
        message: "Currency code redeemed successfully!".to_string(),
        amount,
    }))
}

/// Overwrite the caller's balance.
///
/// # Errors
///
/// - `400 Bad Request`: Missing, non-numeric, fractional or negative balance
pub async fn update_balance(
    State(state): State<AppState>,
    Extension(session): Extension<SessionClaims>,
    body: Result<Json<BalancePayload>, JsonRejection>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let Json(payload) = body.map_err(|e| ApiError::from_json(e, state.expose_errors))?;
    let balance = payload
        .balance
        .as_ref()
        .and_then(parse_balance)
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "Balance must be a number"))?;

    let new_balance = state
        .rewards_manager
        .set_balance(&session.email, balance)
        .await
        .map_err(|e| ApiError::from_rewards(e, state.expose_errors))?;

    Ok(Json(BalanceResponse {
        success: true,
        message: "Balance updated successfully".to_string(),
        new_balance,
        email: session.email,
    }))
}

/// Run the daily bonus batch now.
///
/// Requires `X-Admin-Key`; the route answers `404` when no admin key is
/// configured.
pub async fn trigger_daily_bonus(
    State(state): State<AppState>,
    request_id: RequestId,
    headers: HeaderMap,
) -> Result<Json<TriggerResponse>, ApiError> {
    check_admin_key(&state, &headers, &request_id)?;

    let report = DailyBonusJob::new(state.rewards_manager.as_ref().clone())
        .run_once()
        .await
        .map_err(|e| ApiError::from_rewards(e, state.expose_errors))?;

    metrics::daily_job_results(report.issued, report.skipped, report.failed);
    tracing::info!(
        issued = report.issued,
        skipped = report.skipped,
        failed = report.failed,
        "Daily bonus triggered manually"
    );

    Ok(Json(TriggerResponse {
        success: true,
        report,
    }))
}

/// Whole, JSON-numeric balance; `1000.0` counts as whole
fn parse_balance(value: &Value) -> Option<i64> {
    if let Some(n) = value.as_i64() {
        return Some(n);
    }
    let f = value.as_f64()?;
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Some(f as i64)
    } else {
        None
    }
}
