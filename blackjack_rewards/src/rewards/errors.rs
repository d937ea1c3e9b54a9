//! Bonus code ledger error types.

use thiserror::Error;

use crate::db::StoreError;

/// Ledger errors
#[derive(Debug, Error)]
pub enum RewardsError {
    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Daily bonus requested before the cooldown elapsed
    #[error("Please wait {hours_remaining} hours before claiming another bonus")]
    CooldownActive { hours_remaining: i64 },

    /// No unclaimed code left for the user
    #[error("No unclaimed currency codes found")]
    NoClaimableCode,

    /// Code string unknown for this user
    #[error("Invalid currency code")]
    CodeNotFound,

    /// Code already claimed
    #[error("Currency code already claimed")]
    AlreadyClaimed,

    /// Code issued but the notification could not be delivered
    #[error("Code generated but not emailed: {reason}")]
    DeliveryFailed { code: String, reason: String },

    /// Claiming the code would overflow the balance; the code stays unclaimed
    #[error("Balance is too large to add this code")]
    BalanceOverflow,

    /// Balance must be a non-negative integer
    #[error("Invalid balance value")]
    InvalidBalance,

    /// No unique code string found within the retry budget
    #[error("Could not generate a unique code")]
    CodeGeneration,

    /// Storage error
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl RewardsError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            RewardsError::Store(_) | RewardsError::CodeGeneration => {
                "Internal server error".to_string()
            }
            // Transport details stay in the logs
            RewardsError::DeliveryFailed { .. } => "Failed to send daily bonus email".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for ledger operations
pub type RewardsResult<T> = Result<T, RewardsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_message() {
        let err = RewardsError::CooldownActive { hours_remaining: 3 };
        assert_eq!(
            err.client_message(),
            "Please wait 3 hours before claiming another bonus"
        );
    }

    #[test]
    fn test_delivery_failure_hides_transport() {
        let err = RewardsError::DeliveryFailed {
            code: "DAILY-ABCD1234".to_string(),
            reason: "535 auth failed for smtp.internal".to_string(),
        };
        assert!(!err.client_message().contains("smtp.internal"));
    }
}
