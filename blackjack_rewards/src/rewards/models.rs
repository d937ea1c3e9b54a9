//! Bonus code ledger data models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Coins credited by every code issued today
pub const DEFAULT_BONUS_AMOUNT: i64 = 1000;

/// Hours between two daily bonuses
pub const DEFAULT_COOLDOWN_HOURS: i64 = 24;

/// Issuance path of a currency code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    Welcome,
    Daily,
    Test,
}

impl CodeKind {
    /// Stored tag
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::Welcome => "welcome",
            CodeKind::Daily => "daily",
            CodeKind::Test => "test",
        }
    }

    /// Human-readable prefix of generated code strings
    pub fn prefix(&self) -> &'static str {
        match self {
            CodeKind::Welcome => "WELCOME",
            CodeKind::Daily => "DAILY",
            CodeKind::Test => "TEST",
        }
    }

    /// Parse a stored tag
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "welcome" => Some(CodeKind::Welcome),
            "daily" => Some(CodeKind::Daily),
            "test" => Some(CodeKind::Test),
            _ => None,
        }
    }
}

impl std::fmt::Display for CodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Currency code record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyCode {
    pub id: i64,
    pub code: String,
    pub email: String,
    pub amount: i64,
    pub kind: CodeKind,
    pub claimed: bool,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Code about to be inserted
#[derive(Debug, Clone)]
pub struct NewCurrencyCode {
    pub code: String,
    pub email: String,
    pub amount: i64,
    pub kind: CodeKind,
}

/// Balance before and after an additive credit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub previous_balance: i64,
    pub new_balance: i64,
}

/// Result of a successful claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub code: String,
    pub amount_added: i64,
    pub previous_balance: i64,
    pub new_balance: i64,
}

/// Daily bonus issued and delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBonus {
    pub code: String,
    pub next_bonus_in_hours: i64,
}

/// Welcome bonus issued at first login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeBonus {
    pub code: String,
    pub email_sent: bool,
}

/// Ledger tunables
#[derive(Debug, Clone)]
pub struct RewardsConfig {
    /// Coins per issued code
    pub bonus_amount: i64,
    /// Minimum time between two daily bonuses
    pub cooldown: Duration,
}

impl RewardsConfig {
    /// Cooldown in whole hours
    pub fn cooldown_hours(&self) -> i64 {
        self.cooldown.num_hours()
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            bonus_amount: DEFAULT_BONUS_AMOUNT,
            cooldown: Duration::hours(DEFAULT_COOLDOWN_HOURS),
        }
    }
}
