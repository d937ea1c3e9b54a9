//! Bonus code ledger: issuance, single-claim redemption and balance crediting.
//!
//! Players receive one welcome code at signup and may request one daily code
//! per cooldown window. Codes are e-mailed, then claimed (oldest first) to
//! credit the balance exactly once.
//!
//! ## Example
//!
//! ```no_run
//! use blackjack_rewards::db::{MemoryStore, Repositories};
//! use blackjack_rewards::mail::MemoryMailer;
//! use blackjack_rewards::rewards::{RewardsConfig, RewardsManager};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repos = Repositories::memory(MemoryStore::new());
//!     repos.users.insert_if_absent("player@example.com").await?;
//!
//!     let rewards = RewardsManager::new(&repos, Arc::new(MemoryMailer::new()), RewardsConfig::default());
//!     let bonus = rewards.issue_daily("player@example.com").await?;
//!     let receipt = rewards.claim("player@example.com").await?;
//!     assert_eq!(receipt.code, bonus.code);
//!     Ok(())
//! }
//! ```

pub mod codes;
pub mod cooldown;
pub mod errors;
pub mod manager;
pub mod models;
pub mod scheduler;

pub use errors::{RewardsError, RewardsResult};
pub use manager::RewardsManager;
pub use models::{
    BalanceChange, ClaimReceipt, CodeKind, CurrencyCode, DailyBonus, NewCurrencyCode,
    RewardsConfig, WelcomeBonus,
};
pub use scheduler::{DailyBonusJob, DailySchedule, JobReport, ScheduleError};
