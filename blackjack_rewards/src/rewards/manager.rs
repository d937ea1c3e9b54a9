//! Bonus code ledger implementation.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::{
    codes::{generate_code, normalize_code},
    cooldown::cooldown_remaining,
    errors::{RewardsError, RewardsResult},
    models::{
        ClaimReceipt, CodeKind, CurrencyCode, DailyBonus, NewCurrencyCode, RewardsConfig,
        WelcomeBonus,
    },
};
use crate::db::{CodeRepository, Repositories, StoreError, UserRepository};
use crate::mail::{Mailer, templates};

/// Fresh code strings tried before giving up on a collision streak
const MAX_CODE_ATTEMPTS: usize = 5;

/// Codes tried by one claim before reporting nothing claimable
const MAX_CLAIM_ATTEMPTS: usize = 8;

/// Bonus code ledger
#[derive(Clone)]
pub struct RewardsManager {
    users: Arc<dyn UserRepository>,
    codes: Arc<dyn CodeRepository>,
    mailer: Arc<dyn Mailer>,
    config: RewardsConfig,
}

impl RewardsManager {
    /// Create a new ledger
    ///
    /// # Arguments
    ///
    /// * `repos` - User and code repositories
    /// * `mailer` - Bonus notification transport
    /// * `config` - Bonus amount and cooldown
    pub fn new(repos: &Repositories, mailer: Arc<dyn Mailer>, config: RewardsConfig) -> Self {
        Self {
            users: repos.users.clone(),
            codes: repos.codes.clone(),
            mailer,
            config,
        }
    }

    /// Ledger tunables
    pub fn config(&self) -> &RewardsConfig {
        &self.config
    }

    /// Cooldown in whole hours
    pub fn cooldown_hours(&self) -> i64 {
        self.config.cooldown_hours()
    }

    fn new_code(&self, email: &str, kind: CodeKind) -> NewCurrencyCode {
        NewCurrencyCode {
            code: generate_code(kind),
            email: email.to_string(),
            amount: self.config.bonus_amount,
            kind,
        }
    }

    /// Insert a fresh code, retrying on code string collisions
    async fn mint(&self, email: &str, kind: CodeKind) -> RewardsResult<CurrencyCode> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            match self.codes.insert_code(&self.new_code(email, kind)).await {
                Ok(code) => return Ok(code),
                Err(StoreError::Conflict(existing)) => {
                    log::warn!("Code collision on {}, regenerating", existing);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RewardsError::CodeGeneration)
    }

    /// Create the user record together with its welcome code
    ///
    /// Both are written as one unit, so a user never exists without a welcome
    /// code. The e-mail is best effort and its outcome is reported in
    /// [`WelcomeBonus::email_sent`].
    ///
    /// # Returns
    ///
    /// * `RewardsResult<Option<WelcomeBonus>>` - `None` if the user already existed
    ///
    /// # Errors
    ///
    /// * `RewardsError::Store` - Nothing was written
    /// * `RewardsError::CodeGeneration` - Every code string tried was taken
    pub async fn register(&self, email: &str) -> RewardsResult<Option<WelcomeBonus>> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let new_code = self.new_code(email, CodeKind::Welcome);
            match self.codes.register_with_code(&new_code).await {
                Ok(Some(code)) => return Ok(Some(self.send_welcome(code).await)),
                Ok(None) => return Ok(None),
                Err(StoreError::Conflict(existing)) => {
                    log::warn!("Code collision on {}, regenerating", existing);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RewardsError::CodeGeneration)
    }

    async fn send_welcome(&self, code: CurrencyCode) -> WelcomeBonus {
        let mail = templates::welcome_bonus(
            &code.email,
            &code.code,
            code.amount,
            self.config.cooldown_hours(),
        );
        let email_sent = match self.mailer.send(&mail).await {
            Ok(()) => {
                if let Err(e) = self.codes.mark_email_sent(code.id).await {
                    log::warn!("Failed to flag welcome code {} as emailed: {}", code.id, e);
                }
                true
            }
            Err(e) => {
                log::warn!("Welcome bonus e-mail not delivered: {}", e);
                false
            }
        };

        WelcomeBonus {
            code: code.code,
            email_sent,
        }
    }

    /// Issue the daily bonus now
    pub async fn issue_daily(&self, email: &str) -> RewardsResult<DailyBonus> {
        self.issue_daily_at(email, Utc::now()).await
    }

    /// Issue the daily bonus as of `now`
    ///
    /// The cooldown window is reserved with a compare-and-set on
    /// `last_bonus_at` before the code is minted, and handed back if the
    /// e-mail cannot be delivered. The minted code survives a delivery
    /// failure and stays claimable.
    ///
    /// # Errors
    ///
    /// * `RewardsError::UserNotFound` - No record for `email`
    /// * `RewardsError::CooldownActive` - Window not elapsed, or lost to a concurrent request
    /// * `RewardsError::DeliveryFailed` - Code minted but the e-mail failed
    pub async fn issue_daily_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> RewardsResult<DailyBonus> {
        self.issue_daily_after(email, now, self.config.cooldown).await
    }

    /// Issue the daily bonus for a scheduled batch run
    ///
    /// Same as [`issue_daily_at`](Self::issue_daily_at), except a window that
    /// is within `grace` of elapsing counts as elapsed.
    pub async fn issue_scheduled_daily(
        &self,
        email: &str,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> RewardsResult<DailyBonus> {
        let cooldown = (self.config.cooldown - grace).max(Duration::zero());
        self.issue_daily_after(email, now, cooldown).await
    }

    async fn issue_daily_after(
        &self,
        email: &str,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> RewardsResult<DailyBonus> {
        // Storage keeps microseconds; compare-and-set needs the exact stored value
        let now = DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now);

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(RewardsError::UserNotFound)?;

        let previous = user.last_bonus_at;
        if let Some(hours_remaining) = cooldown_remaining(previous, now, cooldown) {
            return Err(RewardsError::CooldownActive { hours_remaining });
        }

        if !self
            .users
            .swap_last_bonus_at(email, previous, Some(now))
            .await?
        {
            let current = self
                .users
                .find_by_email(email)
                .await?
                .and_then(|u| u.last_bonus_at);
            let hours_remaining = cooldown_remaining(current, now, cooldown)
                .unwrap_or_else(|| self.config.cooldown_hours());
            return Err(RewardsError::CooldownActive { hours_remaining });
        }

        let code = match self.mint(email, CodeKind::Daily).await {
            Ok(code) => code,
            Err(e) => {
                self.release_window(email, now, previous).await;
                return Err(e);
            }
        };

        let mail = templates::daily_bonus(email, &code.code, code.amount);
        if let Err(e) = self.mailer.send(&mail).await {
            log::warn!("Daily bonus e-mail not delivered, releasing cooldown: {}", e);
            self.release_window(email, now, previous).await;
            return Err(RewardsError::DeliveryFailed {
                code: code.code,
                reason: e.to_string(),
            });
        }

        if let Err(e) = self.codes.mark_email_sent(code.id).await {
            log::warn!("Failed to flag daily code {} as emailed: {}", code.id, e);
        }
        if let Err(e) = self.users.record_bonus_email(email, now).await {
            log::warn!("Failed to record bonus e-mail timestamp: {}", e);
        }

        Ok(DailyBonus {
            code: code.code,
            next_bonus_in_hours: self.config.cooldown_hours(),
        })
    }

    /// Undo a cooldown reservation made at `reserved_at`
    async fn release_window(
        &self,
        email: &str,
        reserved_at: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) {
        match self
            .users
            .swap_last_bonus_at(email, Some(reserved_at), previous)
            .await
        {
            Ok(true) => {}
            Ok(false) => log::warn!("Cooldown reservation changed before release"),
            Err(e) => log::error!("Failed to release cooldown reservation: {}", e),
        }
    }

    /// Claim the oldest unclaimed code and credit its amount
    ///
    /// The code is marked claimed and the balance credited together; if the
    /// credit fails the code stays claimable.
    ///
    /// # Errors
    ///
    /// * `RewardsError::NoClaimableCode` - Nothing left to claim
    /// * `RewardsError::BalanceOverflow` - Balance too large to take the amount
    pub async fn claim(&self, email: &str) -> RewardsResult<ClaimReceipt> {
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let Some(code) = self.codes.oldest_unclaimed(email).await? else {
                return Err(RewardsError::NoClaimableCode);
            };

            let change = match self.codes.claim_and_credit(code.id).await {
                Ok(Some(change)) => change,
                // Claimed concurrently; move on to the next one
                Ok(None) => continue,
                Err(StoreError::BalanceOverflow(_)) => return Err(RewardsError::BalanceOverflow),
                Err(e) => return Err(e.into()),
            };
            log::info!(
                "Claimed {} code worth {} (balance {} -> {})",
                code.kind,
                code.amount,
                change.previous_balance,
                change.new_balance
            );

            return Ok(ClaimReceipt {
                code: code.code,
                amount_added: code.amount,
                previous_balance: change.previous_balance,
                new_balance: change.new_balance,
            });
        }

        Err(RewardsError::NoClaimableCode)
    }

    /// Mark a specific code as claimed without crediting the balance
    ///
    /// # Returns
    ///
    /// * `RewardsResult<i64>` - Amount the code was worth
    ///
    /// # Errors
    ///
    /// * `RewardsError::CodeNotFound` - Empty or unknown code
    /// * `RewardsError::AlreadyClaimed` - Code was claimed before
    pub async fn redeem(&self, email: &str, code: &str) -> RewardsResult<i64> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(RewardsError::CodeNotFound);
        }

        if let Some(redeemed) = self.codes.redeem_code(email, code).await? {
            return Ok(redeemed.amount);
        }

        match self.codes.find_code(email, code).await? {
            Some(existing) if existing.claimed => Err(RewardsError::AlreadyClaimed),
            _ => Err(RewardsError::CodeNotFound),
        }
    }

    /// Overwrite the balance
    ///
    /// # Errors
    ///
    /// * `RewardsError::InvalidBalance` - Negative value
    pub async fn set_balance(&self, email: &str, balance: i64) -> RewardsResult<i64> {
        if balance < 0 {
            return Err(RewardsError::InvalidBalance);
        }
        self.users.set_balance(email, balance).await?;
        Ok(balance)
    }

    /// Current balance, zero for unknown users
    pub async fn balance(&self, email: &str) -> RewardsResult<i64> {
        Ok(self
            .users
            .find_by_email(email)
            .await?
            .map(|u| u.balance)
            .unwrap_or(0))
    }

    /// Mint a code without e-mail and without touching the cooldown
    pub async fn issue_test_code(&self, email: &str) -> RewardsResult<CurrencyCode> {
        if self.users.find_by_email(email).await?.is_none() {
            return Err(RewardsError::UserNotFound);
        }
        self.mint(email, CodeKind::Test).await
    }

    /// Every code of a user, oldest first
    pub async fn codes(&self, email: &str) -> RewardsResult<Vec<CurrencyCode>> {
        Ok(self.codes.list_codes(email).await?)
    }

    /// Every known user e-mail
    pub async fn user_emails(&self) -> RewardsResult<Vec<String>> {
        Ok(self.users.list_emails().await?)
    }
}
