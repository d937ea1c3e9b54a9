//! In-process store used for local development (`DATABASE_URL=memory`) and tests.
//!
//! Each operation holds the state lock for its whole duration, which gives the
//! conditional writes the same all-or-nothing behavior as the SQL versions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::errors::{StoreError, StoreResult};
use super::repository::{CodeRepository, UserRepository};
use crate::auth::models::UserRecord;
use crate::rewards::models::{BalanceChange, CurrencyCode, NewCurrencyCode};

#[derive(Default)]
struct State {
    users: HashMap<String, UserRecord>,
    codes: Vec<CurrencyCode>,
    next_code_id: i64,
    offline: bool,
}

impl State {
    fn push_code(&mut self, code: &NewCurrencyCode) -> StoreResult<CurrencyCode> {
        if self.codes.iter().any(|c| c.code == code.code) {
            return Err(StoreError::Conflict(code.code.clone()));
        }

        self.next_code_id += 1;
        let record = CurrencyCode {
            id: self.next_code_id,
            code: code.code.clone(),
            email: code.email.clone(),
            amount: code.amount,
            kind: code.kind,
            claimed: false,
            email_sent: false,
            created_at: Utc::now(),
            claimed_at: None,
        };
        self.codes.push(record.clone());
        Ok(record)
    }
}

/// Shared in-memory implementation of both repository traits.
///
/// Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a full user record
    pub fn put_user(&self, user: UserRecord) {
        let mut state = self.lock();
        state.users.insert(user.email.clone(), user);
    }

    /// Make every subsequent operation fail, as if the database went away
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave a half-applied write
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn online(&self) -> StoreResult<MutexGuard<'_, State>> {
        let state = self.lock();
        if state.offline {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(state)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.online()?.users.get(email).cloned())
    }

    async fn insert_if_absent(&self, email: &str) -> StoreResult<bool> {
        let mut state = self.online()?;
        if state.users.contains_key(email) {
            return Ok(false);
        }
        state
            .users
            .insert(email.to_string(), UserRecord::new(email, Utc::now()));
        Ok(true)
    }

    async fn list_emails(&self) -> StoreResult<Vec<String>> {
        let state = self.online()?;
        let mut users: Vec<&UserRecord> = state.users.values().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.email.cmp(&b.email)));
        Ok(users.into_iter().map(|u| u.email.clone()).collect())
    }

    async fn enable_two_factor(
        &self,
        email: &str,
        secret: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.online()?;
        match state.users.get_mut(email) {
            Some(user) if !user.two_factor_enabled => {
                user.two_factor_enabled = true;
                user.two_factor_secret = Some(secret.to_string());
                user.two_factor_setup_at = Some(at);
                user.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn swap_last_bonus_at(
        &self,
        email: &str,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let mut state = self.online()?;
        match state.users.get_mut(email) {
            Some(user) if user.last_bonus_at == expected => {
                user.last_bonus_at = new;
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_bonus_email(&self, email: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.online()?;
        if let Some(user) = state.users.get_mut(email) {
            user.last_email_sent_at = Some(at);
            user.updated_at = at;
        }
        Ok(())
    }

    async fn set_balance(&self, email: &str, balance: i64) -> StoreResult<()> {
        let mut state = self.online()?;
        let now = Utc::now();
        let user = state
            .users
            .entry(email.to_string())
            .or_insert_with(|| UserRecord::new(email, now));

        user.balance = balance;
        user.balance_updated_at = Some(now);
        user.updated_at = now;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.online().map(|_| ())
    }
}

#[async_trait]
impl CodeRepository for MemoryStore {
    async fn insert_code(&self, code: &NewCurrencyCode) -> StoreResult<CurrencyCode> {
        let mut state = self.online()?;
        state.push_code(code)
    }

    async fn register_with_code(
        &self,
        code: &NewCurrencyCode,
    ) -> StoreResult<Option<CurrencyCode>> {
        let mut state = self.online()?;
        if state.users.contains_key(&code.email) {
            return Ok(None);
        }

        let record = state.push_code(code)?;
        state
            .users
            .insert(code.email.clone(), UserRecord::new(&code.email, record.created_at));
        Ok(Some(record))
    }

    async fn oldest_unclaimed(&self, email: &str) -> StoreResult<Option<CurrencyCode>> {
        let state = self.online()?;
        Ok(state
            .codes
            .iter()
            .filter(|c| c.email == email && !c.claimed)
            .min_by_key(|c| (c.created_at, c.id))
            .cloned())
    }

    async fn claim_and_credit(&self, id: i64) -> StoreResult<Option<BalanceChange>> {
        let mut guard = self.online()?;
        let state = &mut *guard;

        let Some(code) = state.codes.iter_mut().find(|c| c.id == id && !c.claimed) else {
            return Ok(None);
        };

        let now = Utc::now();
        let user = state
            .users
            .entry(code.email.clone())
            .or_insert_with(|| UserRecord::new(&code.email, now));

        // Checked before either write so an overflow leaves both untouched
        let previous_balance = user.balance;
        let new_balance = previous_balance
            .checked_add(code.amount)
            .ok_or_else(|| StoreError::BalanceOverflow(code.email.clone()))?;

        user.balance = new_balance;
        user.balance_updated_at = Some(now);
        user.updated_at = now;
        code.claimed = true;
        code.claimed_at = Some(now);

        Ok(Some(BalanceChange {
            previous_balance,
            new_balance,
        }))
    }

    async fn redeem_code(&self, email: &str, code: &str) -> StoreResult<Option<CurrencyCode>> {
        let mut state = self.online()?;
        match state
            .codes
            .iter_mut()
            .find(|c| c.email == email && c.code == code && !c.claimed)
        {
            Some(record) => {
                record.claimed = true;
                record.claimed_at = Some(Utc::now());
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn find_code(&self, email: &str, code: &str) -> StoreResult<Option<CurrencyCode>> {
        let state = self.online()?;
        Ok(state
            .codes
            .iter()
            .find(|c| c.email == email && c.code == code)
            .cloned())
    }

    async fn mark_email_sent(&self, id: i64) -> StoreResult<()> {
        let mut state = self.online()?;
        if let Some(code) = state.codes.iter_mut().find(|c| c.id == id) {
            code.email_sent = true;
        }
        Ok(())
    }

    async fn list_codes(&self, email: &str) -> StoreResult<Vec<CurrencyCode>> {
        let state = self.online()?;
        Ok(state
            .codes
            .iter()
            .filter(|c| c.email == email)
            .cloned()
            .collect())
    }
}
