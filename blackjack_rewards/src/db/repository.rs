//! Repository trait definitions for testability and dependency injection.
//!
//! The managers only talk to storage through [`UserRepository`] and
//! [`CodeRepository`]. Every state transition that can race (claiming a code,
//! reserving a cooldown window, enabling 2FA) is a conditional write that
//! reports whether it won. Writes that must land together (a new user and
//! its welcome code, a claimed code and the credit) share one transaction.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};

use super::errors::{StoreError, StoreResult};
use crate::auth::models::UserRecord;
use crate::rewards::models::{BalanceChange, CodeKind, CurrencyCode, NewCurrencyCode};

/// Trait for user record operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find user by e-mail
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>>;

    /// Create a fresh user record unless one already exists.
    ///
    /// Returns `true` when this call created the record.
    async fn insert_if_absent(&self, email: &str) -> StoreResult<bool>;

    /// E-mail addresses of every user, oldest first
    async fn list_emails(&self) -> StoreResult<Vec<String>>;

    /// Store the shared secret and switch 2FA on, only if it is still off.
    ///
    /// Returns `false` when 2FA was already enabled (or the user is missing).
    async fn enable_two_factor(
        &self,
        email: &str,
        secret: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Compare-and-set of `last_bonus_at`.
    ///
    /// Writes `new` only if the stored value still equals `expected`.
    async fn swap_last_bonus_at(
        &self,
        email: &str,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> StoreResult<bool>;

    /// Record that a daily bonus e-mail went out
    async fn record_bonus_email(&self, email: &str, at: DateTime<Utc>) -> StoreResult<()>;

    /// Overwrite the balance, creating the record if absent
    async fn set_balance(&self, email: &str, balance: i64) -> StoreResult<()>;

    /// Cheap liveness check
    async fn ping(&self) -> StoreResult<()>;
}

/// Trait for currency code operations
#[async_trait]
pub trait CodeRepository: Send + Sync {
    /// Insert a new unclaimed code.
    ///
    /// Fails with [`StoreError::Conflict`] if the code string is taken.
    async fn insert_code(&self, code: &NewCurrencyCode) -> StoreResult<CurrencyCode>;

    /// Create the owner's user record and its first code, as one unit.
    ///
    /// Returns `None`, writing nothing, when the user already exists. Fails
    /// with [`StoreError::Conflict`] if the code string is taken, in which case
    /// the user is not created either.
    async fn register_with_code(
        &self,
        code: &NewCurrencyCode,
    ) -> StoreResult<Option<CurrencyCode>>;

    /// Oldest unclaimed code of the user (FIFO by creation)
    async fn oldest_unclaimed(&self, email: &str) -> StoreResult<Option<CurrencyCode>>;

    /// Flip `claimed` to true and add the amount to the owner's balance, as one
    /// unit.
    ///
    /// Returns `None` when the code was already claimed. On any error neither
    /// the code nor the balance changes; a credit past `i64::MAX` fails with
    /// [`StoreError::BalanceOverflow`].
    async fn claim_and_credit(&self, id: i64) -> StoreResult<Option<BalanceChange>>;

    /// Claim a code by its string, scoped to its owner and unclaimed state
    async fn redeem_code(&self, email: &str, code: &str) -> StoreResult<Option<CurrencyCode>>;

    /// Find a code owned by `email` by its string
    async fn find_code(&self, email: &str, code: &str) -> StoreResult<Option<CurrencyCode>>;

    /// Mark delivery of a code as successful
    async fn mark_email_sent(&self, id: i64) -> StoreResult<()>;

    /// All codes of a user, in insertion order
    async fn list_codes(&self, email: &str) -> StoreResult<Vec<CurrencyCode>>;
}

fn naive(at: DateTime<Utc>) -> NaiveDateTime {
    at.naive_utc()
}

fn user_from_row(r: &PgRow) -> StoreResult<UserRecord> {
    Ok(UserRecord {
        email: r.try_get("email")?,
        balance: r.try_get("balance")?,
        last_bonus_at: r
            .try_get::<Option<NaiveDateTime>, _>("last_bonus_at")?
            .map(|dt| dt.and_utc()),
        two_factor_enabled: r.try_get("two_factor_enabled")?,
        two_factor_secret: r.try_get("two_factor_secret")?,
        two_factor_setup_at: r
            .try_get::<Option<NaiveDateTime>, _>("two_factor_setup_at")?
            .map(|dt| dt.and_utc()),
        last_email_sent_at: r
            .try_get::<Option<NaiveDateTime>, _>("last_email_sent_at")?
            .map(|dt| dt.and_utc()),
        balance_updated_at: r
            .try_get::<Option<NaiveDateTime>, _>("balance_updated_at")?
            .map(|dt| dt.and_utc()),
        created_at: r.try_get::<NaiveDateTime, _>("created_at")?.and_utc(),
        updated_at: r.try_get::<NaiveDateTime, _>("updated_at")?.and_utc(),
    })
}

fn code_from_row(r: &PgRow) -> StoreResult<CurrencyCode> {
    let tag: String = r.try_get("kind")?;
    let kind = CodeKind::parse(&tag).ok_or_else(|| {
        StoreError::Database(sqlx::Error::ColumnDecode {
            index: "kind".to_string(),
            source: format!("unknown code kind '{tag}'").into(),
        })
    })?;

    Ok(CurrencyCode {
        id: r.try_get("id")?,
        code: r.try_get("code")?,
        email: r.try_get("email")?,
        amount: r.try_get("amount")?,
        kind,
        claimed: r.try_get("claimed")?,
        email_sent: r.try_get("email_sent")?,
        created_at: r.try_get::<NaiveDateTime, _>("created_at")?.and_utc(),
        claimed_at: r
            .try_get::<Option<NaiveDateTime>, _>("claimed_at")?
            .map(|dt| dt.and_utc()),
    })
}

const USER_COLUMNS: &str = "email, balance, last_bonus_at, two_factor_enabled, two_factor_secret,
     two_factor_setup_at, last_email_sent_at, balance_updated_at, created_at, updated_at";

const CODE_COLUMNS: &str =
    "id, code, email, amount, kind, claimed, email_sent, created_at, claimed_at";

/// SQLSTATE raised when `bigint` arithmetic overflows
const NUMERIC_OUT_OF_RANGE: &str = "22003";

async fn insert_code_with(
    conn: &mut PgConnection,
    code: &NewCurrencyCode,
) -> StoreResult<CurrencyCode> {
    let result = sqlx::query(&format!(
        "INSERT INTO currency_codes (code, email, amount, kind)
         VALUES ($1, $2, $3, $4)
         RETURNING {CODE_COLUMNS}"
    ))
    .bind(&code.code)
    .bind(&code.email)
    .bind(code.amount)
    .bind(code.kind.as_str())
    .fetch_one(conn)
    .await;

    match result {
        Ok(row) => code_from_row(&row),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(StoreError::Conflict(code.code.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

/// PostgreSQL implementation of [`UserRepository`]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn insert_if_absent(&self, email: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (email, balance, two_factor_enabled)
            VALUES ($1, 0, FALSE)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_emails(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT email FROM users ORDER BY created_at, email")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| r.try_get("email").map_err(StoreError::from))
            .collect()
    }

    async fn enable_two_factor(
        &self,
        email: &str,
        secret: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET two_factor_enabled = TRUE,
                two_factor_secret = $2,
                two_factor_setup_at = $3,
                updated_at = $3
            WHERE email = $1 AND two_factor_enabled = FALSE
            "#,
        )
        .bind(email)
        .bind(secret)
        .bind(naive(at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn swap_last_bonus_at(
        &self,
        email: &str,
        expected: Option<DateTime<Utc>>,
        new: Option<DateTime<Utc>>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET last_bonus_at = $3,
                updated_at = NOW() AT TIME ZONE 'utc'
            WHERE email = $1 AND last_bonus_at IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(email)
        .bind(expected.map(naive))
        .bind(new.map(naive))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_bonus_email(&self, email: &str, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_email_sent_at = $2, updated_at = $2 WHERE email = $1")
            .bind(email)
            .bind(naive(at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_balance(&self, email: &str, balance: i64) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (email, balance, balance_updated_at)
            VALUES ($1, $2, NOW() AT TIME ZONE 'utc')
            ON CONFLICT (email) DO UPDATE
            SET balance = EXCLUDED.balance,
                balance_updated_at = EXCLUDED.balance_updated_at,
                updated_at = EXCLUDED.balance_updated_at
            "#,
        )
        .bind(email)
        .bind(balance)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// PostgreSQL implementation of [`CodeRepository`]
pub struct PgCodeRepository {
    pool: PgPool,
}

impl PgCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CodeRepository for PgCodeRepository {
    async fn insert_code(&self, code: &NewCurrencyCode) -> StoreResult<CurrencyCode> {
        let mut conn = self.pool.acquire().await?;
        insert_code_with(&mut conn, code).await
    }

    async fn register_with_code(
        &self,
        code: &NewCurrencyCode,
    ) -> StoreResult<Option<CurrencyCode>> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query(
            r#"
            INSERT INTO users (email, balance, two_factor_enabled)
            VALUES ($1, 0, FALSE)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(&code.email)
        .execute(&mut *tx)
        .await?;

        if created.rows_affected() == 0 {
            return Ok(None);
        }

        // An error here drops the transaction, which also removes the user row
        let record = insert_code_with(&mut tx, code).await?;
        tx.commit().await?;

        Ok(Some(record))
    }

    async fn oldest_unclaimed(&self, email: &str) -> StoreResult<Option<CurrencyCode>> {
        let row = sqlx::query(&format!(
            "SELECT {CODE_COLUMNS} FROM currency_codes
             WHERE email = $1 AND claimed = FALSE
             ORDER BY created_at, id
             LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(code_from_row).transpose()
    }

    async fn claim_and_credit(&self, id: i64) -> StoreResult<Option<BalanceChange>> {
        // Start transaction
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            r#"
            UPDATE currency_codes
            SET claimed = TRUE, claimed_at = NOW() AT TIME ZONE 'utc'
            WHERE id = $1 AND claimed = FALSE
            RETURNING email, amount
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        // Already claimed; dropping the transaction rolls it back
        let Some(row) = claimed else {
            return Ok(None);
        };
        let email: String = row.try_get("email")?;
        let amount: i64 = row.try_get("amount")?;

        let credited = sqlx::query(
            r#"
            INSERT INTO users (email, balance, balance_updated_at)
            VALUES ($1, $2, NOW() AT TIME ZONE 'utc')
            ON CONFLICT (email) DO UPDATE
            SET balance = users.balance + EXCLUDED.balance,
                balance_updated_at = EXCLUDED.balance_updated_at,
                updated_at = EXCLUDED.balance_updated_at
            RETURNING balance
            "#,
        )
        .bind(&email)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await;

        let new_balance: i64 = match credited {
            Ok(row) => row.try_get("balance")?,
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE) => {
                return Err(StoreError::BalanceOverflow(email));
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;

        Ok(Some(BalanceChange {
            previous_balance: new_balance - amount,
            new_balance,
        }))
    }

    async fn redeem_code(&self, email: &str, code: &str) -> StoreResult<Option<CurrencyCode>> {
        let row = sqlx::query(&format!(
            "UPDATE currency_codes
             SET claimed = TRUE, claimed_at = NOW() AT TIME ZONE 'utc'
             WHERE email = $1 AND code = $2 AND claimed = FALSE
             RETURNING {CODE_COLUMNS}"
        ))
        .bind(email)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(code_from_row).transpose()
    }

    async fn find_code(&self, email: &str, code: &str) -> StoreResult<Option<CurrencyCode>> {
        let row = sqlx::query(&format!(
            "SELECT {CODE_COLUMNS} FROM currency_codes WHERE email = $1 AND code = $2"
        ))
        .bind(email)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(code_from_row).transpose()
    }

    async fn mark_email_sent(&self, id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE currency_codes SET email_sent = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_codes(&self, email: &str) -> StoreResult<Vec<CurrencyCode>> {
        let rows = sqlx::query(&format!(
            "SELECT {CODE_COLUMNS} FROM currency_codes WHERE email = $1 ORDER BY id"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(code_from_row).collect()
    }
}
