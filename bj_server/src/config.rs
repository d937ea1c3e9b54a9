//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.
//! Values are read through a lookup function so tests can supply their own
//! environment without touching the process.

use blackjack_rewards::db::DatabaseConfig;
use blackjack_rewards::mail::{SmtpConfig, SmtpTls};
use blackjack_rewards::rewards::{DailySchedule, RewardsConfig};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND: &str = "127.0.0.1:5000";

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Identity provider settings
    pub identity: IdentityConfig,
    /// SMTP settings; `None` leaves mail delivery disabled
    pub mail: Option<SmtpConfig>,
    /// Bonus amount and cooldown
    pub rewards: RewardsConfig,
    /// Daily bonus job
    pub daily_job: DailyJobConfig,
    /// Deployment environment
    pub environment: AppEnvironment,
    /// Prometheus listener; `None` disables the exporter
    pub metrics_bind: Option<SocketAddr>,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// HS256 signing secret for session tokens (required)
    pub jwt_secret: String,
    /// Lifetime of a full session token
    pub session_ttl: Duration,
    /// Lifetime of a pre-2FA token
    pub pre_two_factor_ttl: Duration,
    /// Key expected in `X-Admin-Key`; admin routes answer 404 without it
    pub admin_api_key: Option<String>,
}

/// Firebase project settings
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    pub firebase_project_id: Option<String>,
    /// Override for the JWKS endpoint
    pub jwks_url: Option<String>,
}

/// Daily bonus job settings
#[derive(Debug, Clone, Copy)]
pub struct DailyJobConfig {
    pub enabled: bool,
    pub schedule: DailySchedule,
}

/// Deployment environment, from `APP_ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Production,
}

impl AppEnvironment {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            AppEnvironment::Production
        } else {
            AppEnvironment::Development
        }
    }

    /// Whether internal error text may be sent to clients
    pub fn exposes_errors(&self) -> bool {
        *self != AppEnvironment::Production
    }
}

impl ServerConfig {
    /// Load configuration from process environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<ServerConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(
            |key| std::env::var(key).ok(),
            bind_override,
            database_url_override,
        )
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_lookup<F>(
        lookup: F,
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(|key: &str| lookup(key).filter(|v| !v.trim().is_empty()));

        // Bind address
        let bind = match bind_override {
            Some(bind) => bind,
            None => match (env.get("SERVER_BIND"), env.get("PORT")) {
                (Some(bind), _) => parse_var("SERVER_BIND", &bind)?,
                (None, Some(port)) => {
                    let port: u16 = parse_var("PORT", &port)?;
                    SocketAddr::from(([0, 0, 0, 0], port))
                }
                (None, None) => parse_var("SERVER_BIND", DEFAULT_BIND)?,
            },
        };

        // Database configuration
        let defaults = DatabaseConfig::development();
        let database = DatabaseConfig {
            database_url: database_url_override
                .or_else(|| env.get("DATABASE_URL"))
                .unwrap_or(defaults.database_url),
            max_connections: env.parse_or("DB_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: env.parse_or("DB_MIN_CONNECTIONS", defaults.min_connections)?,
            connection_timeout_secs: env
                .parse_or("DB_CONNECTION_TIMEOUT_SECS", defaults.connection_timeout_secs)?,
            idle_timeout_secs: env.parse_or("DB_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,
            max_lifetime_secs: env.parse_or("DB_MAX_LIFETIME_SECS", defaults.max_lifetime_secs)?,
            run_migrations: env.parse_or("DB_RUN_MIGRATIONS", defaults.run_migrations)?,
        };

        // Security configuration (REQUIRED)
        let jwt_secret = env.get("JWT_SECRET").ok_or(ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        let security = SecurityConfig {
            jwt_secret,
            session_ttl: env.duration_or("JWT_EXPIRES_IN", Duration::from_secs(3600))?,
            pre_two_factor_ttl: env.duration_or("PRE_2FA_TOKEN_TTL", Duration::from_secs(300))?,
            admin_api_key: env.get("ADMIN_API_KEY"),
        };

        let identity = IdentityConfig {
            firebase_project_id: env.get("FIREBASE_PROJECT_ID"),
            jwks_url: env.get("FIREBASE_JWKS_URL"),
        };

        // Mail is optional: without credentials the server runs with delivery disabled
        let username = env.get("SMTP_USERNAME").or_else(|| env.get("EMAIL_USER"));
        let password = env.get("SMTP_PASSWORD").or_else(|| env.get("EMAIL_PASS"));
        let mail = match (username, password) {
            (Some(username), Some(password)) => {
                let mut smtp = SmtpConfig::gmail(&username, &password);
                if let Some(host) = env.get("SMTP_HOST") {
                    smtp.host = host;
                }
                smtp.port = env.parse_or("SMTP_PORT", smtp.port)?;
                if let Some(tls) = env.get("SMTP_TLS") {
                    smtp.tls = SmtpTls::parse(&tls).ok_or_else(|| ConfigError::Invalid {
                        var: "SMTP_TLS".to_string(),
                        reason: format!("'{tls}' is not one of tls, starttls, none"),
                    })?;
                }
                smtp.from = env.get("SMTP_FROM");
                Some(smtp)
            }
            _ => None,
        };

        let bonus_amount = env.parse_or("BONUS_AMOUNT", RewardsConfig::default().bonus_amount)?;
        let cooldown_hours: i64 =
            env.parse_or("BONUS_COOLDOWN_HOURS", RewardsConfig::default().cooldown_hours())?;
        let rewards = RewardsConfig {
            bonus_amount,
            cooldown: chrono::Duration::hours(cooldown_hours),
        };

        let bonus_time = env.get("DAILY_BONUS_TIME").unwrap_or_else(|| "00:00".to_string());
        let offset = env.get("TZ_OFFSET").unwrap_or_else(|| "UTC".to_string());
        let schedule =
            DailySchedule::parse(&bonus_time, &offset).map_err(|e| ConfigError::Invalid {
                var: "DAILY_BONUS_TIME/TZ_OFFSET".to_string(),
                reason: e.to_string(),
            })?;
        let daily_job = DailyJobConfig {
            enabled: env.parse_or("DAILY_BONUS_JOB_ENABLED", true)?,
            schedule,
        };

        let environment = env
            .get("APP_ENV")
            .map(|v| AppEnvironment::parse(&v))
            .unwrap_or(AppEnvironment::Development);

        let metrics_bind = env
            .get("METRICS_BIND")
            .map(|v| parse_var("METRICS_BIND", &v))
            .transpose()?;

        Ok(ServerConfig {
            bind,
            database,
            security,
            identity,
            mail,
            rewards,
            daily_job,
            environment,
            metrics_bind,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.security.session_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                var: "JWT_EXPIRES_IN".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.security.pre_two_factor_ttl.is_zero()
            || self.security.pre_two_factor_ttl > self.security.session_ttl
        {
            return Err(ConfigError::Invalid {
                var: "PRE_2FA_TOKEN_TTL".to_string(),
                reason: format!(
                    "Must be greater than 0 and at most the session lifetime ({}s)",
                    self.security.session_ttl.as_secs()
                ),
            });
        }

        if self
            .security
            .admin_api_key
            .as_ref()
            .is_some_and(|key| key.len() < 16)
        {
            return Err(ConfigError::Invalid {
                var: "ADMIN_API_KEY".to_string(),
                reason: "Must be at least 16 characters".to_string(),
            });
        }

        if self.rewards.bonus_amount <= 0 {
            return Err(ConfigError::Invalid {
                var: "BONUS_AMOUNT".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.rewards.cooldown_hours() <= 0 {
            return Err(ConfigError::Invalid {
                var: "BONUS_COOLDOWN_HOURS".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.mail.as_ref().is_some_and(|mail| mail.port == 0) {
            return Err(ConfigError::Invalid {
                var: "SMTP_PORT".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string())
    }

    /// Parse a variable with default fallback; a present but malformed value is an error
    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
    {
        match self.get(key) {
            Some(value) => parse_var(key, &value),
            None => Ok(default),
        }
    }

    fn duration_or(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.get(key) {
            Some(value) => parse_duration(&value).ok_or_else(|| ConfigError::Invalid {
                var: key.to_string(),
                reason: format!("'{value}' is not a duration (e.g. 3600, 90s, 30m, 1h, 7d)"),
            }),
            None => Ok(default),
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        var: key.to_string(),
        reason: format!("could not parse '{value}'"),
    })
}

/// Parse `3600`, `90s`, `30m`, `1h` or `7d`
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let amount: u64 = digits.parse().ok()?;

    let multiplier = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        _ => return None,
    };
    amount.checked_mul(multiplier).map(Duration::from_secs)
}
