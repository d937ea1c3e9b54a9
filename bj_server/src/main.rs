//! Blackjack rewards server.
//!
//! Serves the login, 2FA and bonus code API and runs the daily bonus job.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Error};
use blackjack_rewards::auth::{
    AuthManager, FirebaseIdentityProvider, IdentityProvider, RetryPolicy, SessionTokenIssuer,
    UnavailableIdentityProvider,
};
use blackjack_rewards::db::{Database, MemoryStore, Repositories, StoreBackend};
use blackjack_rewards::mail::{DisabledMailer, Mailer, SmtpMailer};
use blackjack_rewards::rewards::{DailyBonusJob, RewardsManager};
use bj_server::api;
use bj_server::config::ServerConfig;
use bj_server::{logging, metrics};
use pico_args::Arguments;
use tracing::{info, warn};

const HELP: &str = "\
Run the Blackjack rewards server

USAGE:
  bj_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND, PORT or 127.0.0.1:5000]
  --db-url     URL         Database connection string, or `memory`  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  JWT_SECRET               Session token signing secret (required, 32+ chars)
  DATABASE_URL             PostgreSQL connection string
  FIREBASE_PROJECT_ID      Firebase project whose ID tokens are accepted
  SMTP_USERNAME/PASSWORD   Mail credentials (EMAIL_USER/EMAIL_PASS also accepted)
  ADMIN_API_KEY            Enables POST /api/trigger-daily-bonus
  APP_ENV                  `production` hides internal error details
  (See .env.example for all configuration options)
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind: Option<SocketAddr> = pargs
        .opt_value_from_str("--bind")
        .context("Invalid --bind address")?;
    let database_url: Option<String> = pargs
        .opt_value_from_str("--db-url")
        .context("Invalid --db-url")?;

    logging::init();

    let config = ServerConfig::from_env(bind, database_url)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(Error::msg)?;
        info!("Prometheus metrics listening on {}", addr);
    }

    // Storage
    let (database, repos) = match config.database.backend() {
        StoreBackend::Postgres => {
            info!("Connecting to database: {}", config.database.redacted_url());
            let db = Database::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            info!("Database connected successfully");
            let repos = db.repositories();
            (Some(db), repos)
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory store; all data is lost on restart");
            (None, Repositories::memory(MemoryStore::new()))
        }
    };

    // Identity provider
    let provider: Arc<dyn IdentityProvider> = match &config.identity.firebase_project_id {
        Some(project_id) => {
            info!("Accepting Firebase ID tokens for project {}", project_id);
            Arc::new(FirebaseIdentityProvider::new(
                project_id,
                config.identity.jwks_url.clone(),
            ))
        }
        None => {
            warn!("FIREBASE_PROJECT_ID not set; provider logins are disabled");
            Arc::new(UnavailableIdentityProvider)
        }
    };

    // Mail
    let mailer: Arc<dyn Mailer> = match &config.mail {
        Some(smtp) => match SmtpMailer::new(smtp) {
            Ok(mailer) => {
                let checker = mailer.clone();
                tokio::spawn(async move {
                    match checker.test_connection().await {
                        Ok(true) => info!("SMTP relay reachable"),
                        Ok(false) => warn!("SMTP relay rejected the connection test"),
                        Err(e) => warn!("SMTP relay unreachable: {}", e),
                    }
                });
                Arc::new(mailer)
            }
            Err(e) => {
                warn!("Mail disabled, SMTP configuration rejected: {}", e);
                Arc::new(DisabledMailer)
            }
        },
        None => {
            warn!("SMTP credentials not set; bonus e-mails are disabled");
            Arc::new(DisabledMailer)
        }
    };
    let mail_configured = mailer.is_configured();

    // Managers
    let rewards_manager = RewardsManager::new(&repos, mailer, config.rewards.clone());
    let tokens = SessionTokenIssuer::new(
        &config.security.jwt_secret,
        chrono::Duration::from_std(config.security.session_ttl)
            .context("JWT_EXPIRES_IN out of range")?,
        chrono::Duration::from_std(config.security.pre_two_factor_ttl)
            .context("PRE_2FA_TOKEN_TTL out of range")?,
    );
    let auth_manager = AuthManager::new(
        &repos,
        provider,
        tokens,
        RetryPolicy::default(),
        rewards_manager.clone(),
    );

    let daily_job = if config.daily_job.enabled {
        info!("Daily bonus job enabled");
        Some(DailyBonusJob::new(rewards_manager.clone()).spawn(config.daily_job.schedule))
    } else {
        None
    };

    let api_state = api::AppState {
        auth_manager: Arc::new(auth_manager),
        rewards_manager: Arc::new(rewards_manager),
        users: repos.users.clone(),
        mail_configured,
        daily_job_enabled: daily_job.is_some(),
        admin_api_key: config.security.admin_api_key.as_deref().map(Arc::from),
        expose_errors: config.environment.exposes_errors(),
    };

    let app = api::create_router(api_state);

    // Start HTTP server
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");

    if let Some(job) = daily_job {
        job.abort();
    }
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
