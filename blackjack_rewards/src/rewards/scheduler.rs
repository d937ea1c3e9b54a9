//! Daily bonus batch job and its wall-clock scheduler.

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Offset, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::errors::{RewardsError, RewardsResult};
use super::manager::RewardsManager;

/// Schedule parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("invalid UTC offset '{0}', expected +HH:MM, -HH:MM or UTC")]
    InvalidOffset(String),
}

/// Fixed time of day in a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    pub time: NaiveTime,
    pub offset: FixedOffset,
}

impl DailySchedule {
    /// Midnight UTC
    pub fn midnight_utc() -> Self {
        Self {
            time: NaiveTime::MIN,
            offset: Utc.fix(),
        }
    }

    /// Parse `HH:MM` (or `HH:MM:SS`) and an offset such as `+05:30` or `UTC`
    pub fn parse(time: &str, offset: &str) -> Result<Self, ScheduleError> {
        let time_str = time.trim();
        let time = NaiveTime::parse_from_str(time_str, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(time_str, "%H:%M:%S"))
            .map_err(|_| ScheduleError::InvalidTime(time_str.to_string()))?;

        Ok(Self {
            time,
            offset: parse_offset(offset)?,
        })
    }

    /// First run strictly after `now`
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        let local_now = now.naive_utc() + offset;

        let mut candidate = local_now.date().and_time(self.time);
        if candidate <= local_now {
            candidate += Duration::days(1);
        }
        (candidate - offset).and_utc()
    }
}

fn parse_offset(value: &str) -> Result<FixedOffset, ScheduleError> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("utc") || value.eq_ignore_ascii_case("z") {
        return Ok(Utc.fix());
    }
    value
        .parse::<FixedOffset>()
        .map_err(|_| ScheduleError::InvalidOffset(value.to_string()))
}

/// Outcome of one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    /// Bonuses issued and e-mailed
    pub issued: usize,
    /// Users still inside their cooldown
    pub skipped: usize,
    /// Users whose issuance failed
    pub failed: usize,
}

/// Slack allowed on the cooldown for users reached by a batch run
pub const DEFAULT_RUN_GRACE_MINUTES: i64 = 5;

/// Issues the daily bonus to every user
#[derive(Clone)]
pub struct DailyBonusJob {
    rewards: RewardsManager,
    grace: Duration,
}

impl DailyBonusJob {
    pub fn new(rewards: RewardsManager) -> Self {
        Self {
            rewards,
            grace: Duration::minutes(DEFAULT_RUN_GRACE_MINUTES),
        }
    }

    /// Override the cooldown slack given to batch runs
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run the batch once
    ///
    /// A failure for one user is logged and the batch moves on. Users whose
    /// cooldown ends within the grace period are treated as due.
    ///
    /// # Errors
    ///
    /// * `RewardsError::Store` - The user list could not be read
    pub async fn run_once(&self) -> RewardsResult<JobReport> {
        let emails = self.rewards.user_emails().await?;
        let mut report = JobReport::default();

        for email in &emails {
            match self
                .rewards
                .issue_scheduled_daily(email, Utc::now(), self.grace)
                .await
            {
                Ok(_) => report.issued += 1,
                Err(RewardsError::CooldownActive { .. }) => report.skipped += 1,
                Err(e) => {
                    log::warn!("Daily bonus failed for one user: {}", e);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Daily bonus run finished: {} issued, {} skipped, {} failed",
            report.issued,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Run the batch every day at `schedule`, forever
    pub fn spawn(self, schedule: DailySchedule) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let next = schedule.next_run_after(now);
                log::info!("Next daily bonus run at {}", next);

                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                if let Err(e) = self.run_once().await {
                    log::error!("Daily bonus run aborted: {}", e);
                }
            }
        })
    }
}
