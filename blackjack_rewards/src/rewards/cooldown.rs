//! Daily bonus cooldown arithmetic.

use chrono::{DateTime, Duration, Utc};

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Whole hours left before the next bonus, or `None` once the window elapsed.
///
/// A missing `last_bonus_at` behaves as the unix epoch. Partial hours round
/// up, so a request one minute early reports 1 hour.
pub fn cooldown_remaining(
    last_bonus_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    cooldown: Duration,
) -> Option<i64> {
    let last = last_bonus_at.unwrap_or(DateTime::UNIX_EPOCH);
    let elapsed = now.signed_duration_since(last);
    if elapsed >= cooldown {
        return None;
    }

    let remaining_ms = (cooldown - elapsed).num_milliseconds();
    Some(((remaining_ms + MILLIS_PER_HOUR - 1) / MILLIS_PER_HOUR).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> Duration {
        Duration::hours(24)
    }

    #[test]
    fn test_never_claimed() {
        assert_eq!(cooldown_remaining(None, Utc::now(), day()), None);
    }

    #[test]
    fn test_just_claimed() {
        let now = Utc::now();
        assert_eq!(cooldown_remaining(Some(now), now, day()), Some(24));
    }

    #[test]
    fn test_one_minute_early() {
        let now = Utc::now();
        let last = now - Duration::hours(23) - Duration::minutes(59);
        assert_eq!(cooldown_remaining(Some(last), now, day()), Some(1));
    }

    #[test]
    fn test_exactly_elapsed() {
        let now = Utc::now();
        assert_eq!(cooldown_remaining(Some(now - day()), now, day()), None);
    }

    #[test]
    fn test_partial_hours_round_up() {
        let now = Utc::now();
        let last = now - Duration::minutes(90);
        assert_eq!(cooldown_remaining(Some(last), now, day()), Some(23));
    }
}
