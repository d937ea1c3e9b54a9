//! Bonus notification texts.

use super::OutgoingMail;

pub const WELCOME_SUBJECT: &str = "Welcome to Blackjack - Here's Your Signup Bonus!";
pub const DAILY_SUBJECT: &str = "Your Daily Blackjack Bonus";

/// Signup bonus message
pub fn welcome_bonus(to: &str, code: &str, amount: i64, cooldown_hours: i64) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: WELCOME_SUBJECT.to_string(),
        body: format!(
            "Welcome to Blackjack!\n\
             \n\
             Here is your signup bonus code: {code}\n\
             Use this code to get {amount} coins to start playing!\n\
             \n\
             You'll receive your first daily bonus in {cooldown_hours} hours."
        ),
    }
}

/// Daily bonus message
pub fn daily_bonus(to: &str, code: &str, amount: i64) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: DAILY_SUBJECT.to_string(),
        body: format!(
            "Here is your daily bonus code: {code}\n\
             \n\
             Use this code in the game to get your daily bonus of {amount} coins!"
        ),
    }
}
