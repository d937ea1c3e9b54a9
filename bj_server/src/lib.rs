//! HTTP server for Blackjack rewards.
//!
//! Wires [`blackjack_rewards`] into an axum router, loads configuration from
//! the environment and sets up logging and metrics.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
