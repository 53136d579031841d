//! CLI: token handling, calendar filtering, mail notification
//!
//! This crate provides the `courtbot` command-line interface.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod scraper;
pub mod secret;

pub use cli::Cli;
pub use config::CourtbotConfig;
pub use error::{CliError, CliResult};
