//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{MAX_LOOKAHEAD_DAYS, TOKEN_SECRET_ENV};

/// courtbot - tennis court availability watcher: Google token, calendar and mail
#[derive(Debug, Parser)]
#[command(name = "courtbot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "COURTBOT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Make sure token.json is usable, running browser consent if needed
    Auth {
        /// Delete token.json first and always run consent
        #[arg(long, short)]
        force: bool,
    },

    /// Inspect, export and restore token.json
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Calendar busy ranges and slot filtering
    Calendar {
        #[command(subcommand)]
        action: CalendarAction,
    },

    /// Run the scraper and mail what it found
    Notify {
        /// Read scraper output from this file ("-" for stdin) instead of running it
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Print the mail instead of sending it
        #[arg(long)]
        dry_run: bool,

        /// Drop availability that clashes with the calendar
        #[arg(long)]
        calendar_filter: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Token file actions.
#[derive(Debug, Subcommand)]
pub enum TokenAction {
    /// Check fields, scopes and expiry of a token file
    Check {
        /// Token file to check instead of the configured one
        #[arg(long)]
        path: Option<PathBuf>,

        /// Only warn about an expired access token
        #[arg(long)]
        allow_expired: bool,
    },

    /// Delete the token file
    Reset,

    /// Print the token file verbatim, for the CI secret
    Export,

    /// Compare the CI secret in the environment with the token file
    VerifySecret {
        /// Environment variable holding the secret
        #[arg(long, default_value = TOKEN_SECRET_ENV)]
        env: String,
    },

    /// Write the CI secret from the environment to the token file
    Restore {
        /// Environment variable holding the secret
        #[arg(long, default_value = TOKEN_SECRET_ENV)]
        env: String,
    },
}

/// Calendar actions.
#[derive(Debug, Subcommand)]
pub enum CalendarAction {
    /// List busy ranges from now on
    Busy {
        /// Days to look ahead (default from config)
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_LOOKAHEAD_DAYS)))]
        days: Option<u32>,
    },

    /// Drop scraper lines whose slot clashes with the calendar
    Filter {
        /// Scraper output file ("-" or absent for stdin)
        #[arg(long, short)]
        input: Option<PathBuf>,
    },

    /// Fetch busy ranges and check each one against itself as a slot
    Verify,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective configuration
    Dump,

    /// Show which configuration file is used
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn token_check_flags() {
        let cli = Cli::parse_from(["courtbot", "token", "check", "--path", "/tmp/t.json", "--allow-expired"]);
        match cli.command {
            Command::Token {
                action: TokenAction::Check { path, allow_expired },
            } => {
                assert_eq!(path, Some(PathBuf::from("/tmp/t.json")));
                assert!(allow_expired);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn busy_days_are_bounded() {
        let cli = Cli::parse_from(["courtbot", "calendar", "busy", "--days", "30"]);
        assert!(matches!(
            cli.command,
            Command::Calendar {
                action: CalendarAction::Busy { days: Some(30) }
            }
        ));
        assert!(Cli::try_parse_from(["courtbot", "calendar", "busy", "--days", "4294967295"]).is_err());
        assert!(Cli::try_parse_from(["courtbot", "calendar", "busy", "--days", "0"]).is_err());
    }

    #[test]
    fn secret_env_defaults() {
        let cli = Cli::parse_from(["courtbot", "token", "verify-secret"]);
        match cli.command {
            Command::Token {
                action: TokenAction::VerifySecret { env },
            } => assert_eq!(env, "GMAIL_TOKEN_JSON"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["courtbot", "notify", "--dry-run", "-v"]);
        assert!(cli.debug);
        assert!(matches!(cli.command, Command::Notify { dry_run: true, .. }));
    }
}
