//! courtbot CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use courtbot_cli::cli::{CalendarAction, Cli, Command, ConfigAction, TokenAction};
use courtbot_cli::commands;
use courtbot_cli::config::{CourtbotConfig, is_ci};
use courtbot_cli::error::{CliError, CliResult};
use courtbot_core::{LogMode, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(LogMode::select(cli.debug, is_ci()), None) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.needs_reauth() {
                eprintln!("hint: delete token.json and run `courtbot auth` again");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let (config, source) = CourtbotConfig::load(cli.config.as_deref()).map_err(CliError::Config)?;
    config.validate().map_err(CliError::Config)?;

    match cli.command {
        Command::Auth { force } => commands::auth::run(&config, force).await,
        Command::Token { action } => match action {
            TokenAction::Check { path, allow_expired } => {
                commands::token::check(&config, path, allow_expired)
            }
            TokenAction::Reset => commands::token::reset(&config),
            TokenAction::Export => commands::token::export(&config),
            TokenAction::VerifySecret { env } => commands::token::verify_secret(&config, &env),
            TokenAction::Restore { env } => commands::token::restore(&config, &env),
        },
        Command::Calendar { action } => match action {
            CalendarAction::Busy { days } => commands::calendar::busy(&config, days).await,
            CalendarAction::Filter { input } => {
                commands::calendar::filter(&config, input.as_deref()).await
            }
            CalendarAction::Verify => commands::calendar::verify(&config).await,
        },
        Command::Notify {
            input,
            dry_run,
            calendar_filter,
        } => commands::notify::run(&config, input.as_deref(), dry_run, calendar_filter).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, source.as_deref()),
            ConfigAction::Path => commands::config::path(&config, source.as_deref()),
        },
    }
}
