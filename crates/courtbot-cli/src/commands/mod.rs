//! Subcommand implementations.

pub mod auth;
pub mod calendar;
pub mod config;
pub mod notify;
pub mod token;

use std::io::Read;
use std::path::Path;

use courtbot_google::{AuthMode, Authenticator, GoogleError, OAuthClient, TokenStore};

use crate::config::{CourtbotConfig, is_ci};
use crate::error::CliResult;

/// Builds the authenticator for the configured token and client files.
pub(crate) fn authenticator(config: &CourtbotConfig) -> CliResult<Authenticator> {
    let oauth = OAuthClient::new(config.timeout())?;
    let [low, high] = config.google.loopback_ports;
    Ok(
        Authenticator::new(TokenStore::new(config.token_path()), config.credentials_path(), oauth)
            .with_port_range(low, high),
    )
}

/// Consent needs a browser, so it is never attempted under CI.
pub(crate) fn auth_mode() -> AuthMode {
    if is_ci() {
        AuthMode::NonInteractive
    } else {
        AuthMode::Interactive
    }
}

/// Returns a currently valid access token, refreshing or consenting as
/// the environment allows.
pub(crate) async fn access_token(config: &CourtbotConfig) -> CliResult<String> {
    let record = authenticator(config)?.ensure(auth_mode()).await?;
    record
        .token
        .ok_or_else(|| GoogleError::internal("token record has no access token").into())
}

/// Reads scraper output from a file, or stdin for `None` and `-`.
pub(crate) fn read_input(input: Option<&Path>) -> CliResult<String> {
    match input {
        Some(path) if path != Path::new("-") => Ok(std::fs::read_to_string(path)?),
        _ => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
    }
}
