//! Authentication command.

use courtbot_google::{AuthMode, GoogleError};
use tracing::info;

use super::{auth_mode, authenticator};
use crate::config::{CourtbotConfig, TOKEN_SECRET_ENV};
use crate::error::CliResult;

/// Makes sure `token.json` is usable for Calendar and Gmail.
///
/// With `force` the file is deleted first and consent always runs. When a
/// new token is written, prints the reminder to update the CI secret.
pub async fn run(config: &CourtbotConfig, force: bool) -> CliResult<()> {
    let auth = authenticator(config)?;
    let mode = auth_mode();

    if force && mode == AuthMode::NonInteractive {
        return Err(GoogleError::configuration(
            "consent needs a browser and cannot run under CI; run `courtbot auth --force` locally",
        )
        .into());
    }

    let before = auth.store().read_raw()?;

    let record = if force {
        println!("Deleting {} and starting Google consent...", auth.store().path().display());
        println!("A browser window will open. If it does not, copy the URL printed below.");
        auth.reauthorize().await?
    } else {
        auth.ensure(mode).await?
    };

    let after = auth.store().read_raw()?;
    info!("token ready: {}", record.summary());

    if before == after {
        println!("token.json is valid ({}).", auth.store().path().display());
        return Ok(());
    }

    println!("Wrote {}.", auth.store().path().display());
    println!("  {}", record.summary());
    println!();
    println!(
        "If CI uses this token, update the {} secret with the output of `courtbot token export`.",
        TOKEN_SECRET_ENV
    );
    Ok(())
}
