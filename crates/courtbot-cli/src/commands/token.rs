//! Token file commands: check, reset, export, verify-secret, restore.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use courtbot_google::{GoogleError, TokenProblem, TokenReport, TokenStore, combined_scopes, inspect};
use tracing::{debug, info};

use crate::config::CourtbotConfig;
use crate::error::{CliError, CliResult};

/// Inspects a token file and fails if anything is wrong with it.
///
/// An expired access token is only a warning with `allow_expired`, since
/// the refresh token still works.
pub fn check(config: &CourtbotConfig, path: Option<PathBuf>, allow_expired: bool) -> CliResult<()> {
    let path = path.unwrap_or_else(|| config.token_path());
    let report = check_file(&path, Utc::now())?;

    for problem in &report.problems {
        let level = if allow_expired && !problem.is_fatal() { "warning" } else { "error" };
        println!("{}: {}", level, problem);
    }

    let failing: Vec<&TokenProblem> = report
        .problems
        .iter()
        .filter(|p| !allow_expired || p.is_fatal())
        .collect();

    if !failing.is_empty() {
        return Err(CliError::TokenCheck(format!(
            "{} has {} problem(s); delete it and run `courtbot auth` again",
            path.display(),
            failing.len()
        )));
    }

    match report.record {
        Some(record) => println!("{}: OK ({})", path.display(), record.summary()),
        None => println!("{}: OK", path.display()),
    }
    Ok(())
}

fn check_file(path: &Path, now: DateTime<Utc>) -> CliResult<TokenReport> {
    let store = TokenStore::new(path);
    let raw = store.read_raw()?.ok_or_else(|| {
        CliError::TokenCheck(format!(
            "{} does not exist; run `courtbot auth` to create it",
            path.display()
        ))
    })?;
    match String::from_utf8(raw) {
        Ok(text) => Ok(inspect(&text, &combined_scopes(), now)),
        Err(e) => Ok(TokenReport {
            problems: vec![TokenProblem::NotJson(format!(
                "invalid UTF-8 at byte {}",
                e.utf8_error().valid_up_to()
            ))],
            record: None,
        }),
    }
}

/// Deletes the token file.
pub fn reset(config: &CourtbotConfig) -> CliResult<()> {
    let store = TokenStore::new(config.token_path());
    if store.remove()? {
        println!("Deleted {}.", store.path().display());
    } else {
        println!("{} does not exist.", store.path().display());
    }
    Ok(())
}

/// Writes the token file to stdout byte for byte.
pub fn export(config: &CourtbotConfig) -> CliResult<()> {
    let raw = read_token_bytes(config)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&raw)?;
    stdout.flush()?;
    Ok(())
}

/// Checks that the secret in `env` is the token file, byte for byte.
pub fn verify_secret(config: &CourtbotConfig, env: &str) -> CliResult<()> {
    let file = read_token_bytes(config)?;
    let secret = read_secret(env)?;
    compare_secret(&file, secret.as_bytes()).map_err(CliError::SecretMismatch)?;
    println!("{} matches {} ({} bytes).", env, config.token_path().display(), file.len());
    Ok(())
}

/// Writes the secret in `env` to the token file verbatim.
///
/// The secret must at least be JSON; anything else is refused so a broken
/// paste never replaces a working file.
pub fn restore(config: &CourtbotConfig, env: &str) -> CliResult<()> {
    let secret = read_secret(env)?;
    let store = TokenStore::new(config.token_path());
    restore_into(&store, &secret, Utc::now())?;
    println!("Restored {} from {}.", store.path().display(), env);
    Ok(())
}

fn restore_into(store: &TokenStore, secret: &str, now: DateTime<Utc>) -> CliResult<TokenReport> {
    let report = inspect(secret, &combined_scopes(), now);
    if let Some(problem @ (TokenProblem::NotJson(_) | TokenProblem::NotAnObject)) =
        report.problems.first()
    {
        return Err(CliError::TokenCheck(format!("secret is not a token file: {}", problem)));
    }
    for problem in &report.problems {
        info!("restored token: {}", problem);
    }
    store.write_raw(secret.as_bytes())?;
    Ok(report)
}

fn read_token_bytes(config: &CourtbotConfig) -> CliResult<Vec<u8>> {
    let store = TokenStore::new(config.token_path());
    store.read_raw()?.ok_or_else(|| {
        GoogleError::token_invalid(format!(
            "{} does not exist; run `courtbot auth` to create it",
            store.path().display()
        ))
        .into()
    })
}

fn read_secret(env: &str) -> CliResult<String> {
    let value = std::env::var(env)
        .map_err(|_| CliError::Config(format!("environment variable `{}` is not set", env)))?;
    debug!("read {} bytes from {}", value.len(), env);
    Ok(value)
}

/// Byte comparison with a description of the first difference.
fn compare_secret(file: &[u8], secret: &[u8]) -> Result<(), String> {
    if file == secret {
        return Ok(());
    }

    if file.trim_ascii_end() == secret.trim_ascii_end() {
        return Err(format!(
            "contents differ only in trailing whitespace (file {} bytes, secret {} bytes); paste the output of `courtbot token export` unchanged",
            file.len(),
            secret.len()
        ));
    }

    let offset = file
        .iter()
        .zip(secret)
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| file.len().min(secret.len()));
    Err(format!(
        "first difference at byte {} (file {} bytes, secret {} bytes); update the secret with `courtbot token export`",
        offset,
        file.len(),
        secret.len()
    ))
}
