//! Configuration commands.

use std::path::Path;

use crate::config::CourtbotConfig;
use crate::error::{CliError, CliResult};

/// Dump the effective configuration to stdout.
pub fn dump(config: &CourtbotConfig, source: Option<&Path>) -> CliResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| CliError::Config(format!("failed to serialize config: {}", e)))?;
    match source {
        Some(path) => println!("# {}", path.display()),
        None => println!("# defaults (no config file found)"),
    }
    println!("{}", toml_str);
    Ok(())
}

/// Show which configuration file is in use and where the token lives.
pub fn path(config: &CourtbotConfig, source: Option<&Path>) -> CliResult<()> {
    match source {
        Some(path) => println!("config: {}", path.display()),
        None => println!(
            "config: none (looked for ./courtbot.toml and {})",
            CourtbotConfig::default_path().display()
        ),
    }
    println!("credentials: {}", config.credentials_path().display());
    println!("token: {}", config.token_path().display());
    Ok(())
}
