//! `courtbot.toml`.
//!
//! Looked up in this order: `--config` / `COURTBOT_CONFIG`, `./courtbot.toml`,
//! then `<config dir>/courtbot/config.toml`. Without any file the defaults
//! apply, which match the usual project layout (`credentials.json` and
//! `token.json` in the current directory).
//!
//! `notify.to` supports secret references (`pass::...`, `env::...`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use courtbot_core::ConflictPolicy;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::secret::SecretRef;

/// Name of the project-local config file.
pub const LOCAL_CONFIG_FILE: &str = "courtbot.toml";

/// Environment variable holding the CI copy of `token.json`.
pub const TOKEN_SECRET_ENV: &str = "GMAIL_TOKEN_JSON";

/// Upper bound for `calendar.lookahead_days` and `calendar busy --days`.
pub const MAX_LOOKAHEAD_DAYS: u32 = 3660;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CourtbotConfig {
    /// Directory holding `credentials.json` and `token.json`.
    pub root_dir: PathBuf,

    pub google: GoogleSettings,

    pub calendar: CalendarSettings,

    pub notify: NotifySettings,
}

impl Default for CourtbotConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            google: GoogleSettings::default(),
            calendar: CalendarSettings::default(),
            notify: NotifySettings::default(),
        }
    }
}

/// Google token and API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// Relative to `root_dir` unless absolute.
    pub token_file: PathBuf,
    /// Relative to `root_dir` unless absolute.
    pub credentials_file: PathBuf,
    pub calendar_id: String,
    /// HTTP timeout in seconds.
    pub timeout_secs: u64,
    /// Inclusive range of loopback ports tried for the consent redirect.
    pub loopback_ports: [u16; 2],
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            token_file: PathBuf::from("token.json"),
            credentials_file: PathBuf::from("credentials.json"),
            calendar_id: "primary".to_string(),
            timeout_secs: 30,
            loopback_ports: [8080, 8090],
        }
    }
}

/// Calendar conflict settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarSettings {
    pub buffer_hours: u32,
    pub utc_offset_hours: i32,
    /// How far ahead `calendar busy` looks.
    pub lookahead_days: u32,
}

impl Default for CalendarSettings {
    fn default() -> Self {
        let policy = ConflictPolicy::default();
        Self {
            buffer_hours: policy.buffer_hours,
            utc_offset_hours: policy.utc_offset_hours,
            lookahead_days: 400,
        }
    }
}

impl CalendarSettings {
    pub fn policy(&self) -> ConflictPolicy {
        ConflictPolicy {
            buffer_hours: self.buffer_hours,
            utc_offset_hours: self.utc_offset_hours,
        }
    }
}

/// Notification mail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    /// Recipient address (supports `pass::` and `env::` prefixes).
    pub to: Option<String>,
    /// Scraper command line; the first element is the program.
    pub scraper: Vec<String>,
    pub scraper_timeout_secs: u64,
    /// Drop availability lines that clash with the calendar before sending.
    pub calendar_filter: bool,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            to: None,
            scraper: vec!["python".to_string(), "arakawa_selenium_check.py".to_string()],
            scraper_timeout_secs: 900,
            calendar_filter: false,
        }
    }
}

impl NotifySettings {
    /// Resolves the recipient address.
    pub fn recipient(&self) -> Result<String, String> {
        let to = self
            .to
            .as_deref()
            .ok_or_else(|| "notify.to is not set".to_string())?;
        let source = SecretRef::parse(to);
        debug!("reading notify.to from {}", source);
        source.resolve().map_err(|e| format!("notify.to: {}", e))
    }

    pub fn scraper_timeout(&self) -> Duration {
        Duration::from_secs(self.scraper_timeout_secs)
    }
}

impl CourtbotConfig {
    /// Loads the first config file found, or the defaults.
    ///
    /// An explicit path must exist; the fallbacks are optional.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), String> {
        if let Some(path) = explicit {
            return Ok((Self::load_from(path)?, Some(path.to_path_buf())));
        }

        for candidate in [PathBuf::from(LOCAL_CONFIG_FILE), Self::default_path()] {
            if candidate.is_file() {
                return Ok((Self::load_from(&candidate)?, Some(candidate)));
            }
        }

        Ok((Self::default(), None))
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config {}: {}", path.display(), e))?;
        toml::from_str(&content)
            .map_err(|e| format!("failed to parse config {}: {}", path.display(), e))
    }

    /// Returns the per-user configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("courtbot")
            .join("config.toml")
    }

    pub fn token_path(&self) -> PathBuf {
        self.root_dir.join(&self.google.token_file)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.root_dir.join(&self.google.credentials_file)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.google.timeout_secs)
    }

    /// Checks values that would otherwise fail deep inside a command.
    pub fn validate(&self) -> Result<(), String> {
        let [low, high] = self.google.loopback_ports;
        if low == 0 || low > high {
            return Err(format!(
                "google.loopback_ports must be an ascending range of non-zero ports, got [{}, {}]",
                low, high
            ));
        }
        if self.google.calendar_id.trim().is_empty() {
            return Err("google.calendar_id must not be empty".to_string());
        }
        if !(-12..=14).contains(&self.calendar.utc_offset_hours) {
            return Err(format!(
                "calendar.utc_offset_hours out of range: {}",
                self.calendar.utc_offset_hours
            ));
        }
        if !(1..=MAX_LOOKAHEAD_DAYS).contains(&self.calendar.lookahead_days) {
            return Err(format!(
                "calendar.lookahead_days must be between 1 and {}, got {}",
                MAX_LOOKAHEAD_DAYS, self.calendar.lookahead_days
            ));
        }
        if self.calendar.buffer_hours > 24 {
            return Err(format!(
                "calendar.buffer_hours must be at most 24, got {}",
                self.calendar.buffer_hours
            ));
        }
        if self.notify.scraper.is_empty() {
            return Err("notify.scraper must name a program".to_string());
        }
        Ok(())
    }
}

/// True when running under GitHub Actions, where no browser is available.
pub fn is_ci() -> bool {
    std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true")
}
