//! Log output for the `courtbot` binary.
//!
//! Logs always go to stderr: stdout is reserved for command output, and
//! `token export` in particular must print nothing but the token file.
//! `RUST_LOG` takes precedence over the level chosen by [`LogMode`].

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// How much to log, and in which shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogMode {
    /// Warnings only, one short line each.
    #[default]
    Quiet,
    /// `-v`: debug level with targets and source locations.
    Verbose,
    /// Scheduled jobs: info level, one JSON object per line, timestamped.
    Ci,
}

impl LogMode {
    /// Picks the mode for a run. The verbose flag wins over CI detection.
    pub fn select(verbose: bool, ci: bool) -> Self {
        match (verbose, ci) {
            (true, _) => Self::Verbose,
            (false, true) => Self::Ci,
            (false, false) => Self::Quiet,
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Quiet => Level::WARN,
            Self::Verbose => Level::DEBUG,
            Self::Ci => Level::INFO,
        }
    }

    /// Filter used when `RUST_LOG` is unset. Matches every `courtbot_*` crate.
    fn directive(self) -> String {
        format!("courtbot={}", self.level())
    }
}

/// Installs the global subscriber for `mode`.
///
/// `filter` replaces both `RUST_LOG` and the mode's default level.
///
/// # Errors
///
/// Fails when a subscriber is already installed or `filter` does not parse.
pub fn init_tracing(mode: LogMode, filter: Option<&str>) -> Result<(), TracingError> {
    let env_filter = match filter {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(mode.directive())),
    };
    let registry = tracing_subscriber::registry().with(env_filter);

    match mode {
        LogMode::Quiet => {
            let layer = fmt::layer()
                .compact()
                .without_time()
                .with_target(false)
                .with_writer(std::io::stderr);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        LogMode::Verbose => {
            let layer = fmt::layer()
                .compact()
                .without_time()
                .with_file(true)
                .with_line_number(true)
                .with_writer(std::io::stderr);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        LogMode::Ci => {
            let layer = fmt::layer().json().with_writer(std::io::stderr);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
    }

    Ok(())
}
