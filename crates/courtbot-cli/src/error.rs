//! CLI error types.

use std::fmt;

use courtbot_google::GoogleError;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that end a command.
#[derive(Debug)]
pub enum CliError {
    /// Configuration error.
    Config(String),
    /// Google API, OAuth or token file error.
    Google(GoogleError),
    /// The token file failed `token check`.
    TokenCheck(String),
    /// The CI secret differs from the token file.
    SecretMismatch(String),
    /// The scraper could not be started.
    Scraper(String),
    /// IO error.
    Io(std::io::Error),
}

impl CliError {
    /// Whether deleting `token.json` and consenting again fixes this.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::Google(e) if e.needs_reauth())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Google(err) => write!(f, "{}", err),
            Self::TokenCheck(msg) => write!(f, "token check failed: {}", msg),
            Self::SecretMismatch(msg) => write!(f, "secret mismatch: {}", msg),
            Self::Scraper(msg) => write!(f, "scraper error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Google(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<GoogleError> for CliError {
    fn from(err: GoogleError) -> Self {
        Self::Google(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_errors_keep_their_code() {
        let err: CliError = GoogleError::insufficient_scope("missing gmail.send").into();
        assert!(err.needs_reauth());
        assert!(err.to_string().contains("insufficient_scope"));

        let err: CliError = GoogleError::network("timeout").into();
        assert!(!err.needs_reauth());
    }

    #[test]
    fn display() {
        assert_eq!(
            CliError::Config("bad root_dir".into()).to_string(),
            "configuration error: bad root_dir"
        );
        assert!(!CliError::TokenCheck("x".into()).needs_reauth());
    }
}
