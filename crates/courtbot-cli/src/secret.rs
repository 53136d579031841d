//! Values in `courtbot.toml` that live somewhere else.
//!
//! `notify.to` is usually kept out of the repository. A value written as
//! `env::NAME` is read from the environment (a CI secret), one written as
//! `pass::entry` from the password store, and any other value is literal.

use std::fmt;
use std::process::Command;

/// Where a configured value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretRef<'a> {
    Literal(&'a str),
    Env(&'a str),
    Pass(&'a str),
}

impl<'a> SecretRef<'a> {
    pub fn parse(value: &'a str) -> Self {
        if let Some(name) = value.strip_prefix("env::") {
            Self::Env(name)
        } else if let Some(entry) = value.strip_prefix("pass::") {
            Self::Pass(entry)
        } else {
            Self::Literal(value)
        }
    }

    /// Reads the value. Blank results are errors, surrounding whitespace
    /// is dropped.
    pub fn resolve(self) -> Result<String, String> {
        let value = match self {
            Self::Literal(value) => return Ok(value.to_string()),
            Self::Env(name) => std::env::var(name).map_err(|_| format!("{} is not set", self))?,
            Self::Pass(entry) => read_pass(entry)?,
        };

        let value = value.trim();
        if value.is_empty() {
            return Err(format!("{} is empty", self));
        }
        Ok(value.to_string())
    }
}

/// Names the source without revealing the value.
impl fmt::Display for SecretRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(_) => f.write_str("literal value"),
            Self::Env(name) => write!(f, "environment variable `{}`", name),
            Self::Pass(entry) => write!(f, "pass entry `{}`", entry),
        }
    }
}

/// First line of `pass show <entry>`.
fn read_pass(entry: &str) -> Result<String, String> {
    let output = Command::new("pass")
        .args(["show", entry])
        .output()
        .map_err(|e| format!("cannot run pass: {}", e))?;

    if !output.status.success() {
        return Err(format!(
            "pass entry `{}` unavailable ({}): {}",
            entry,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let stdout = String::from_utf8(output.stdout)
        .map_err(|_| format!("pass entry `{}` is not UTF-8", entry))?;
    Ok(stdout.lines().next().unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(value: &str) -> Result<String, String> {
        SecretRef::parse(value).resolve()
    }

    #[test]
    fn parse_prefixes() {
        assert_eq!(SecretRef::parse("me@example.com"), SecretRef::Literal("me@example.com"));
        assert_eq!(SecretRef::parse("env::NOTIFY_TO"), SecretRef::Env("NOTIFY_TO"));
        assert_eq!(SecretRef::parse("pass::mail/courts"), SecretRef::Pass("mail/courts"));
        // only a leading prefix counts
        assert_eq!(SecretRef::parse("x env::Y"), SecretRef::Literal("x env::Y"));
    }

    #[test]
    fn display_hides_the_value() {
        assert_eq!(SecretRef::parse("me@example.com").to_string(), "literal value");
        assert_eq!(
            SecretRef::parse("env::NOTIFY_TO").to_string(),
            "environment variable `NOTIFY_TO`"
        );
    }

    #[test]
    fn literal_is_kept_verbatim() {
        assert_eq!(resolve(" me@example.com").unwrap(), " me@example.com");
    }

    #[test]
    fn env_value_is_trimmed() {
        unsafe {
            std::env::set_var("_COURTBOT_TEST_NOTIFY_TO", " courts@example.com\n");
        }
        assert_eq!(
            resolve("env::_COURTBOT_TEST_NOTIFY_TO").unwrap(),
            "courts@example.com"
        );
        unsafe {
            std::env::remove_var("_COURTBOT_TEST_NOTIFY_TO");
        }
    }

    #[test]
    fn unset_env_is_an_error() {
        let err = resolve("env::_COURTBOT_UNSET_VAR_31337").unwrap_err();
        assert_eq!(err, "environment variable `_COURTBOT_UNSET_VAR_31337` is not set");
    }

    #[test]
    fn blank_env_is_an_error() {
        unsafe {
            std::env::set_var("_COURTBOT_TEST_BLANK", "  ");
        }
        let err = resolve("env::_COURTBOT_TEST_BLANK").unwrap_err();
        assert!(err.ends_with("is empty"));
        unsafe {
            std::env::remove_var("_COURTBOT_TEST_BLANK");
        }
    }

    #[test]
    fn missing_pass_entry() {
        assert!(resolve("pass::courtbot/does/not/exist/31337").is_err());
    }
}
