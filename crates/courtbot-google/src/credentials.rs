//! OAuth client configuration (`credentials.json`).

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{GoogleError, GoogleResult};
use crate::token::GOOGLE_TOKEN_URI;

/// Authorization endpoint used when the client file does not name one.
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// OAuth 2.0 client identity, as downloaded from the Google Cloud Console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

/// On-disk shape of the client file.
///
/// Either an `installed`/`web` section, or a flat object with
/// `client_id`/`client_secret` at the root.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSection>,
    web: Option<ClientSection>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSection {
    client_id: String,
    client_secret: String,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl ClientSecrets {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: GOOGLE_AUTH_URI.to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
        }
    }

    /// Loads the client file.
    ///
    /// A missing file and an empty file are both reported as
    /// [`CredentialsMissing`](crate::GoogleErrorCode::CredentialsMissing),
    /// naming the path that was checked.
    pub fn from_file(path: impl AsRef<Path>) -> GoogleResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GoogleError::credentials_missing(format!(
                "credentials.json not found: {}; it is required for the first authorization",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            GoogleError::configuration(format!("failed to read {}: {}", path.display(), e))
                .with_source(e)
        })?;
        let content = raw.trim_start_matches('\u{feff}');
        if content.trim().is_empty() {
            return Err(GoogleError::credentials_missing(format!(
                "credentials.json is empty: {}; download the OAuth client JSON from the Google Cloud Console",
                path.display()
            )));
        }

        debug!("loaded OAuth client from {}", path.display());
        Self::from_json(content)
    }

    pub fn from_json(json: &str) -> GoogleResult<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json).map_err(|e| {
            GoogleError::configuration(format!("failed to parse credentials JSON: {}", e))
        })?;

        if let Some(section) = file.installed.or(file.web) {
            let mut secrets = Self::new(section.client_id, section.client_secret);
            if let Some(uri) = section.auth_uri {
                secrets.auth_uri = uri;
            }
            if let Some(uri) = section.token_uri {
                secrets.token_uri = uri;
            }
            return Ok(secrets);
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(GoogleError::configuration(
            "credentials file must contain an 'installed'/'web' section or 'client_id'/'client_secret' at the root",
        ))
    }

    /// Checks that the values look like a Google OAuth client.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GoogleErrorCode;

    #[test]
    fn installed_section() {
        let json = r#"{
            "installed": {
                "client_id": "abc.apps.googleusercontent.com",
                "project_id": "tennis",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "s3cret",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secrets.client_secret, "s3cret");
        assert_eq!(secrets.auth_uri, "https://accounts.google.com/o/oauth2/auth");
        assert!(secrets.validate().is_ok());
    }

    #[test]
    fn web_section_uses_default_endpoints() {
        let json = r#"{"web": {"client_id": "w.apps.googleusercontent.com", "client_secret": "x"}}"#;
        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.auth_uri, GOOGLE_AUTH_URI);
        assert_eq!(secrets.token_uri, GOOGLE_TOKEN_URI);
    }

    #[test]
    fn flat_format() {
        let json = r#"{"client_id": "f.apps.googleusercontent.com", "client_secret": "y", "refresh_token": "r"}"#;
        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.client_secret, "y");
    }

    #[test]
    fn neither_format() {
        let err = ClientSecrets::from_json(r#"{"other": {}}"#).unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::ConfigurationError);
        assert!(err.message().contains("client_id"));
    }

    #[test]
    fn validation() {
        assert!(ClientSecrets::new("", "s").validate().is_err());
        assert!(ClientSecrets::new("bad-id", "s").validate().is_err());
        assert!(ClientSecrets::new("a.apps.googleusercontent.com", "").validate().is_err());
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientSecrets::from_file(dir.path().join("credentials.json")).unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::CredentialsMissing);
        assert!(err.message().contains("not found"));
    }

    #[test]
    fn empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "  \n").unwrap();
        let err = ClientSecrets::from_file(&path).unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::CredentialsMissing);
        assert!(err.message().contains("empty"));
    }

    #[test]
    fn file_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            "\u{feff}{\"installed\":{\"client_id\":\"b.apps.googleusercontent.com\",\"client_secret\":\"z\"}}",
        )
        .unwrap();
        let secrets = ClientSecrets::from_file(&path).unwrap();
        assert_eq!(secrets.client_id, "b.apps.googleusercontent.com");
    }
}
