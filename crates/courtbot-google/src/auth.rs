//! Obtaining a usable access token from the token file.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::credentials::ClientSecrets;
use crate::error::{GoogleError, GoogleResult};
use crate::oauth::OAuthClient;
use crate::token::{REAUTH_HINT, TokenRecord, TokenStore, combined_scopes};

/// Whether the browser consent flow may be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// A human is present; consent may be requested.
    Interactive,
    /// CI or cron; only the existing file and its refresh token are used.
    NonInteractive,
}

/// Keeps `token.json` valid for the calendar and Gmail scopes.
#[derive(Debug)]
pub struct Authenticator {
    store: TokenStore,
    credentials_path: PathBuf,
    oauth: OAuthClient,
    scopes: Vec<String>,
    port_range: (u16, u16),
}

impl Authenticator {
    pub fn new(store: TokenStore, credentials_path: impl Into<PathBuf>, oauth: OAuthClient) -> Self {
        Self {
            store,
            credentials_path: credentials_path.into(),
            oauth,
            scopes: combined_scopes(),
            port_range: (8080, 8090),
        }
    }

    pub fn with_port_range(mut self, start: u16, end: u16) -> Self {
        self.port_range = (start, end);
        self
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Returns a token record whose access token can be used right now.
    ///
    /// A valid token is returned as is. An expired one is refreshed and
    /// written back. With no usable file, consent runs in
    /// [`AuthMode::Interactive`] and fails otherwise.
    ///
    /// A token missing a required scope is never refreshed: refreshing
    /// cannot add scopes, so it needs consent again. The same goes for a
    /// refresh token Google no longer accepts.
    pub async fn ensure(&self, mode: AuthMode) -> GoogleResult<TokenRecord> {
        let loaded = match self.store.load() {
            Ok(record) => record,
            Err(e) if e.needs_reauth() && mode == AuthMode::Interactive => {
                warn!("token file is unusable, requesting consent again: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(mut record) = loaded {
            let missing = record.missing_scopes(&self.scopes);
            if missing.is_empty() {
                let now = Utc::now();
                if record.is_valid_at(now) {
                    debug!("token is valid: {}", record.summary());
                    return Ok(record);
                }

                info!("access token expired, refreshing");
                match self.oauth.refresh(&record).await {
                    Ok(grant) => {
                        record.apply_grant(grant, Utc::now());
                        self.store.save(&record)?;
                        return Ok(record);
                    }
                    Err(e) if e.needs_reauth() && mode == AuthMode::Interactive => {
                        warn!("refresh was refused, requesting consent again: {}", e);
                    }
                    Err(e) => return Err(e),
                }
            } else if mode == AuthMode::NonInteractive {
                return Err(GoogleError::insufficient_scope(format!(
                    "token.json lacks scopes: {}; {}",
                    missing.join(" "),
                    REAUTH_HINT
                )));
            } else {
                warn!("token lacks scopes {}, requesting consent again", missing.join(" "));
            }
        } else if mode == AuthMode::NonInteractive {
            return Err(GoogleError::token_invalid(format!(
                "no token file at {}; {}",
                self.store.path().display(),
                REAUTH_HINT
            )));
        }

        self.consent().await
    }

    /// Deletes the token file and runs consent from scratch.
    pub async fn reauthorize(&self) -> GoogleResult<TokenRecord> {
        if self.store.remove()? {
            info!("deleted {}", self.store.path().display());
        }
        self.consent().await
    }

    /// Runs the browser flow and saves the result.
    ///
    /// Nothing is written when the operator left a permission unticked on
    /// the consent screen.
    async fn consent(&self) -> GoogleResult<TokenRecord> {
        let secrets = ClientSecrets::from_file(&self.credentials_path)?;
        if let Err(reason) = secrets.validate() {
            warn!("OAuth client looks wrong: {}", reason);
        }

        let record = self
            .oauth
            .authorize(&secrets, &self.scopes, self.port_range)
            .await?;

        let missing = record.missing_scopes(&self.scopes);
        if !missing.is_empty() {
            return Err(GoogleError::insufficient_scope(format!(
                "consent did not grant: {}; allow every requested permission on the consent screen and run `courtbot auth` again",
                missing.join(" ")
            ))
            .with_service("oauth"));
        }

        self.store.save(&record)?;
        Ok(record)
    }
}
