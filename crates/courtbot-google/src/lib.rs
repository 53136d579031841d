//! Google side of courtbot: the OAuth token file, Calendar and Gmail.
//!
//! - [`TokenStore`] / [`TokenRecord`] - the authorized-user `token.json`
//! - [`inspect`] - structural checks used before the file goes to CI
//! - [`Authenticator`] - refresh or consent until a usable token exists
//! - [`CalendarClient`] - busy ranges for conflict filtering
//! - [`GmailClient`] - sending the notification mail
//!
//! # Flow
//!
//! ```text
//! credentials.json ──► OAuthClient::authorize ──► token.json
//!                                                    │
//!                            OAuthClient::refresh ◄──┤ expired
//!                                                    ▼
//!                                 access token ──► CalendarClient / GmailClient
//! ```

pub mod auth;
pub mod calendar;
pub mod credentials;
pub mod error;
pub mod gmail;
pub mod oauth;
pub mod token;

pub use auth::{AuthMode, Authenticator};
pub use calendar::CalendarClient;
pub use credentials::ClientSecrets;
pub use error::{GoogleError, GoogleErrorCode, GoogleResult};
pub use gmail::{GmailClient, MailMessage};
pub use oauth::OAuthClient;
pub use token::{
    CALENDAR_READONLY_SCOPE, GMAIL_SEND_SCOPE, REQUIRED_FIELDS, TokenGrant, TokenProblem,
    TokenRecord, TokenReport, TokenStore, combined_scopes, inspect,
};
