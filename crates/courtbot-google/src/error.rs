//! Error types for Google API and token file operations.

use std::fmt;
use thiserror::Error;

/// The category of a Google error.
///
/// Drives the remedy shown to the operator: retry later, fix the
/// configuration, or delete `token.json` and consent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoogleErrorCode {
    /// The API rejected the access token.
    AuthenticationFailed,
    /// Authorization failed - the token lacks permission for the call.
    AuthorizationFailed,
    /// Network error - connection failed, timeout, DNS resolution, etc.
    NetworkError,
    RateLimited,
    /// Server returned an error (5xx status codes).
    ServerError,
    /// Invalid response from the server - parse error, unexpected format.
    InvalidResponse,
    NotFound,
    /// Request was invalid (400) - bad parameters, malformed request.
    BadRequest,
    /// Configuration error - bad paths, malformed config values.
    ConfigurationError,
    /// `credentials.json` is absent or empty.
    CredentialsMissing,
    /// `token.json` is absent, corrupt, or its refresh token was revoked.
    TokenInvalid,
    /// `token.json` does not grant every required scope.
    InsufficientScope,
    /// Internal error - unexpected state, bug.
    InternalError,
}

impl GoogleErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Returns true if the remedy is deleting the token file and running
    /// the consent flow again.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed | Self::TokenInvalid | Self::InsufficientScope
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::CredentialsMissing => "credentials_missing",
            Self::TokenInvalid => "token_invalid",
            Self::InsufficientScope => "insufficient_scope",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for GoogleErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while handling credentials or calling a Google API.
#[derive(Debug, Error)]
pub struct GoogleError {
    code: GoogleErrorCode,
    message: String,
    /// The API that produced the error ("oauth", "calendar", "gmail").
    service: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GoogleError {
    pub fn new(code: GoogleErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            service: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::AuthorizationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::BadRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::ConfigurationError, message)
    }

    pub fn credentials_missing(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::CredentialsMissing, message)
    }

    pub fn token_invalid(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::TokenInvalid, message)
    }

    pub fn insufficient_scope(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::InsufficientScope, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(GoogleErrorCode::InternalError, message)
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> GoogleErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn needs_reauth(&self) -> bool {
        self.code.needs_reauth()
    }
}

impl fmt::Display for GoogleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref service) = self.service {
            write!(f, "[{}] ", service)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for Google operations.
pub type GoogleResult<T> = Result<T, GoogleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes() {
        assert!(GoogleErrorCode::NetworkError.is_retryable());
        assert!(GoogleErrorCode::RateLimited.is_retryable());
        assert!(GoogleErrorCode::ServerError.is_retryable());
        assert!(!GoogleErrorCode::TokenInvalid.is_retryable());
        assert!(!GoogleErrorCode::CredentialsMissing.is_retryable());
    }

    #[test]
    fn reauth_codes() {
        assert!(GoogleErrorCode::TokenInvalid.needs_reauth());
        assert!(GoogleErrorCode::InsufficientScope.needs_reauth());
        assert!(GoogleErrorCode::AuthenticationFailed.needs_reauth());
        assert!(!GoogleErrorCode::NetworkError.needs_reauth());
        assert!(!GoogleErrorCode::CredentialsMissing.needs_reauth());
    }

    #[test]
    fn display_with_service() {
        let err = GoogleError::rate_limited("too many requests").with_service("gmail");
        let display = err.to_string();
        assert!(display.starts_with("[gmail] "));
        assert!(display.contains("rate_limited"));
        assert!(display.contains("too many requests"));
    }

    #[test]
    fn accessors() {
        let err = GoogleError::insufficient_scope("missing gmail.send");
        assert_eq!(err.code(), GoogleErrorCode::InsufficientScope);
        assert_eq!(err.message(), "missing gmail.send");
        assert!(err.service().is_none());
        assert!(err.needs_reauth());
    }

    #[test]
    fn keeps_source() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = GoogleError::internal("failed to write token").with_source(io_err);
        assert!(err.source().is_some());
    }
}
