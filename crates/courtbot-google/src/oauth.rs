//! OAuth 2.0 consent and refresh for the token file.
//!
//! Consent uses the Authorization Code flow with PKCE and a loopback
//! redirect, the flow Google prescribes for installed applications:
//!
//! 1. Generate a code verifier, its SHA-256 challenge and a random state
//! 2. Bind a listener on 127.0.0.1
//! 3. Open the browser on the consent page (or print the URL)
//! 4. Receive `/callback?code=...&state=...` on the listener
//! 5. Exchange the code (with the verifier) for tokens
//!
//! `access_type=offline&prompt=consent` makes Google issue a refresh token
//! on every consent, which is what lets the CI copy of the file keep
//! working.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use rand::Rng as _;
use serde_json::Map;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::credentials::ClientSecrets;
use crate::error::{GoogleError, GoogleResult};
use crate::token::{TokenGrant, TokenRecord};

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// How long the operator has to finish the consent screen.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Shows the consent URL to the operator.
pub type BrowserLauncher = fn(&str) -> std::io::Result<()>;

fn open_browser(url: &str) -> std::io::Result<()> {
    open::that(url)
}

/// HTTP client for the token endpoint.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http_client: reqwest::Client,
    launcher: BrowserLauncher,
}

impl OAuthClient {
    pub fn new(timeout: Duration) -> GoogleResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GoogleError::internal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            launcher: open_browser,
        })
    }

    /// Replaces the system browser, e.g. with a headless client.
    pub fn with_launcher(mut self, launcher: BrowserLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Runs the interactive consent flow and returns a complete token record.
    ///
    /// # Errors
    ///
    /// Fails when no loopback port is free, the operator denies access or
    /// does not finish within five minutes, the state does not match, or
    /// the code exchange is rejected.
    pub async fn authorize(
        &self,
        secrets: &ClientSecrets,
        scopes: &[String],
        port_range: (u16, u16),
    ) -> GoogleResult<TokenRecord> {
        let pkce = PkceFlow::new();

        let (listener, port) = Self::bind_loopback_server(port_range)?;
        let redirect_uri = format!("http://127.0.0.1:{}/callback", port);
        let auth_url = pkce.build_auth_url(&secrets.auth_uri, &secrets.client_id, &redirect_uri, scopes);

        info!("starting OAuth consent, opening browser");
        debug!("authorization URL: {}", auth_url);

        if let Err(e) = (self.launcher)(&auth_url) {
            warn!("failed to open browser: {}", e);
            eprintln!("\nOpen this URL in your browser:\n\n{}\n", auth_url);
        }

        let (code, received_state) = Self::wait_for_callback(listener)?;
        if received_state != pkce.state {
            return Err(GoogleError::authentication(
                "OAuth state mismatch - possible CSRF attack",
            )
            .with_service("oauth"));
        }

        info!("received authorization code, exchanging for tokens");
        let params = [
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("code", code.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        let grant = self.post_token(&secrets.token_uri, &params).await?;

        let refresh_token = grant.refresh_token.clone().ok_or_else(|| {
            GoogleError::token_invalid(
                "consent did not return a refresh token; revoke the app's access in the Google account and retry",
            )
            .with_service("oauth")
        })?;

        let mut record = TokenRecord {
            token: None,
            refresh_token,
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            scopes: scopes.to_vec(),
            expiry: None,
            extra: Map::new(),
        };
        record.apply_grant(grant, Utc::now());

        info!("obtained new token");
        Ok(record)
    }

    /// Mints a new access token from the record's refresh token.
    ///
    /// A revoked or lapsed refresh token comes back as `invalid_grant` and
    /// is reported as [`TokenInvalid`](crate::GoogleErrorCode::TokenInvalid).
    pub async fn refresh(&self, record: &TokenRecord) -> GoogleResult<TokenGrant> {
        let params = [
            ("client_id", record.client_id.as_str()),
            ("client_secret", record.client_secret.as_str()),
            ("refresh_token", record.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let grant = self.post_token(&record.token_uri, &params).await?;
        info!("refreshed access token");
        Ok(grant)
    }

    async fn post_token(&self, token_uri: &str, params: &[(&str, &str)]) -> GoogleResult<TokenGrant> {
        let response = self
            .http_client
            .post(token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                GoogleError::network(format!("token request failed: {}", e)).with_service("oauth")
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            GoogleError::network(format!("failed to read response: {}", e)).with_service("oauth")
        })?;

        if !status.is_success() {
            let detail: Option<TokenErrorResponse> = serde_json::from_str(&body).ok();
            let err = match detail.as_ref().map(|d| d.error.as_str()) {
                Some("invalid_grant") => GoogleError::token_invalid(format!(
                    "refresh token was revoked or has expired; delete token.json and run `courtbot auth` again ({})",
                    detail
                        .as_ref()
                        .and_then(|d| d.error_description.as_deref())
                        .unwrap_or("invalid_grant")
                )),
                Some("invalid_client") | Some("unauthorized_client") => {
                    GoogleError::configuration(format!("OAuth client rejected ({}): {}", status, body))
                }
                _ if status.is_server_error() => {
                    GoogleError::server(format!("token endpoint error ({}): {}", status, body))
                }
                _ => GoogleError::authentication(format!("token request failed ({}): {}", status, body)),
            };
            return Err(err.with_service("oauth"));
        }

        serde_json::from_str(&body).map_err(|e| {
            GoogleError::invalid_response(format!("invalid token response: {}", e)).with_service("oauth")
        })
    }

    /// Tries to bind a TCP listener on an available port in the given range.
    fn bind_loopback_server(port_range: (u16, u16)) -> GoogleResult<(TcpListener, u16)> {
        for port in port_range.0..=port_range.1 {
            if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
                let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
                debug!("bound loopback server on port {}", port);
                return Ok((listener, port));
            }
        }
        Err(GoogleError::configuration(format!(
            "no available port in range {}-{}",
            port_range.0, port_range.1
        )))
    }

    /// Blocks until the browser hits `/callback`, or the timeout elapses.
    fn wait_for_callback(listener: TcpListener) -> GoogleResult<(String, String)> {
        listener
            .set_nonblocking(false)
            .map_err(|e| GoogleError::internal(format!("failed to set blocking: {}", e)))?;

        let (tx, rx) = mpsc::channel();

        let _handle = thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        if let Some(result) = handle_callback(stream) {
                            let _ = tx.send(result);
                            return;
                        }
                    }
                    Err(e) => error!("failed to accept connection: {}", e),
                }
            }
        });

        match rx.recv_timeout(CALLBACK_TIMEOUT) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(GoogleError::authentication(
                "consent was not completed within 5 minutes",
            )
            .with_service("oauth")),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(GoogleError::internal("callback channel disconnected"))
            }
        }
    }
}

/// Handles one request on the loopback listener.
///
/// Returns `None` for requests that are not the redirect (favicon probes
/// and the like), so the listener keeps waiting.
fn handle_callback(mut stream: TcpStream) -> Option<GoogleResult<(String, String)>> {
    let mut reader = BufReader::new(&stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return None;
    }

    // GET /callback?code=...&state=... HTTP/1.1
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 || parts[0] != "GET" {
        return None;
    }
    let path = parts[1];
    if !path.starts_with("/callback") {
        let _ = stream.write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n");
        return None;
    }

    let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");
    let mut code = None;
    let mut state = None;
    let mut denied = None;
    for param in query.split('&') {
        if let Some((key, value)) = param.split_once('=') {
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_default();
            match key {
                "code" => code = Some(value),
                "state" => state = Some(value),
                "error" => denied = Some(value),
                _ => {}
            }
        }
    }

    let response = if denied.is_some() || code.is_none() {
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html; charset=utf-8\r\n\r\n\
        <html><body><h1>Authorization failed</h1>\
        <p>You can close this window.</p></body></html>"
    } else {
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\r\n\
        <html><body><h1>Authorization complete</h1>\
        <p>You can close this window and return to the terminal.</p></body></html>"
    };
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();

    if let Some(reason) = denied {
        return Some(Err(GoogleError::authentication(format!(
            "authorization denied: {}",
            reason
        ))
        .with_service("oauth")));
    }

    match (code, state) {
        (Some(code), state) => Some(Ok((code, state.unwrap_or_default()))),
        (None, _) => Some(Err(GoogleError::authentication(
            "missing authorization code in callback",
        )
        .with_service("oauth"))),
    }
}

/// Error body of the token endpoint.
#[derive(Debug, serde::Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// PKCE verifier, challenge and state for one consent attempt (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    /// base64url(SHA-256(verifier)).
    pub challenge: String,
    /// Random value echoed back by the redirect.
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        let state = random_token(16);
        Self {
            verifier,
            challenge,
            state,
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }

    /// Builds the consent URL.
    pub fn build_auth_url(
        &self,
        auth_uri: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            auth_uri,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scopes.join(" ")),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Plays the browser's part: follows the consent URL straight to the
/// loopback redirect with a fixed code and the URL's own state.
#[cfg(test)]
pub(crate) fn approve_consent(auth_url: &str) -> std::io::Result<()> {
    let query = auth_url.split_once('?').map(|(_, q)| q).unwrap_or("");
    let param = |name: &str| {
        query
            .split('&')
            .find_map(|p| p.strip_prefix(name)?.strip_prefix('='))
            .and_then(|v| urlencoding::decode(v).ok())
            .map(|v| v.into_owned())
            .unwrap_or_default()
    };
    let redirect_uri = param("redirect_uri");
    let host = redirect_uri
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string();

    let mut stream = TcpStream::connect(host)?;
    let request = format!(
        "GET /callback?code=4%2F0consent&state={} HTTP/1.1\r\n",
        urlencoding::encode(&param("state"))
    );
    stream.write_all(request.as_bytes())
}
