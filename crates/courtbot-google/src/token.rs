//! The authorized-user token file (`token.json`).
//!
//! The layout is the one Google's OAuth client libraries write, so a file
//! produced by any of them loads here and the other way round:
//!
//! ```json
//! {"token": "ya29...", "refresh_token": "1//0e...", "token_uri": "https://oauth2.googleapis.com/token",
//!  "client_id": "...apps.googleusercontent.com", "client_secret": "...",
//!  "scopes": ["https://www.googleapis.com/auth/calendar.readonly", "https://www.googleapis.com/auth/gmail.send"],
//!  "expiry": "2025-11-14T03:12:45.123456Z"}
//! ```
//!
//! Unknown keys (`universe_domain`, `account`) are carried through untouched.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{GoogleError, GoogleResult};

/// Default OAuth token endpoint.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Read access to the calendar, used for conflict filtering.
pub const CALENDAR_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// Permission to send mail as the user.
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// A token is treated as expired this long before its actual expiry.
const REFRESH_THRESHOLD_SECS: i64 = 225;

/// The seven keys every produced token file must carry.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "token",
    "refresh_token",
    "token_uri",
    "client_id",
    "client_secret",
    "scopes",
    "expiry",
];

pub const REAUTH_HINT: &str = "delete token.json and run `courtbot auth` again";

/// Both scopes, requested together so one token serves Calendar and Gmail.
pub fn combined_scopes() -> Vec<String> {
    vec![
        CALENDAR_READONLY_SCOPE.to_string(),
        GMAIL_SEND_SCOPE.to_string(),
    ]
}

/// Contents of `token.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Current access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    pub refresh_token: String,

    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    pub client_id: String,

    pub client_secret: String,

    /// Granted scopes, in the order the provider reported them.
    #[serde(default, deserialize_with = "scope_list::deserialize")]
    pub scopes: Vec<String>,

    /// Access-token expiry instant.
    #[serde(default, with = "expiry_format", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl TokenRecord {
    /// Parses the file contents.
    ///
    /// Like Google's loaders, `refresh_token`, `client_id` and
    /// `client_secret` are mandatory; anything else missing is left for
    /// [`inspect`] to report.
    pub fn from_json(json: &str) -> GoogleResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            GoogleError::token_invalid(format!("token file is not usable ({}); {}", e, REAUTH_HINT))
        })
    }

    /// Serializes to the single-line form written to disk.
    pub fn to_json(&self) -> GoogleResult<String> {
        serde_json::to_string(self)
            .map_err(|e| GoogleError::internal(format!("failed to serialize token: {}", e)))
    }

    /// True once `now` is within the refresh threshold of the expiry.
    /// A token without expiry never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| now >= expiry - Duration::seconds(REFRESH_THRESHOLD_SECS))
    }

    /// True when an access token is present and not expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.token.is_some() && !self.is_expired_at(now)
    }

    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Required scopes not granted by this token, in `required` order.
    pub fn missing_scopes(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|scope| !self.scopes.contains(scope))
            .cloned()
            .collect()
    }

    /// Applies a token-endpoint response to this record.
    ///
    /// The refresh token and scopes are only replaced when the response
    /// carries new ones.
    pub fn apply_grant(&mut self, grant: TokenGrant, now: DateTime<Utc>) {
        self.token = Some(grant.access_token);
        self.expiry = grant.expires_in.map(|secs| now + Duration::seconds(secs));
        if let Some(refresh_token) = grant.refresh_token {
            self.refresh_token = refresh_token;
        }
        if let Some(scope) = grant.scope {
            let scopes: Vec<String> = scope.split_whitespace().map(String::from).collect();
            if !scopes.is_empty() {
                self.scopes = scopes;
            }
        }
    }

    /// Redacted one-line description for logs and `token check`.
    pub fn summary(&self) -> String {
        format!(
            "client_id={} scopes=[{}] expiry={}",
            self.client_id,
            self.scopes.join(" "),
            self.expiry
                .map(|e| e.to_rfc3339())
                .unwrap_or_else(|| "none".to_string())
        )
    }
}

/// A successful response from the OAuth token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space-separated granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Something wrong with a token file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenProblem {
    /// The bytes are not JSON.
    NotJson(String),
    /// Valid JSON, but not an object.
    NotAnObject,
    MissingField(&'static str),
    /// Present with the wrong JSON type.
    WrongType(&'static str),
    MissingScope(String),
    /// `expiry` is present but not an ISO 8601 timestamp.
    BadExpiry(String),
    /// `expiry` is not in the future.
    Expired(DateTime<Utc>),
}

impl TokenProblem {
    /// Expiry alone is recoverable with the refresh token; everything else
    /// requires a new consent.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Expired(_))
    }
}

impl fmt::Display for TokenProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotJson(e) => write!(f, "not valid JSON: {}", e),
            Self::NotAnObject => write!(f, "not a JSON object"),
            Self::MissingField(name) => write!(f, "missing field `{}`", name),
            Self::WrongType(name) => write!(f, "field `{}` has the wrong type", name),
            Self::MissingScope(scope) => write!(f, "scope not granted: {}", scope),
            Self::BadExpiry(raw) => write!(f, "expiry is not an ISO 8601 timestamp: {}", raw),
            Self::Expired(at) => write!(f, "access token expired at {}", at.to_rfc3339()),
        }
    }
}

/// Outcome of [`inspect`].
#[derive(Debug, Clone)]
pub struct TokenReport {
    pub problems: Vec<TokenProblem>,
    /// The parsed record, when the mandatory fields were usable.
    pub record: Option<TokenRecord>,
}

impl TokenReport {
    /// No problems at all, expiry included.
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    /// Usable, possibly after a refresh.
    pub fn is_usable(&self) -> bool {
        self.record.is_some() && !self.problems.iter().any(TokenProblem::is_fatal)
    }
}

/// Checks raw token-file contents against the expected shape.
///
/// Reports every missing or mistyped field, every scope in `required` that
/// was not granted, and an expiry that is unparseable or not after `now`.
pub fn inspect(raw: &str, required: &[String], now: DateTime<Utc>) -> TokenReport {
    let mut problems = Vec::new();

    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            return TokenReport {
                problems: vec![TokenProblem::NotJson(e.to_string())],
                record: None,
            };
        }
    };
    let Some(object) = value.as_object() else {
        return TokenReport {
            problems: vec![TokenProblem::NotAnObject],
            record: None,
        };
    };

    for field in REQUIRED_FIELDS {
        match object.get(field) {
            None | Some(Value::Null) => problems.push(TokenProblem::MissingField(field)),
            Some(Value::String(_)) if field != "scopes" => {}
            Some(Value::Array(items)) if field == "scopes" && items.iter().all(Value::is_string) => {}
            Some(Value::String(_)) if field == "scopes" => {}
            Some(_) => problems.push(TokenProblem::WrongType(field)),
        }
    }

    if let Some(Value::String(expiry)) = object.get("expiry") {
        match expiry_format::parse(expiry) {
            Some(at) if at <= now => problems.push(TokenProblem::Expired(at)),
            Some(_) => {}
            None => problems.push(TokenProblem::BadExpiry(expiry.clone())),
        }
    }

    let granted: Vec<&str> = match object.get("scopes") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(joined)) => joined.split_whitespace().collect(),
        _ => Vec::new(),
    };
    problems.extend(
        required
            .iter()
            .filter(|scope| !granted.contains(&scope.as_str()))
            .map(|scope| TokenProblem::MissingScope(scope.clone())),
    );

    let record = serde_json::from_value::<TokenRecord>(value.clone()).ok();

    TokenReport { problems, record }
}

/// File-backed token storage.
///
/// Writes go to a sibling temp file that is renamed into place, so a crash
/// never leaves a half-written token behind. On Unix the file is created
/// with mode 0600.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Returns the file's bytes, or `None` when it does not exist.
    pub fn read_raw(&self) -> GoogleResult<Option<Vec<u8>>> {
        if !self.path.exists() {
            debug!("no token file at {}", self.path.display());
            return Ok(None);
        }
        fs::read(&self.path).map(Some).map_err(|e| {
            GoogleError::configuration(format!(
                "failed to read token file {}: {}",
                self.path.display(),
                e
            ))
            .with_source(e)
        })
    }

    /// Loads and parses the token, or `None` when the file does not exist.
    pub fn load(&self) -> GoogleResult<Option<TokenRecord>> {
        let Some(bytes) = self.read_raw()? else {
            return Ok(None);
        };
        let content = String::from_utf8(bytes).map_err(|_| {
            GoogleError::token_invalid(format!("token file is not UTF-8; {}", REAUTH_HINT))
        })?;
        let record = TokenRecord::from_json(&content)?;
        debug!("loaded token from {}", self.path.display());
        Ok(Some(record))
    }

    pub fn save(&self, record: &TokenRecord) -> GoogleResult<()> {
        let content = record.to_json()?;
        self.write_raw(content.as_bytes())?;
        info!("saved token to {}", self.path.display());
        Ok(())
    }

    /// Replaces the file with `bytes` exactly as given.
    pub fn write_raw(&self, bytes: &[u8]) -> GoogleResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                GoogleError::configuration(format!("failed to create token directory: {}", e))
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, bytes).map_err(|e| {
            GoogleError::configuration(format!("failed to write token file: {}", e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            GoogleError::configuration(format!("failed to rename token file: {}", e))
        })?;
        Ok(())
    }

    /// Deletes the file. Returns whether there was one.
    pub fn remove(&self) -> GoogleResult<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path).map_err(|e| {
            GoogleError::configuration(format!("failed to remove token file: {}", e))
        })?;
        info!("removed token file {}", self.path.display());
        Ok(true)
    }
}

/// `expiry` is written with microseconds and a `Z` suffix; naive
/// timestamps are read as UTC.
mod expiry_format {
    use super::*;
    use serde::{Deserializer, Serializer};

    const WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.serialize_str(&at.format(WRITE_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid expiry: {}", raw))),
        }
    }
}

/// `scopes` is a list, but some writers store one space-separated string.
mod scope_list {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scopes {
        List(Vec<String>),
        Joined(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Ok(match Option::<Scopes>::deserialize(deserializer)? {
            Some(Scopes::List(list)) => list,
            Some(Scopes::Joined(joined)) => joined.split_whitespace().map(String::from).collect(),
            None => Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GoogleErrorCode;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 14, 3, 0, 0).unwrap()
    }

    const FULL: &str = r#"{"token": "ya29.a0", "refresh_token": "1//0e", "token_uri": "https://oauth2.googleapis.com/token", "client_id": "abc.apps.googleusercontent.com", "client_secret": "s3cret", "scopes": ["https://www.googleapis.com/auth/calendar.readonly", "https://www.googleapis.com/auth/gmail.send"], "universe_domain": "googleapis.com", "account": "", "expiry": "2025-11-14T03:59:58.123456Z"}"#;

    #[test]
    fn parses_library_output() {
        let record = TokenRecord::from_json(FULL).unwrap();
        assert_eq!(record.token.as_deref(), Some("ya29.a0"));
        assert_eq!(record.refresh_token, "1//0e");
        assert_eq!(record.scopes, combined_scopes());
        assert_eq!(
            record.expiry.unwrap(),
            Utc.with_ymd_and_hms(2025, 11, 14, 3, 59, 58).unwrap()
                + Duration::microseconds(123456)
        );
        assert_eq!(record.extra.get("universe_domain"), Some(&Value::from("googleapis.com")));
    }

    #[test]
    fn writes_microsecond_expiry_and_keeps_extras() {
        let record = TokenRecord::from_json(FULL).unwrap();
        let json = record.to_json().unwrap();
        assert!(json.contains(r#""expiry":"2025-11-14T03:59:58.123456Z""#));
        assert!(json.contains(r#""universe_domain":"googleapis.com""#));
        assert!(json.contains(r#""account":"""#));
    }

    #[test]
    fn accepts_naive_expiry_and_joined_scopes() {
        let json = r#"{"refresh_token": "r", "client_id": "c", "client_secret": "s",
                       "scopes": "https://www.googleapis.com/auth/gmail.send https://www.googleapis.com/auth/calendar.readonly",
                       "expiry": "2025-11-14T04:00:00"}"#;
        let record = TokenRecord::from_json(json).unwrap();
        assert_eq!(record.scopes.len(), 2);
        assert_eq!(record.scopes[0], GMAIL_SEND_SCOPE);
        assert_eq!(record.token_uri, GOOGLE_TOKEN_URI);
        assert_eq!(record.expiry, Some(Utc.with_ymd_and_hms(2025, 11, 14, 4, 0, 0).unwrap()));
        assert!(record.token.is_none());
    }

    #[test]
    fn mandatory_fields_for_loading() {
        let err = TokenRecord::from_json(r#"{"token": "t", "client_id": "c", "client_secret": "s"}"#)
            .unwrap_err();
        assert_eq!(err.code(), GoogleErrorCode::TokenInvalid);
        assert!(err.message().contains("courtbot auth"));
    }

    #[test]
    fn expiry_uses_refresh_threshold() {
        let mut record = TokenRecord::from_json(FULL).unwrap();
        record.expiry = Some(now() + Duration::minutes(10));
        assert!(!record.is_expired_at(now()));
        assert!(record.is_valid_at(now()));

        record.expiry = Some(now() + Duration::minutes(3));
        assert!(record.is_expired_at(now()));
        assert!(!record.is_valid_at(now()));

        record.expiry = None;
        assert!(!record.is_expired_at(now()));

        record.token = None;
        assert!(!record.is_valid_at(now()));
    }

    #[test]
    fn scope_checks() {
        let mut record = TokenRecord::from_json(FULL).unwrap();
        assert!(record.has_scopes(&combined_scopes()));

        record.scopes = vec![CALENDAR_READONLY_SCOPE.to_string()];
        assert!(!record.has_scopes(&combined_scopes()));
        assert_eq!(record.missing_scopes(&combined_scopes()), vec![GMAIL_SEND_SCOPE.to_string()]);
    }

    #[test]
    fn grant_updates_token_and_expiry() {
        let mut record = TokenRecord::from_json(FULL).unwrap();
        record.apply_grant(
            TokenGrant {
                access_token: "ya29.new".to_string(),
                refresh_token: None,
                expires_in: Some(3599),
                scope: None,
                token_type: Some("Bearer".to_string()),
            },
            now(),
        );

        assert_eq!(record.token.as_deref(), Some("ya29.new"));
        assert_eq!(record.refresh_token, "1//0e");
        assert_eq!(record.expiry, Some(now() + Duration::seconds(3599)));
        assert_eq!(record.scopes, combined_scopes());
    }

    #[test]
    fn inspect_complete_file() {
        let report = inspect(FULL, &combined_scopes(), now());
        assert!(report.is_ok(), "{:?}", report.problems);
        assert!(report.is_usable());
    }

    #[test]
    fn inspect_reports_every_problem() {
        let raw = r#"{"refresh_token": "r", "client_id": "c", "client_secret": "s",
                      "token_uri": 5, "scopes": ["https://www.googleapis.com/auth/calendar.readonly"],
                      "expiry": "2025-11-14T02:00:00Z"}"#;
        let report = inspect(raw, &combined_scopes(), now());

        assert!(report.problems.contains(&TokenProblem::MissingField("token")));
        assert!(report.problems.contains(&TokenProblem::WrongType("token_uri")));
        assert!(report.problems.contains(&TokenProblem::MissingScope(GMAIL_SEND_SCOPE.to_string())));
        assert!(report.problems.contains(&TokenProblem::Expired(
            Utc.with_ymd_and_hms(2025, 11, 14, 2, 0, 0).unwrap()
        )));
        assert!(!report.is_usable());
    }

    #[test]
    fn inspect_expired_only_is_still_usable() {
        let raw = FULL.replace("2025-11-14T03:59:58.123456Z", "2025-11-13T00:00:00Z");
        let report = inspect(&raw, &combined_scopes(), now());
        assert!(!report.is_ok());
        assert!(report.is_usable());
    }

    #[test]
    fn inspect_garbage() {
        let report = inspect("not json", &combined_scopes(), now());
        assert!(matches!(report.problems[0], TokenProblem::NotJson(_)));
        assert!(report.record.is_none());

        let report = inspect("[1, 2]", &combined_scopes(), now());
        assert_eq!(report.problems, vec![TokenProblem::NotAnObject]);

        let raw = FULL.replace("2025-11-14T03:59:58.123456Z", "next tuesday");
        let report = inspect(&raw, &combined_scopes(), now());
        assert!(report.problems.contains(&TokenProblem::BadExpiry("next tuesday".to_string())));
    }

    #[test]
    fn store_roundtrip_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        assert!(store.load().unwrap().is_none());

        let record = TokenRecord::from_json(FULL).unwrap();
        store.save(&record).unwrap();
        assert!(store.exists());
        assert!(!dir.path().join("token.json.tmp").exists());
        assert_eq!(store.load().unwrap().unwrap(), record);

        assert!(store.remove().unwrap());
        assert!(!store.remove().unwrap());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn raw_write_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested").join("token.json"));
        store.write_raw(FULL.as_bytes()).unwrap();
        assert_eq!(store.read_raw().unwrap().unwrap(), FULL.as_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("token.json"));
        store.write_raw(b"{}").unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
