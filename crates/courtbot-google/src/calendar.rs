//! Google Calendar API client.
//!
//! Only what conflict filtering needs: listing events of one calendar in a
//! window and turning them into [`BusyRange`]s.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use courtbot_core::BusyRange;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{GoogleError, GoogleResult};

/// Base URL for Google Calendar API v3.
const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Google Calendar API client.
#[derive(Debug)]
pub struct CalendarClient {
    http_client: reqwest::Client,
    access_token: String,
    base_url: String,
    /// Offset used to place all-day events on the local day.
    local_offset: FixedOffset,
}

impl CalendarClient {
    pub fn new(
        access_token: impl Into<String>,
        timeout: Duration,
        local_offset: FixedOffset,
    ) -> GoogleResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GoogleError::internal(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            access_token: access_token.into(),
            base_url: CALENDAR_API_BASE.to_string(),
            local_offset,
        })
    }

    /// Points the client at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Lists busy ranges of `calendar_id` between `time_min` and `time_max`.
    ///
    /// Recurring events are expanded server-side and every page is
    /// followed. Cancelled events and events without usable times are
    /// skipped.
    pub async fn list_busy(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> GoogleResult<Vec<BusyRange>> {
        let mut ranges = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_events_page(calendar_id, time_min, time_max, page_token.as_deref())
                .await?;

            ranges.extend(page.items.iter().filter_map(|e| self.to_busy_range(e)));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("fetched {} busy ranges from calendar {}", ranges.len(), calendar_id);
        Ok(ranges)
    }

    async fn list_events_page(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> GoogleResult<EventListResponse> {
        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        );

        let mut request = self
            .http_client
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("timeMin", time_min.to_rfc3339()),
                ("timeMax", time_max.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ]);

        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await.map_err(|e| {
            let err = if e.is_timeout() {
                GoogleError::network("request timeout")
            } else if e.is_connect() {
                GoogleError::network(format!("connection failed: {}", e))
            } else {
                GoogleError::network(format!("request failed: {}", e))
            };
            err.with_service("calendar")
        })?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(GoogleError::rate_limited(format!(
                "rate limit exceeded{}",
                retry_after
                    .map(|s| format!(", retry after {} seconds", s))
                    .unwrap_or_default()
            ))
            .with_service("calendar"));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(
                GoogleError::authentication("access token expired or invalid")
                    .with_service("calendar"),
            );
        }

        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(GoogleError::authorization(
                "access denied to calendar; the token may lack the calendar.readonly scope",
            )
            .with_service("calendar"));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(
                GoogleError::not_found(format!("calendar {} not found", calendar_id))
                    .with_service("calendar"),
            );
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                GoogleError::server(format!("API error ({}): {}", status, body))
                    .with_service("calendar"),
            );
        }

        let body = response.text().await.map_err(|e| {
            GoogleError::network(format!("failed to read response: {}", e)).with_service("calendar")
        })?;

        serde_json::from_str(&body).map_err(|e| {
            GoogleError::invalid_response(format!("failed to parse response: {}", e))
                .with_service("calendar")
        })
    }

    fn to_busy_range(&self, event: &ApiEvent) -> Option<BusyRange> {
        if event.status.as_deref() == Some("cancelled") {
            return None;
        }
        event_busy_range(event, self.local_offset)
    }
}

/// Converts one API event to a busy range.
///
/// Timed events use their RFC 3339 instants. All-day events cover whole
/// local days; `end.date` is exclusive and defaults to the start date when
/// missing.
fn event_busy_range(event: &ApiEvent, offset: FixedOffset) -> Option<BusyRange> {
    let id = event.id.as_deref().unwrap_or("?");

    if let Some(ref start) = event.start.date_time {
        let end = event.end.date_time.as_deref()?;
        let range = BusyRange::timed(start, end);
        if range.is_none() {
            warn!("event {} has unparseable times", id);
        }
        return range;
    }

    let start_raw = event.start.date.as_deref()?;
    let end_raw = event.end.date.as_deref().unwrap_or(start_raw);
    let (Ok(start), Ok(end)) = (
        NaiveDate::parse_from_str(start_raw, "%Y-%m-%d"),
        NaiveDate::parse_from_str(end_raw, "%Y-%m-%d"),
    ) else {
        warn!("event {} has unparseable dates", id);
        return None;
    };

    BusyRange::all_day(start, end, offset)
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

/// The subset of an event resource used here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    status: Option<String>,
    #[serde(default)]
    start: ApiEventTime,
    #[serde(default)]
    end: ApiEventTime,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
}
