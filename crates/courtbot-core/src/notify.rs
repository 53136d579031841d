//! Turning a scraper run into a notification mail.
//!
//! Classification order matters: a failed run always reports the failure,
//! a completed booking always beats plain availability, and a run with no
//! availability lines sends nothing at all.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const SUBJECT_FAILED: &str = "【エラー】荒川区テニスコートスクレイピング失敗";
const SUBJECT_BOOKED: &str = "【自動通知】荒川区テニスコート 予約が完了しました";
const SUBJECT_AVAILABILITY: &str = "【自動通知】荒川区テニスコート 休日空き状況";

const BOOKED_MARKER: &str = "BOOKED:";
const STDERR_HEADER: &str = "--- エラー出力 ---";
const NO_STDERR: &str = "(なし)";
const EMPTY_BODY: &str = "(本文なし)";
const BOOKED_INTRO: &str = "以下の枠で予約が完了しました。";
const BOOKED_FOOTER: &str = "※キャンセルが必要な場合は手動で区のサイトから行ってください。";

static HIT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d+\]").expect("hit line regex"));

/// Captured result of one scraper execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperRun {
    pub stdout: String,
    pub stderr: String,
    /// False on a non-zero exit, a signal, or a timeout.
    pub success: bool,
}

impl ScraperRun {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, success: bool) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            success,
        }
    }
}

/// The kind of mail to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ScraperFailed,
    Booked,
    Availability,
}

impl NotificationKind {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::ScraperFailed => SUBJECT_FAILED,
            Self::Booked => SUBJECT_BOOKED,
            Self::Availability => SUBJECT_AVAILABILITY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScraperFailed => "scraper_failed",
            Self::Booked => "booked",
            Self::Availability => "availability",
        }
    }
}

/// A composed mail, ready to address and send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub subject: String,
    pub body: String,
}

impl Notification {
    fn new(kind: NotificationKind, body: String) -> Self {
        Self {
            kind,
            subject: kind.subject().to_string(),
            body,
        }
    }

    /// Decides what, if anything, to send for a scraper run.
    pub fn classify(run: &ScraperRun) -> Option<Self> {
        let hits = hit_lines(&run.stdout).join("\n").trim().to_string();

        if !run.success {
            let stderr = run.stderr.trim();
            let stderr = if stderr.is_empty() { NO_STDERR } else { stderr };
            let body = format!("{hits}\n\n{STDERR_HEADER}\n{stderr}");
            return Some(Self::new(
                NotificationKind::ScraperFailed,
                non_empty(body.trim()),
            ));
        }

        let booked = booked_details(&run.stdout);
        if !booked.is_empty() {
            return Some(Self::new(NotificationKind::Booked, booked_body(&booked)));
        }

        if hits.is_empty() {
            return None;
        }

        Some(Self::new(NotificationKind::Availability, non_empty(&hits)))
    }

    /// Same as [`classify`](Self::classify) but with the availability lines
    /// replaced, e.g. after calendar filtering. Returns `None` when the
    /// replacement leaves no availability to report.
    pub fn availability(lines: &[String]) -> Option<Self> {
        let body = lines.join("\n").trim().to_string();
        if body.is_empty() {
            return None;
        }
        Some(Self::new(NotificationKind::Availability, body))
    }
}

/// Lines that report a free slot, i.e. start with `[<digits>]`.
pub fn hit_lines(stdout: &str) -> Vec<&str> {
    stdout
        .lines()
        .filter(|line| HIT_LINE.is_match(line.trim()))
        .collect()
}

/// Details of every `BOOKED:` line, marker removed.
pub fn booked_details(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.contains(BOOKED_MARKER))
        .map(|line| line.trim().replacen(BOOKED_MARKER, "", 1).trim().to_string())
        .collect()
}

fn booked_body(details: &[String]) -> String {
    let mut parts = vec![BOOKED_INTRO.to_string(), String::new()];
    parts.extend(
        details
            .iter()
            .enumerate()
            .map(|(i, detail)| format!("{}. {}", i + 1, detail)),
    );
    parts.push(String::new());
    parts.push(BOOKED_FOOTER.to_string());
    parts.join("\n")
}

fn non_empty(body: &str) -> String {
    if body.is_empty() {
        EMPTY_BODY.to_string()
    } else {
        body.to_string()
    }
}
