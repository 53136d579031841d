//! Court slots reported by the availability scraper.
//!
//! The scraper prints one line per free slot:
//!
//! ```text
//! [3] 令和07年11月14日(金), 13:00-15:00, 荒川遊園テニスコート A に空きがあります。
//! ```
//!
//! Either label may be a placeholder (`日付不明`, `時間不明`) when the page
//! layout did not yield it. Such slots still parse; they simply never
//! conflict with the calendar.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// First Gregorian year of the Reiwa era.
const REIWA_EPOCH: i32 = 2018;

static SLOT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(\d+)\]\s*(.+?),\s*(.+?),\s*(.+?)\s*に空きがあります。?\s*$")
        .expect("slot line regex")
});

static ERA_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(令和)|(\d{4})年)(?:(\d+)年)?(\d{1,2})月(\d{1,2})日").expect("date regex")
});

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2}:\d{2})\s*[-~～〜]\s*(\d{1,2}:\d{2})$").expect("time range regex")
});

/// A free court slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// The `[n]` counter printed by the scraper.
    pub index: usize,
    /// The line exactly as printed, used when forwarding the slot.
    pub line: String,
    pub date: Option<NaiveDate>,
    /// `"HH:MM"`.
    pub start_time: Option<String>,
    /// `"HH:MM"`.
    pub end_time: Option<String>,
    pub court: String,
}

impl Slot {
    /// Parses one scraper availability line.
    ///
    /// Returns `None` for any other kind of line (debug output, headings,
    /// `BOOKED:` reports).
    pub fn parse_line(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        let caps = SLOT_LINE.captures(trimmed)?;

        let index = caps[1].parse().ok()?;
        let date = parse_date_label(&caps[2]);
        let (start_time, end_time) = match TIME_RANGE.captures(caps[3].trim()) {
            Some(t) => (Some(t[1].to_string()), Some(t[2].to_string())),
            None => (None, None),
        };

        Some(Self {
            index,
            line: trimmed.to_string(),
            date,
            start_time,
            end_time,
            court: caps[4].trim().to_string(),
        })
    }

    /// Start of the slot in minutes after midnight, if known.
    pub fn start_minutes(&self) -> Option<u32> {
        self.start_time.as_deref().map(parse_minutes)
    }

    /// End of the slot in minutes after midnight, if known.
    pub fn end_minutes(&self) -> Option<u32> {
        self.end_time.as_deref().map(parse_minutes)
    }
}

/// Parses every availability line in a block of scraper output.
pub fn parse_slots(text: &str) -> Vec<Slot> {
    text.lines().filter_map(Slot::parse_line).collect()
}

/// Converts `"09:00"` to `540`.
///
/// Anything that is not two integer parts separated by a colon yields 0,
/// which the conflict check treats as "time unknown". So does a value too
/// large to count in minutes.
pub fn parse_minutes(time: &str) -> u32 {
    let parts: Vec<&str> = time.trim().split(':').collect();
    if parts.len() != 2 {
        return 0;
    }
    match (parts[0].parse::<u32>(), parts[1].parse::<u32>()) {
        (Ok(h), Ok(m)) => h.checked_mul(60).and_then(|h| h.checked_add(m)).unwrap_or(0),
        _ => 0,
    }
}

/// Parses a date label as shown on the reservation site.
///
/// Accepts `令和07年11月14日(金)` and `2025年11月14日(金)`; the weekday
/// suffix is ignored.
pub fn parse_date_label(label: &str) -> Option<NaiveDate> {
    let caps = ERA_DATE.captures(label)?;

    let year = if caps.get(1).is_some() {
        let era_year: i32 = caps.get(3)?.as_str().parse().ok()?;
        if era_year < 1 {
            return None;
        }
        REIWA_EPOCH + era_year
    } else {
        if caps.get(3).is_some() {
            return None;
        }
        caps.get(2)?.as_str().parse().ok()?
    };

    let month = caps[4].parse().ok()?;
    let day = caps[5].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn minutes_from_clock_time() {
        assert_eq!(parse_minutes("09:00"), 540);
        assert_eq!(parse_minutes(" 13:30 "), 810);
        assert_eq!(parse_minutes("0:05"), 5);
    }

    #[test]
    fn minutes_from_garbage_is_zero() {
        assert_eq!(parse_minutes(""), 0);
        assert_eq!(parse_minutes("9"), 0);
        assert_eq!(parse_minutes("aa:bb"), 0);
        assert_eq!(parse_minutes("1:2:3"), 0);
    }

    #[test]
    fn minutes_overflow_is_zero() {
        assert_eq!(parse_minutes("99999999:00"), 0);
        assert_eq!(parse_minutes("1:4294967295"), 0);
    }

    #[test]
    fn reiwa_date_label() {
        assert_eq!(
            parse_date_label("令和07年11月14日(金)"),
            Some(date(2025, 11, 14))
        );
        assert_eq!(parse_date_label("令和1年5月1日"), Some(date(2019, 5, 1)));
    }

    #[test]
    fn gregorian_date_label() {
        assert_eq!(
            parse_date_label("2026年01月03日(土)"),
            Some(date(2026, 1, 3))
        );
    }

    #[test]
    fn unknown_or_impossible_dates() {
        assert_eq!(parse_date_label("日付不明"), None);
        assert_eq!(parse_date_label("令和07年02月30日"), None);
        assert_eq!(parse_date_label("令和00年01月01日"), None);
    }

    #[test]
    fn parse_full_line() {
        let slot = Slot::parse_line(
            "[3] 令和07年11月14日(金), 13:00-15:00, 荒川遊園テニスコート A に空きがあります。",
        )
        .unwrap();

        assert_eq!(slot.index, 3);
        assert_eq!(slot.date, Some(date(2025, 11, 14)));
        assert_eq!(slot.start_time.as_deref(), Some("13:00"));
        assert_eq!(slot.end_time.as_deref(), Some("15:00"));
        assert_eq!(slot.court, "荒川遊園テニスコート A");
        assert_eq!(slot.start_minutes(), Some(780));
        assert_eq!(slot.end_minutes(), Some(900));
    }

    #[test]
    fn parse_line_with_placeholders() {
        let slot = Slot::parse_line("[1] 日付不明, 時間不明, コート不明 に空きがあります。").unwrap();
        assert_eq!(slot.date, None);
        assert_eq!(slot.start_time, None);
        assert_eq!(slot.end_time, None);
        assert_eq!(slot.court, "コート不明");
    }

    #[test]
    fn wave_dash_separator() {
        let slot =
            Slot::parse_line("[2] 令和07年11月15日(土), 9:00～11:00, 汐入公園 に空きがあります。")
                .unwrap();
        assert_eq!(slot.start_time.as_deref(), Some("9:00"));
        assert_eq!(slot.end_time.as_deref(), Some("11:00"));
    }

    #[test]
    fn non_slot_lines_are_ignored() {
        let output = "=== list_ok_cells START ===\n\
                      件数: 2\n\
                      [1] 令和07年11月14日(金), 09:00-11:00, 町屋 に空きがあります。\n\
                      BOOKED: 令和07年11月14日(金) 09:00-11:00 町屋\n\
                      [2] 令和07年11月14日(金), 11:00-13:00, 町屋 に空きがあります。\n";

        let slots = parse_slots(output);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].index, 1);
        assert_eq!(slots[1].start_time.as_deref(), Some("11:00"));
    }
}
