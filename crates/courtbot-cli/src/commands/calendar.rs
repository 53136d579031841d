//! Calendar commands.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use courtbot_core::{BusyRange, ConflictPolicy, Slot, fetch_window, has_conflict, parse_slots};
use courtbot_google::CalendarClient;
use tracing::{debug, info};

use super::{access_token, read_input};
use crate::config::CourtbotConfig;
use crate::error::{CliError, CliResult};

/// Lists busy ranges for the next `days` days.
pub async fn busy(config: &CourtbotConfig, days: Option<u32>) -> CliResult<()> {
    let days = days.unwrap_or(config.calendar.lookahead_days);
    let now = Utc::now();
    let ranges = fetch_busy(config, now, lookahead_end(now, days)?).await?;

    let offset = config.calendar.policy().offset();
    println!("{} busy range(s) in the next {} days:", ranges.len(), days);
    for (i, range) in ranges.iter().enumerate() {
        println!(
            "  [{}] {} - {}",
            i + 1,
            range.start.with_timezone(&offset).format("%Y-%m-%d %H:%M"),
            range.end.with_timezone(&offset).format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

/// `now` plus `days`, refused when the date would not be representable.
fn lookahead_end(now: DateTime<Utc>, days: u32) -> CliResult<DateTime<Utc>> {
    Duration::try_days(i64::from(days))
        .and_then(|span| now.checked_add_signed(span))
        .ok_or_else(|| CliError::Config(format!("cannot look {} days ahead", days)))
}

/// Prints the scraper availability lines that do not clash with the calendar.
pub async fn filter(config: &CourtbotConfig, input: Option<&Path>) -> CliResult<()> {
    let text = read_input(input)?;
    let lines: Vec<&str> = text.lines().collect();
    for line in filter_lines(config, &lines).await? {
        println!("{}", line);
    }
    Ok(())
}

/// Fetches busy ranges and checks that each one conflicts with a slot
/// placed exactly on it, the quickest way to see that time zones line up.
pub async fn verify(config: &CourtbotConfig) -> CliResult<()> {
    let now = Utc::now();
    let ranges = fetch_busy(config, now, lookahead_end(now, config.calendar.lookahead_days)?).await?;

    println!("Authenticated. {} busy range(s).", ranges.len());
    let policy = config.calendar.policy();
    let mut mismatches = 0;
    for (i, range) in ranges.iter().take(5).enumerate() {
        let Some(slot) = slot_on(range, &policy) else {
            continue;
        };
        let conflict = has_conflict(&slot, &ranges, &policy);
        if !conflict {
            mismatches += 1;
        }
        println!(
            "  [{}] {} {}-{} conflict={}",
            i + 1,
            slot.date.map(|d| d.to_string()).unwrap_or_default(),
            slot.start_time.as_deref().unwrap_or("?"),
            slot.end_time.as_deref().unwrap_or("?"),
            if conflict { "yes" } else { "no" }
        );
    }

    if mismatches > 0 {
        println!("{} range(s) did not conflict with their own slot; check calendar.utc_offset_hours.", mismatches);
    }
    Ok(())
}

/// Drops availability lines whose slot clashes with the calendar.
///
/// Only the window covering the dated slots is fetched. Lines that are not
/// parseable slots are kept untouched.
pub(crate) async fn filter_lines(config: &CourtbotConfig, lines: &[&str]) -> CliResult<Vec<String>> {
    let slots = parse_slots(&lines.join("\n"));
    let Some((time_min, time_max)) = fetch_window(&slots) else {
        debug!("no dated slots, skipping calendar");
        return Ok(lines.iter().map(|l| l.to_string()).collect());
    };

    let ranges = fetch_busy(config, time_min, time_max).await?;
    let kept = free_lines(lines, &ranges, &config.calendar.policy());
    info!("{} of {} line(s) are free in the calendar", kept.len(), lines.len());
    Ok(kept)
}

async fn fetch_busy(
    config: &CourtbotConfig,
    time_min: DateTime<Utc>,
    time_max: DateTime<Utc>,
) -> CliResult<Vec<BusyRange>> {
    let token = access_token(config).await?;
    let client = CalendarClient::new(token, config.timeout(), config.calendar.policy().offset())?;
    Ok(client
        .list_busy(&config.google.calendar_id, time_min, time_max)
        .await?)
}

/// Keeps lines that are not slots or whose slot is free.
fn free_lines(lines: &[&str], ranges: &[BusyRange], policy: &ConflictPolicy) -> Vec<String> {
    lines
        .iter()
        .filter(|line| match Slot::parse_line(line) {
            Some(slot) => !has_conflict(&slot, ranges, policy),
            None => true,
        })
        .map(|line| line.to_string())
        .collect()
}

/// A slot covering `range` in local time, when it starts and ends on the
/// same local day.
fn slot_on(range: &BusyRange, policy: &ConflictPolicy) -> Option<Slot> {
    let offset = policy.offset();
    let start = range.start.with_timezone(&offset);
    let end = range.end.with_timezone(&offset);
    if start.date_naive() != end.date_naive() {
        return None;
    }
    Some(Slot {
        index: 0,
        line: String::new(),
        date: Some(start.date_naive()),
        start_time: Some(start.format("%H:%M").to_string()),
        end_time: Some(end.format("%H:%M").to_string()),
        court: String::new(),
    })
}
