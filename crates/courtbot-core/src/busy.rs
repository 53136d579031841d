//! Busy ranges from the calendar and slot conflict detection.
//!
//! A slot is rejected when any busy range overlaps the slot widened by
//! [`ConflictPolicy::buffer_hours`] on both sides, clamped to the slot's
//! day. For a 13:00-15:00 slot with the default policy, anything touching
//! 11:00:00-17:00:59 local time is a conflict.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::slot::Slot;

/// Last minute of the day, 23:59.
const LAST_MINUTE: u32 = 24 * 60 - 1;

/// A period during which the calendar owner is busy, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BusyRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Builds a range from two RFC 3339 timestamps of a timed event.
    pub fn timed(start: &str, end: &str) -> Option<Self> {
        let start = DateTime::parse_from_rfc3339(start).ok()?;
        let end = DateTime::parse_from_rfc3339(end).ok()?;
        Some(Self::new(start.with_timezone(&Utc), end.with_timezone(&Utc)))
    }

    /// Builds a range for an all-day event.
    ///
    /// `end_exclusive` is the calendar API's `end.date`, which names the day
    /// after the event. The range covers `start 00:00:00` up to
    /// `end_exclusive - 1 day 23:59:59` in `offset`.
    pub fn all_day(start: NaiveDate, end_exclusive: NaiveDate, offset: FixedOffset) -> Option<Self> {
        let last_day = end_exclusive - Duration::days(1);
        let start_local = start.and_time(NaiveTime::MIN);
        let end_local = last_day.and_hms_opt(23, 59, 59)?;

        let start = offset.from_local_datetime(&start_local).single()?;
        let end = offset.from_local_datetime(&end_local).single()?;
        Some(Self::new(start.with_timezone(&Utc), end.with_timezone(&Utc)))
    }

    /// Strict overlap: touching endpoints do not count.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }
}

/// How a slot is compared against busy ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictPolicy {
    /// Hours before and after the slot that must be free.
    pub buffer_hours: u32,
    /// Offset of the reservation site's local time from UTC.
    pub utc_offset_hours: i32,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            buffer_hours: 2,
            utc_offset_hours: 9,
        }
    }
}

impl ConflictPolicy {
    /// The fixed offset for slot times, falling back to UTC when the
    /// configured value is out of range.
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .unwrap_or(Utc.fix())
    }

    /// The UTC window that must be free for `slot`, if the slot has enough
    /// information to be checked.
    pub fn check_window(&self, slot: &Slot) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start_mins = slot.start_minutes()?;
        let end_mins = slot.end_minutes()?;
        if start_mins == 0 && end_mins == 0 {
            return None;
        }
        let date = slot.date?;

        let buffer = self.buffer_hours.saturating_mul(60);
        let from = start_mins.saturating_sub(buffer);
        let to = end_mins.saturating_add(buffer).min(LAST_MINUTE);

        let from = date.and_hms_opt(from / 60, from % 60, 0)?;
        let to = date.and_hms_opt(to / 60, to % 60, 59)?;

        let offset = self.offset();
        let from = offset.from_local_datetime(&from).single()?;
        let to = offset.from_local_datetime(&to).single()?;
        Some((from.with_timezone(&Utc), to.with_timezone(&Utc)))
    }
}

/// Returns true when `slot` cannot be booked because of a busy range.
///
/// Slots without a date or time never conflict.
pub fn has_conflict(slot: &Slot, ranges: &[BusyRange], policy: &ConflictPolicy) -> bool {
    let Some((from, to)) = policy.check_window(slot) else {
        trace!(index = slot.index, "slot has no usable time, keeping it");
        return false;
    };

    match ranges.iter().find(|r| r.overlaps(from, to)) {
        Some(range) => {
            debug!(
                index = slot.index,
                busy_start = %range.start,
                busy_end = %range.end,
                "slot conflicts with calendar"
            );
            true
        }
        None => false,
    }
}

/// Keeps the slots that do not conflict, in their original order.
pub fn filter_slots(slots: Vec<Slot>, ranges: &[BusyRange], policy: &ConflictPolicy) -> Vec<Slot> {
    slots
        .into_iter()
        .filter(|slot| !has_conflict(slot, ranges, policy))
        .collect()
}

/// The calendar window to fetch for a set of slots.
///
/// Spans from the earliest slot date at 00:00 UTC to one day after the
/// latest slot date at 23:59:59 UTC, wide enough for any local offset.
pub fn fetch_window(slots: &[Slot]) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let min = slots.iter().filter_map(|s| s.date).min()?;
    let max = slots.iter().filter_map(|s| s.date).max()?;

    let start = Utc.from_utc_datetime(&min.and_time(NaiveTime::MIN));
    let end = Utc.from_utc_datetime(&max.and_hms_opt(23, 59, 59)?) + Duration::days(1);
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn jst_range(d: (i32, u32, u32), from: (u32, u32), to: (u32, u32)) -> BusyRange {
        let date = NaiveDate::from_ymd_opt(d.0, d.1, d.2).unwrap();
        let start = jst()
            .from_local_datetime(&date.and_hms_opt(from.0, from.1, 0).unwrap())
            .unwrap();
        let end = jst()
            .from_local_datetime(&date.and_hms_opt(to.0, to.1, 0).unwrap())
            .unwrap();
        BusyRange::new(start.with_timezone(&Utc), end.with_timezone(&Utc))
    }

    fn slot(start: &str, end: &str) -> Slot {
        Slot {
            index: 1,
            line: String::new(),
            date: NaiveDate::from_ymd_opt(2025, 11, 15),
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
            court: "町屋".to_string(),
        }
    }

    #[test]
    fn timed_range_from_rfc3339() {
        let range = BusyRange::timed("2025-11-15T10:00:00+09:00", "2025-11-15T11:00:00Z").unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2025, 11, 15, 1, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2025, 11, 15, 11, 0, 0).unwrap());
        assert!(BusyRange::timed("tomorrow", "2025-11-15T11:00:00Z").is_none());
    }

    #[test]
    fn all_day_range_is_end_exclusive() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        let range = BusyRange::all_day(start, end, jst()).unwrap();

        // 2025-03-10 00:00 JST .. 2025-03-10 23:59:59 JST
        assert_eq!(range.start, Utc.with_ymd_and_hms(2025, 3, 9, 15, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2025, 3, 10, 14, 59, 59).unwrap());
    }

    #[test]
    fn event_inside_buffer_conflicts() {
        let policy = ConflictPolicy::default();
        let ranges = [jst_range((2025, 11, 15), (16, 30), (18, 0))];
        assert!(has_conflict(&slot("13:00", "15:00"), &ranges, &policy));
    }

    #[test]
    fn event_before_buffer_does_not_conflict() {
        let policy = ConflictPolicy::default();
        let ranges = [jst_range((2025, 11, 15), (9, 0), (11, 0))];
        assert!(!has_conflict(&slot("13:00", "15:00"), &ranges, &policy));
    }

    #[test]
    fn event_right_after_buffer_does_not_conflict() {
        let policy = ConflictPolicy::default();
        // Window ends at 17:00:59; an event starting 17:01 is clear.
        let ranges = [jst_range((2025, 11, 15), (17, 1), (18, 0))];
        assert!(!has_conflict(&slot("13:00", "15:00"), &ranges, &policy));
    }

    #[test]
    fn buffer_is_clamped_to_the_day() {
        let policy = ConflictPolicy::default();
        // 07:00-09:00 widens to 05:00-11:00; late evening of the previous
        // day is outside.
        let ranges = [jst_range((2025, 11, 14), (22, 0), (23, 59))];
        assert!(!has_conflict(&slot("07:00", "09:00"), &ranges, &policy));

        // 21:00-23:00 widens to 19:00-23:59:59.
        let ranges = [jst_range((2025, 11, 15), (23, 30), (23, 45))];
        assert!(has_conflict(&slot("21:00", "23:00"), &ranges, &policy));
    }

    #[test]
    fn huge_buffer_covers_the_whole_day() {
        let policy = ConflictPolicy {
            buffer_hours: u32::MAX,
            ..ConflictPolicy::default()
        };
        let (from, to) = policy.check_window(&slot("13:00", "15:00")).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2025, 11, 14, 15, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2025, 11, 15, 14, 59, 59).unwrap());
    }

    #[test]
    fn out_of_range_offset_falls_back_to_utc() {
        let policy = ConflictPolicy {
            utc_offset_hours: i32::MAX,
            ..ConflictPolicy::default()
        };
        assert_eq!(policy.offset(), Utc.fix());
    }

    #[test]
    fn all_day_event_blocks_every_slot_that_day() {
        let policy = ConflictPolicy::default();
        let day = NaiveDate::from_ymd_opt(2025, 11, 15).unwrap();
        let ranges = [BusyRange::all_day(day, day + Duration::days(1), jst()).unwrap()];
        assert!(has_conflict(&slot("09:00", "11:00"), &ranges, &policy));
        assert!(has_conflict(&slot("19:00", "21:00"), &ranges, &policy));
    }

    #[test]
    fn unknown_time_never_conflicts() {
        let policy = ConflictPolicy::default();
        let day = NaiveDate::from_ymd_opt(2025, 11, 15).unwrap();
        let ranges = [BusyRange::all_day(day, day + Duration::days(1), jst()).unwrap()];

        let mut no_time = slot("09:00", "11:00");
        no_time.start_time = None;
        assert!(!has_conflict(&no_time, &ranges, &policy));

        assert!(!has_conflict(&slot("xx", "yy"), &ranges, &policy));

        let mut no_date = slot("09:00", "11:00");
        no_date.date = None;
        assert!(!has_conflict(&no_date, &ranges, &policy));
    }

    #[test]
    fn filter_keeps_order() {
        let policy = ConflictPolicy::default();
        let ranges = [jst_range((2025, 11, 15), (12, 0), (13, 0))];
        let mut slots = vec![slot("09:00", "11:00"), slot("13:00", "15:00"), slot("19:00", "21:00")];
        for (i, s) in slots.iter_mut().enumerate() {
            s.index = i + 1;
        }

        let kept = filter_slots(slots, &ranges, &policy);
        let indexes: Vec<usize> = kept.iter().map(|s| s.index).collect();
        assert_eq!(indexes, vec![3]);
    }

    #[test]
    fn fetch_window_spans_all_dates() {
        let mut a = slot("09:00", "11:00");
        a.date = NaiveDate::from_ymd_opt(2025, 11, 20);
        let b = slot("09:00", "11:00");
        let mut c = slot("09:00", "11:00");
        c.date = None;

        let (start, end) = fetch_window(&[a, b, c]).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 11, 15, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 11, 21, 23, 59, 59).unwrap());
    }

    #[test]
    fn fetch_window_without_dates() {
        let mut a = slot("09:00", "11:00");
        a.date = None;
        assert!(fetch_window(&[a]).is_none());
        assert!(fetch_window(&[]).is_none());
    }
}
