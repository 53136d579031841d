//! Core types: court slots, busy ranges, notifications, logging
//!
//! Nothing in this crate performs I/O. The Google-facing pieces live in
//! `courtbot-google` and the binary in `courtbot-cli`.

pub mod busy;
pub mod logging;
pub mod notify;
pub mod slot;

pub use busy::{BusyRange, ConflictPolicy, fetch_window, filter_slots, has_conflict};
pub use logging::{LogMode, TracingError, init_tracing};
pub use notify::{Notification, NotificationKind, ScraperRun, booked_details, hit_lines};
pub use slot::{Slot, parse_date_label, parse_minutes, parse_slots};
