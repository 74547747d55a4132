//! Time-grid helpers: 30-minute slot labels and Monday-aligned weeks.
//!
//! Availability is declared on a fixed grid of half-hour slots addressed by
//! `"HH:MM"` labels (24h). Weeks are identified by their Monday date; a
//! recurring availability template stores slots under the dates of an
//! arbitrary template week and is remapped to the queried week at read time.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Minutes per grid slot.
pub const SLOT_MINUTES: u32 = 30;

/// A single slot label on the 30-minute grid, e.g. `12:30`.
///
/// Ordering follows wall-clock time, so slot sets iterate earliest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeLabel(NaiveTime);

impl TimeLabel {
    /// Build a label from hour/minute, validating the grid alignment.
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if minute % SLOT_MINUTES != 0 {
            return Err(Error::InvalidInput(format!(
                "time label {:02}:{:02} is not on the {}-minute grid",
                hour, minute, SLOT_MINUTES
            )));
        }
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(TimeLabel)
            .ok_or_else(|| {
                Error::InvalidInput(format!("invalid time label {:02}:{:02}", hour, minute))
            })
    }

    /// The wall-clock time this label denotes.
    pub fn time(&self) -> NaiveTime {
        self.0
    }

    /// Combine with a calendar day into a concrete timestamp.
    pub fn on_day(&self, day: NaiveDate) -> NaiveDateTime {
        day.and_time(self.0)
    }
}

impl fmt::Display for TimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl FromStr for TimeLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let time = NaiveTime::parse_from_str(s, "%H:%M")
            .map_err(|_| Error::InvalidInput(format!("invalid time label '{}'", s)))?;
        if time.format("%H:%M").to_string() != s {
            return Err(Error::InvalidInput(format!("invalid time label '{}'", s)));
        }
        TimeLabel::new(
            chrono::Timelike::hour(&time),
            chrono::Timelike::minute(&time),
        )
    }
}

impl TryFrom<String> for TimeLabel {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TimeLabel> for String {
    fn from(label: TimeLabel) -> String {
        label.to_string()
    }
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Storage key for a week-specific availability record.
pub fn week_key(date: NaiveDate) -> String {
    week_start(date).to_string()
}

/// Storage key for the recurring availability template.
pub const RECURRING_KEY: &str = "recurring";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_grid_labels() {
        let label: TimeLabel = "12:30".parse().unwrap();
        assert_eq!(label.to_string(), "12:30");
        assert_eq!(label, TimeLabel::new(12, 30).unwrap());
    }

    #[test]
    fn rejects_off_grid_minutes() {
        assert!("12:15".parse::<TimeLabel>().is_err());
        assert!(TimeLabel::new(9, 10).is_err());
    }

    #[test]
    fn rejects_malformed_labels() {
        assert!("noon".parse::<TimeLabel>().is_err());
        assert!("25:00".parse::<TimeLabel>().is_err());
        assert!("9:00".parse::<TimeLabel>().is_err()); // must be zero-padded
    }

    #[test]
    fn labels_order_by_wall_clock() {
        let early: TimeLabel = "09:00".parse().unwrap();
        let late: TimeLabel = "17:30".parse().unwrap();
        assert!(early < late);
    }

    #[test]
    fn week_start_is_monday_aligned() {
        // 2023-08-01 is a Tuesday; its week starts Monday 2023-07-31.
        let tue = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        let monday = NaiveDate::from_ymd_opt(2023, 7, 31).unwrap();
        assert_eq!(week_start(tue), monday);
        assert_eq!(week_start(monday), monday);
        // Sunday maps back to the same Monday.
        let sun = NaiveDate::from_ymd_opt(2023, 8, 6).unwrap();
        assert_eq!(week_start(sun), monday);
    }

    #[test]
    fn label_combines_with_day() {
        let label: TimeLabel = "13:00".parse().unwrap();
        let day = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        let ts = label.on_day(day);
        assert_eq!(ts.to_string(), "2023-08-01 13:00:00");
    }

    #[test]
    fn serde_round_trips_as_string() {
        let label: TimeLabel = "18:30".parse().unwrap();
        let json = serde_json::to_string(&label).unwrap();
        assert_eq!(json, "\"18:30\"");
        let back: TimeLabel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, label);
    }
}
