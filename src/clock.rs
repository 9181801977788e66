//! # Harbour Time
//!
//! Every comparison in the engine is done in the harbour's local civil time,
//! expressed as minutes since local midnight. This module owns that
//! normalisation so nothing downstream ever touches the host timezone.
//!
//! - [`MinuteOfDay`]: 0–1439, parsed from table strings like `"07:45"`
//! - [`HarbourClock`]: converts an instant to harbour-local time via `chrono-tz`
//! - [`RelativeDay`]: which of yesterday/today/tomorrow a value came from

use crate::config::ConfigError;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MINUTES_PER_DAY: u16 = 1440;

/// Minutes since local midnight, always in `0..1440`.
///
/// # Example
/// ```
/// use sail_check_lib::MinuteOfDay;
///
/// let t = MinuteOfDay::parse("07:45").unwrap();
/// assert_eq!(t.minutes(), 465);
/// assert_eq!(t.to_string(), "07:45");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MinuteOfDay(u16);

impl MinuteOfDay {
    pub const MIDNIGHT: MinuteOfDay = MinuteOfDay(0);

    pub fn new(minutes: u16) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(MinuteOfDay(minutes))
    }

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(MinuteOfDay(hour * 60 + minute))
        } else {
            None
        }
    }

    /// Parse `HH:MM`, `H:MM`, or 12-hour forms like `7:05 pm`.
    ///
    /// Returns `None` for anything else, including an empty cell.
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.trim().to_ascii_lowercase();
        let (body, meridiem) = if let Some(rest) = lower.strip_suffix("am") {
            (rest.trim(), Some(false))
        } else if let Some(rest) = lower.strip_suffix("pm") {
            (rest.trim(), Some(true))
        } else {
            (lower.as_str(), None)
        };

        let (h, m) = body.split_once(':')?;
        if m.len() != 2 {
            return None;
        }
        let hour: u16 = h.trim().parse().ok()?;
        let minute: u16 = m.parse().ok()?;

        let hour = match meridiem {
            None => hour,
            Some(_) if hour == 0 || hour > 12 => return None,
            Some(false) => hour % 12,
            Some(true) => hour % 12 + 12,
        };
        Self::from_hm(hour, minute)
    }

    pub fn of<T: Timelike>(time: &T) -> Self {
        MinuteOfDay((time.hour() * 60 + time.minute()) as u16)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }

    pub fn abs_diff(self, other: MinuteOfDay) -> u16 {
        self.0.abs_diff(other.0)
    }

    /// Shift by `delta` minutes, wrapping around midnight.
    pub fn offset(self, delta: i32) -> Self {
        let wrapped = (self.0 as i32 + delta).rem_euclid(MINUTES_PER_DAY as i32);
        MinuteOfDay(wrapped as u16)
    }
}

impl fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Which calendar day, relative to harbour-local today, a value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelativeDay {
    Yesterday,
    Today,
    Tomorrow,
}

impl RelativeDay {
    pub fn date_from(self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            RelativeDay::Yesterday => today.pred_opt(),
            RelativeDay::Today => Some(today),
            RelativeDay::Tomorrow => today.succ_opt(),
        }
    }
}

impl fmt::Display for RelativeDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelativeDay::Yesterday => f.write_str("yesterday"),
            RelativeDay::Today => f.write_str("today"),
            RelativeDay::Tomorrow => f.write_str("tomorrow"),
        }
    }
}

/// Converts instants into the harbour's civil time.
#[derive(Clone, Copy, Debug)]
pub struct HarbourClock {
    tz: Tz,
}

impl HarbourClock {
    pub fn new(tz: Tz) -> Self {
        HarbourClock { tz }
    }

    /// Build from an IANA name such as `"Europe/Guernsey"`.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        name.parse::<Tz>()
            .map(HarbourClock::new)
            .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now(&self) -> DateTime<Tz> {
        self.local(Utc::now())
    }

    pub fn local(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        instant.with_timezone(&self.tz)
    }

    pub fn today(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date_naive()
    }

    pub fn minute_of_day(&self, instant: DateTime<Utc>) -> MinuteOfDay {
        MinuteOfDay::of(&self.local(instant))
    }
}
