//! # Sail Check Core Library
//!
//! This library aggregates marine conditions for small-boat operators in a tidal
//! harbour and turns them into a single go/no-go sailing assessment. It owns the
//! shared data model; each pipeline stage lives in its own module.
//!
//! ## Data Flow
//! 1. **Fetch**: acquire a working proxy channel, download the tide table for today
//!    ([`fetch`], [`orchestrator`])
//! 2. **Parse**: classify tables by content and extract hourly heights, tide
//!    extremes and marina gate times ([`tide_table`])
//! 3. **Resolve**: find the last/next tide extreme and marina event around "now",
//!    backfilling from yesterday/tomorrow when today's table runs out ([`resolver`])
//! 4. **Score**: combine tide, wind, wave and weather into a rating ([`scorer`])
//!
//! ## Missing Data
//! Any value that could not be fetched or parsed is carried as [`Field::Unknown`]
//! rather than a placeholder string or a guessed number. Display code renders it
//! as `--`; scoring code has to match on it explicitly.
//!
//! ## Core Types
//! - [`TideReading`]: one hourly height sample
//! - [`TideExtreme`]: a labelled high or low water
//! - [`MarinaSchedule`]: ordered open/close transitions for one marina
//! - [`DayTideData`]: everything parsed from one day's tide page

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod clock;
pub mod config;
pub mod fetch;
pub mod marine;
pub mod orchestrator;
pub mod report;
pub mod resolver;
pub mod scorer;
pub mod solar;
pub mod tide_table;
pub mod weather;

pub use clock::{MinuteOfDay, RelativeDay};

/// A value that is either known or explicitly unknown.
///
/// # Example
/// ```
/// use sail_check_lib::Field;
///
/// let height: Field<f64> = Field::Known(4.2);
/// assert_eq!(height.known(), Some(&4.2));
/// assert_eq!(Field::<f64>::Unknown.to_string(), "--");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Field<T> {
    Known(T),
    Unknown,
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Unknown
    }
}

impl<T> Field<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Field::Known(value) => Some(value),
            Field::Unknown => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Known(value) => Some(value),
            Field::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Field::Known(_))
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Known(value) => Field::Known(value),
            Field::Unknown => Field::Unknown,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Field<U> {
        match self {
            Field::Known(value) => Field::Known(f(value)),
            Field::Unknown => Field::Unknown,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Known(v),
            None => Field::Unknown,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Known(value) => value.fmt(f),
            Field::Unknown => f.write_str("--"),
        }
    }
}

/// One hourly height sample from the tide table.
///
/// Heights are metres above chart datum.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TideReading {
    pub time: MinuteOfDay,
    pub height_m: f64,
}

/// High or low water.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtremeKind {
    High,
    Low,
}

impl ExtremeKind {
    /// Case-insensitive match on a table label such as `"HIGH"` or `"Low Water"`.
    ///
    /// Only whole words count, so `"flow"` or `"Below datum"` are not labels.
    pub fn from_label(label: &str) -> Option<Self> {
        label
            .split(|c: char| !c.is_ascii_alphabetic())
            .find_map(|word| {
                if word.eq_ignore_ascii_case("high") {
                    Some(ExtremeKind::High)
                } else if word.eq_ignore_ascii_case("low") {
                    Some(ExtremeKind::Low)
                } else {
                    None
                }
            })
    }

    pub fn opposite(self) -> Self {
        match self {
            ExtremeKind::High => ExtremeKind::Low,
            ExtremeKind::Low => ExtremeKind::High,
        }
    }
}

impl fmt::Display for ExtremeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtremeKind::High => f.write_str("High"),
            ExtremeKind::Low => f.write_str("Low"),
        }
    }
}

/// A labelled tide extreme (local maximum or minimum of the day's curve).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TideExtreme {
    pub kind: ExtremeKind,
    pub time: MinuteOfDay,
    pub height_m: f64,
}

/// Direction of a marina gate transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarinaEventKind {
    Opened,
    Closed,
}

/// One open or close transition of a marina sill gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarinaEvent {
    pub kind: MarinaEventKind,
    pub time: MinuteOfDay,
}

/// Ordered gate transitions for a single marina on a single day.
///
/// A marina typically opens and closes two or three times a day as the tide
/// covers and uncovers its sill. `events` is always sorted ascending by time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarinaSchedule {
    pub marina_name: String,
    pub events: Vec<MarinaEvent>,
}

/// Raw marina table row, kept for reference display.
///
/// Slots mirror the published table columns. A blank cell is `Unknown`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarinaTimes {
    pub marina: String,
    pub open1: Field<MinuteOfDay>,
    pub close1: Field<MinuteOfDay>,
    pub open2: Field<MinuteOfDay>,
    pub close2: Field<MinuteOfDay>,
    pub open3: Field<MinuteOfDay>,
}

impl MarinaTimes {
    /// Known slots as events, sorted ascending by time.
    pub fn to_schedule(&self) -> MarinaSchedule {
        let slots = [
            (MarinaEventKind::Opened, self.open1),
            (MarinaEventKind::Closed, self.close1),
            (MarinaEventKind::Opened, self.open2),
            (MarinaEventKind::Closed, self.close2),
            (MarinaEventKind::Opened, self.open3),
        ];

        let mut events: Vec<MarinaEvent> = slots
            .iter()
            .filter_map(|(kind, slot)| {
                slot.known().map(|time| MarinaEvent {
                    kind: *kind,
                    time: *time,
                })
            })
            .collect();
        events.sort_by_key(|e| e.time);

        MarinaSchedule {
            marina_name: self.marina.clone(),
            events,
        }
    }
}

/// Everything parsed from one calendar day's tide page.
///
/// Produced fresh by [`tide_table::parse_day`] and never mutated afterwards.
/// The resolver may hold yesterday, today and tomorrow at once.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DayTideData {
    pub date: NaiveDate,
    /// Hourly heights, sorted ascending by time, one per minute-of-day
    pub readings: Vec<TideReading>,
    /// High/low waters, sorted ascending by time
    pub extremes: Vec<TideExtreme>,
    /// Gate schedules keyed by marina name
    pub schedules: BTreeMap<String, MarinaSchedule>,
    /// Marina table rows in published order
    pub schedule_table: Vec<MarinaTimes>,
}

impl DayTideData {
    /// Schedule for `marina`; surrounding whitespace in the name is ignored.
    pub fn schedule(&self, marina: &str) -> Option<&MarinaSchedule> {
        self.schedules.get(marina.trim())
    }

    /// Gate events for `marina`, or an empty slice if the marina is not listed.
    pub fn marina_events(&self, marina: &str) -> &[MarinaEvent] {
        self.schedule(marina)
            .map(|s| s.events.as_slice())
            .unwrap_or(&[])
    }
}
