//! # Last/Next Event Resolution
//!
//! Given up to three consecutive days of parsed tide data, find the most recent
//! event at or before "now" and the nearest event strictly after it. Two streams
//! are resolved independently with the same algorithm:
//!
//! - **Tide extremes**: high and low waters
//! - **Marina events**: the selected marina's gate open/close transitions
//!
//! ## Day Boundaries
//! Tides cycle roughly twice a day, so today's table usually brackets "now" on
//! its own. Early in the morning there may be no earlier event today, and late
//! at night no later one. [`needs_more_data`] reports which adjacent days are
//! required before resolution:
//!
//! - no past event today → yesterday's final event becomes "last"
//! - no future event today → tomorrow's first event becomes "next"
//!
//! If the adjacent day could not be fetched the field stays
//! [`Field::Unknown`]; nothing is guessed.

use crate::config::BoatDraft;
use crate::tide_table::current_height;
use crate::{
    DayTideData, ExtremeKind, Field, MarinaEvent, MarinaEventKind, MinuteOfDay, RelativeDay,
    TideExtreme,
};
use serde::{Deserialize, Serialize};

/// Fixed margin under the keel required to cross the marina sill, in metres.
pub const SILL_SAFETY_MARGIN_M: f64 = 0.5;

/// Anything placed on the day's minute axis.
pub trait TimedEvent {
    fn time(&self) -> MinuteOfDay;
}

impl TimedEvent for TideExtreme {
    fn time(&self) -> MinuteOfDay {
        self.time
    }
}

impl TimedEvent for MarinaEvent {
    fn time(&self) -> MinuteOfDay {
        self.time
    }
}

/// An event together with the day it was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Anchored<E> {
    pub day: RelativeDay,
    pub event: E,
}

impl<E> Anchored<E> {
    fn on(day: RelativeDay, event: E) -> Self {
        Anchored { day, event }
    }
}

/// The bracketing pair of events around "now".
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds<E> {
    pub last: Field<Anchored<E>>,
    pub next: Field<Anchored<E>>,
}

impl<E> Bounds<E> {
    pub fn unknown() -> Self {
        Bounds {
            last: Field::Unknown,
            next: Field::Unknown,
        }
    }
}

/// Scan today's sorted stream.
///
/// Every event at or before `now` overwrites `last`; the first event after
/// `now` becomes `next` and ends the scan.
pub fn scan_today<E: TimedEvent + Clone>(events: &[E], now: MinuteOfDay) -> Bounds<E> {
    let mut last = Field::Unknown;
    let mut next = Field::Unknown;

    for event in events {
        if event.time() <= now {
            last = Field::Known(Anchored::on(RelativeDay::Today, event.clone()));
        } else {
            next = Field::Known(Anchored::on(RelativeDay::Today, event.clone()));
            break;
        }
    }

    Bounds { last, next }
}

/// Resolve one stream, falling back to the adjacent days where today runs out.
///
/// `yesterday`/`tomorrow` are `None` when that day was not needed or could not
/// be fetched.
pub fn resolve_stream<E: TimedEvent + Clone>(
    today: &[E],
    yesterday: Option<&[E]>,
    tomorrow: Option<&[E]>,
    now: MinuteOfDay,
) -> Bounds<E> {
    let mut bounds = scan_today(today, now);

    if !bounds.last.is_known() {
        bounds.last = yesterday
            .and_then(|events| events.iter().max_by_key(|e| e.time()))
            .map(|e| Anchored::on(RelativeDay::Yesterday, e.clone()))
            .into();
    }
    if !bounds.next.is_known() {
        bounds.next = tomorrow
            .and_then(|events| events.iter().min_by_key(|e| e.time()))
            .map(|e| Anchored::on(RelativeDay::Tomorrow, e.clone()))
            .into();
    }

    bounds
}

/// Which adjacent days must be fetched before resolving.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DataNeeds {
    pub yesterday: bool,
    pub tomorrow: bool,
}

impl DataNeeds {
    pub fn any(self) -> bool {
        self.yesterday || self.tomorrow
    }
}

fn stream_needs<E: TimedEvent>(events: &[E], now: MinuteOfDay) -> DataNeeds {
    DataNeeds {
        yesterday: !events.iter().any(|e| e.time() <= now),
        tomorrow: !events.iter().any(|e| e.time() > now),
    }
}

/// Check both streams of today's data for a past and a future event.
///
/// A stream only counts when today actually has events for it. Every tidal day
/// has at least one high or low water, so an empty extreme list means today's
/// peak table was missing or rejected; neighbouring days cannot stand in for
/// it. Likewise a marina missing from today's table, or listed with no times,
/// never triggers a fetch.
pub fn needs_more_data(today: &DayTideData, marina: &str, now: MinuteOfDay) -> DataNeeds {
    let tide = if today.extremes.is_empty() {
        DataNeeds::default()
    } else {
        stream_needs(&today.extremes, now)
    };
    let gate = match today.marina_events(marina) {
        [] => DataNeeds::default(),
        events => stream_needs(events, now),
    };

    DataNeeds {
        yesterday: tide.yesterday || gate.yesterday,
        tomorrow: tide.tomorrow || gate.tomorrow,
    }
}

/// Whether the marina gate is currently open.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarinaStatus {
    Open,
    Closed,
    Unknown,
}

/// Whether the water is coming in or going out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TideDirection {
    Rising,
    Falling,
    Unknown,
}

/// Tide and marina state around "now", recomputed every cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTideState {
    pub current_height: Field<f64>,
    pub last_extreme: Field<Anchored<TideExtreme>>,
    pub next_extreme: Field<Anchored<TideExtreme>>,
    pub last_marina_event: Field<Anchored<MarinaEvent>>,
    pub next_marina_event: Field<Anchored<MarinaEvent>>,
    pub sill_clearance: bool,
}

impl ResolvedTideState {
    /// Nothing known. Sill clearance defaults to false.
    pub fn unknown() -> Self {
        ResolvedTideState {
            current_height: Field::Unknown,
            last_extreme: Field::Unknown,
            next_extreme: Field::Unknown,
            last_marina_event: Field::Unknown,
            next_marina_event: Field::Unknown,
            sill_clearance: false,
        }
    }

    pub fn marina_status(&self) -> MarinaStatus {
        match self.last_marina_event.known() {
            Some(a) if a.event.kind == MarinaEventKind::Opened => MarinaStatus::Open,
            Some(_) => MarinaStatus::Closed,
            None => MarinaStatus::Unknown,
        }
    }

    /// Highs and lows alternate, so the last extreme tells which way the tide runs.
    pub fn tide_direction(&self) -> TideDirection {
        match self.last_extreme.known().map(|a| a.event.kind) {
            Some(ExtremeKind::Low) => TideDirection::Rising,
            Some(ExtremeKind::High) => TideDirection::Falling,
            None => TideDirection::Unknown,
        }
    }
}

/// True only when a known height exceeds draft plus the safety margin.
pub fn sill_clearance(current_height: Field<f64>, draft: BoatDraft) -> bool {
    match current_height {
        Field::Known(h) => h > draft.metres() + SILL_SAFETY_MARGIN_M,
        Field::Unknown => false,
    }
}

/// Resolve both streams for `marina` at `now`.
pub fn resolve(
    today: &DayTideData,
    yesterday: Option<&DayTideData>,
    tomorrow: Option<&DayTideData>,
    marina: &str,
    now: MinuteOfDay,
    draft: BoatDraft,
) -> ResolvedTideState {
    // Without today's own events there is nothing to anchor a backfill to
    let tides = if today.extremes.is_empty() {
        Bounds::unknown()
    } else {
        resolve_stream(
            &today.extremes,
            yesterday.map(|d| d.extremes.as_slice()),
            tomorrow.map(|d| d.extremes.as_slice()),
            now,
        )
    };

    let gates = match today.marina_events(marina) {
        [] => Bounds::unknown(),
        events => resolve_stream(
            events,
            yesterday.map(|d| d.marina_events(marina)),
            tomorrow.map(|d| d.marina_events(marina)),
            now,
        ),
    };

    let current_height = current_height(&today.readings, now);

    ResolvedTideState {
        current_height,
        last_extreme: tides.last,
        next_extreme: tides.next,
        last_marina_event: gates.last,
        next_marina_event: gates.next,
        sill_clearance: sill_clearance(current_height, draft),
    }
}
