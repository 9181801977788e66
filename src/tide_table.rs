//! # Tide Table Parsing
//!
//! Turns one day's tide page into a [`DayTideData`]. The page carries several
//! tables whose order changes from date to date, so every table is classified by
//! its content rather than its position:
//!
//! | Table | Recognised by |
//! |---|---|
//! | Marina schedule | header row of exactly 6 cells, first containing "Marina" |
//! | Peak extrema | first data row's first cell mentions "Low" or "High" |
//! | Hourly heights | header row of exactly 2 cells, "Time" then "Height" |
//!
//! Anything else on the page is ignored.
//!
//! ## Row Handling
//! Bad rows are skipped, not fatal: a peak row with an unreadable height or an
//! hourly row with a non-numeric height simply drops out. The one hard failure
//! is a page with no usable hourly heights at all, reported as
//! [`TideError::NoReadings`].
//!
//! ```html
//! <table>
//!   <tr><th>Time</th><th>Height</th></tr>
//!   <tr><td>00:00</td><td>5.21m</td></tr>
//!   ...
//! </table>
//! ```

use crate::config::BoatDraft;
use crate::fetch::{ContentFetcher, FetchError};
use crate::{
    DayTideData, ExtremeKind, Field, MarinaTimes, MinuteOfDay, TideExtreme, TideReading,
};
use chrono::{Datelike, NaiveDate};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while obtaining one day of tide data.
#[derive(Error, Debug)]
pub enum TideError {
    /// Page fetch failed
    #[error("tide fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// No hourly table produced a single valid row
    #[error("no hourly tide readings found")]
    NoReadings,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TableKind {
    MarinaSchedule,
    Peaks,
    Hourly,
}

/// Build a selector from a CSS literal.
pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("CSS selector should be valid")
}

/// Build the tide page URL for `date`, asking for gate times at `draft` depth.
pub fn tide_url(base: &str, date: NaiveDate, draft: BoatDraft) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    let req_depth = (draft.metres() * 100.0).round() as i64;
    format!(
        "{base}{sep}year={}&yearDay={}&reqDepth={req_depth}",
        date.year(),
        date.ordinal()
    )
}

/// Fetch and parse the tide page for `date`.
///
/// # Example
/// ```no_run
/// # async fn demo(channel: &sail_check_lib::fetch::ProxyChannel) {
/// use chrono::NaiveDate;
/// use sail_check_lib::config::BoatDraft;
/// use sail_check_lib::tide_table::fetch_day;
///
/// let date = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
/// let draft = BoatDraft::try_from(1.5).unwrap();
/// match fetch_day(channel, "https://tides.digimap.gg/", date, draft).await {
///     Ok(day) => println!("{} hourly readings", day.readings.len()),
///     Err(err) => eprintln!("tide data unavailable: {err}"),
/// }
/// # }
/// ```
pub async fn fetch_day(
    fetcher: &dyn ContentFetcher,
    base: &str,
    date: NaiveDate,
    draft: BoatDraft,
) -> Result<DayTideData, TideError> {
    let url = tide_url(base, date, draft);
    debug!(%url, "fetching tide table");
    let body = fetcher.fetch_text(&url).await?;
    parse_day(&body, date)
}

/// Parse one day's tide page.
///
/// Hourly readings from every qualifying table are merged, sorted by time and
/// deduplicated (first occurrence wins). Each peak table is sorted by time and
/// must alternate High/Low on its own; the first table that does supplies the
/// extremes and any other peak table is ignored.
pub fn parse_day(markup: &str, date: NaiveDate) -> Result<DayTideData, TideError> {
    let doc = Html::parse_document(markup);
    let table_sel = selector("table");

    let mut readings = Vec::new();
    let mut extremes = Vec::new();
    let mut schedule_table: Vec<MarinaTimes> = Vec::new();

    for table in doc.select(&table_sel) {
        let rows = table_rows(table);
        match classify(&rows) {
            Some(TableKind::Hourly) => readings.extend(parse_hourly(&rows)),
            Some(TableKind::Peaks) => {
                let peaks = parse_peaks(&rows);
                if peaks.windows(2).any(|w| w[0].kind == w[1].kind) {
                    warn!(%date, "tide extremes do not alternate, discarding peak table");
                } else if extremes.is_empty() {
                    extremes = peaks;
                } else {
                    debug!(%date, "ignoring additional peak table");
                }
            }
            Some(TableKind::MarinaSchedule) => schedule_table.extend(parse_marinas(&rows)),
            None => debug!(rows = rows.len(), "ignoring unrecognised table"),
        }
    }

    if readings.is_empty() {
        return Err(TideError::NoReadings);
    }
    readings.sort_by_key(|r: &TideReading| r.time);
    readings.dedup_by_key(|r| r.time);

    let mut schedules = BTreeMap::new();
    for row in &schedule_table {
        schedules
            .entry(row.marina.clone())
            .or_insert_with(|| row.to_schedule());
    }

    debug!(
        %date,
        readings = readings.len(),
        extremes = extremes.len(),
        marinas = schedules.len(),
        "parsed tide table"
    );

    Ok(DayTideData {
        date,
        readings,
        extremes,
        schedules,
        schedule_table,
    })
}

/// Height of the reading nearest to `now`.
///
/// The scan runs in ascending time order and only a strictly closer reading
/// replaces the current best, so ties go to the earlier reading.
pub fn current_height(readings: &[TideReading], now: MinuteOfDay) -> Field<f64> {
    let mut best: Option<&TideReading> = None;
    for reading in readings {
        let closer = match best {
            None => true,
            Some(b) => reading.time.abs_diff(now) < b.time.abs_diff(now),
        };
        if closer {
            best = Some(reading);
        }
    }
    best.map(|r| r.height_m).into()
}

/// Cell texts of the rows that belong directly to `table` (not nested tables).
fn table_rows(table: ElementRef<'_>) -> Vec<Vec<String>> {
    let row_sel = selector("tr");
    table
        .select(&row_sel)
        .filter(|row| belongs_to(*row, table))
        .map(|row| {
            row.children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                .map(cell_text)
                .collect()
        })
        .collect()
}

fn belongs_to(row: ElementRef<'_>, table: ElementRef<'_>) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table")
        .is_some_and(|owner| owner.id() == table.id())
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn classify(rows: &[Vec<String>]) -> Option<TableKind> {
    let header = rows.first()?;

    if header.len() == 6 && header[0].contains("Marina") {
        return Some(TableKind::MarinaSchedule);
    }
    if header.len() == 2 && header[0].contains("Time") && header[1].contains("Height") {
        return Some(TableKind::Hourly);
    }
    let first_data_cell = rows.get(1).and_then(|row| row.first());
    if first_data_cell.is_some_and(|cell| ExtremeKind::from_label(cell).is_some()) {
        return Some(TableKind::Peaks);
    }
    None
}

/// Parse a height cell such as `"8.52"`, `"8.52m"` or `"8.52 m"`.
fn parse_height(text: &str) -> Option<f64> {
    let value: f64 = text.trim().trim_end_matches('m').trim().parse().ok()?;
    value.is_finite().then_some(value)
}

fn parse_hourly(rows: &[Vec<String>]) -> Vec<TideReading> {
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let time = MinuteOfDay::parse(row.first()?)?;
            let height_m = parse_height(row.get(1)?)?;
            Some(TideReading { time, height_m })
        })
        .collect()
}

fn parse_peaks(rows: &[Vec<String>]) -> Vec<TideExtreme> {
    let mut peaks: Vec<TideExtreme> = rows
        .iter()
        .skip(1)
        .filter_map(|row| {
            let parsed = peak_row(row);
            if parsed.is_none() {
                debug!(?row, "skipping unreadable peak row");
            }
            parsed
        })
        .collect();
    peaks.sort_by_key(|e| e.time);
    peaks
}

fn peak_row(row: &[String]) -> Option<TideExtreme> {
    let kind = ExtremeKind::from_label(row.first()?)?;
    let time = MinuteOfDay::parse(row.get(1)?)?;
    let height_m = parse_height(row.get(2)?)?;
    Some(TideExtreme {
        kind,
        time,
        height_m,
    })
}

fn parse_marinas(rows: &[Vec<String>]) -> Vec<MarinaTimes> {
    rows.iter()
        .skip(1)
        .filter_map(|row| {
            let marina = row.first()?.trim();
            if marina.is_empty() {
                return None;
            }
            let slot = |i: usize| -> Field<MinuteOfDay> {
                row.get(i).and_then(|text| MinuteOfDay::parse(text)).into()
            };
            Some(MarinaTimes {
                marina: marina.to_string(),
                open1: slot(1),
                close1: slot(2),
                open2: slot(3),
                close2: slot(4),
                open3: slot(5),
            })
        })
        .collect()
}
