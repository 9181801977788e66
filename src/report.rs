//! # Terminal Report
//!
//! Plain-text rendering of an [`AppState`] for development and cron use. Every
//! unknown value prints as `--` through [`Field`]'s `Display`, so a degraded
//! domain is visible at a glance instead of showing a stale or made-up number.

use crate::orchestrator::{AppState, DomainStatus, SourceStatus};
use crate::resolver::{Anchored, MarinaStatus, TideDirection};
use crate::scorer::Rating;
use crate::{Field, MarinaEvent, MarinaEventKind, RelativeDay, TideExtreme};
use std::fmt::Write;

const RULE: &str = "────────────────────────────────────────";

/// Render the snapshot as a multi-line summary.
pub fn render_text(state: &AppState) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_report(&mut out, state);
    out
}

fn write_report(out: &mut String, state: &AppState) -> std::fmt::Result {
    writeln!(out, "⛵ {} · {}", state.harbour, state.settings.marina)?;
    match &state.last_updated {
        Some(at) => writeln!(out, "Updated {}", at.format("%a %-d %b %H:%M"))?,
        None => writeln!(out, "Not updated yet")?,
    }
    match &state.source {
        SourceStatus::Unavailable => writeln!(out, "⚠️  No live data source available")?,
        SourceStatus::Unprobed => {}
        SourceStatus::Connected(proxy) => writeln!(out, "via {}", proxy.base)?,
    }
    writeln!(out, "{RULE}")?;

    match &state.assessment {
        Field::Known(a) => {
            match (a.rating, a.score) {
                (Rating::Night, _) => writeln!(out, "🌙 Night: sailing not assessed")?,
                (rating, Some(score)) => writeln!(out, "Conditions: {rating} ({score})")?,
                (rating, None) => writeln!(out, "Conditions: {rating}")?,
            }
            if a.marina_closed {
                writeln!(out, "🚫 MARINA CLOSED")?;
            }
            for factor in &a.factors {
                writeln!(out, "  - {factor}")?;
            }
            for warning in &a.limit_warnings {
                writeln!(out, "  ! {warning}")?;
            }
        }
        Field::Unknown => writeln!(out, "Conditions: --")?,
    }
    writeln!(out, "{RULE}")?;

    let tide = &state.tide;
    let direction = match tide.tide_direction() {
        TideDirection::Rising => " rising",
        TideDirection::Falling => " falling",
        TideDirection::Unknown => "",
    };
    writeln!(
        out,
        "Tide       {} m{direction}{}",
        fmt_height(tide.current_height),
        status_note(&state.tide_status)
    )?;
    writeln!(out, "  last     {}", fmt_extreme(&tide.last_extreme))?;
    writeln!(out, "  next     {}", fmt_extreme(&tide.next_extreme))?;
    writeln!(
        out,
        "Sill       {} (draft {})",
        if tide.sill_clearance { "clear" } else { "NOT clear" },
        state.settings.boat_draft
    )?;

    let marina = match tide.marina_status() {
        MarinaStatus::Open => "open",
        MarinaStatus::Closed => "closed",
        MarinaStatus::Unknown => "--",
    };
    writeln!(out, "Marina     {marina}")?;
    writeln!(out, "  last     {}", fmt_gate(&tide.last_marina_event))?;
    writeln!(out, "  next     {}", fmt_gate(&tide.next_marina_event))?;

    let marine = &state.marine;
    writeln!(
        out,
        "Wind       {} kt {}{}",
        marine.wind_speed_kt.map(|s| format!("{s:.0}")),
        marine.wind_direction,
        status_note(&state.marine_status)
    )?;
    writeln!(out, "Waves      {} m", fmt_height(marine.wave_height_m))?;

    match &state.weather {
        Field::Known(w) => {
            writeln!(out, "Weather    {}{}", w.condition, status_note(&state.weather_status))?;
            writeln!(out, "Visibility {}", w.visibility)?;
        }
        Field::Unknown => writeln!(out, "Weather    --{}", status_note(&state.weather_status))?,
    }
    match &state.sun {
        Field::Known(sun) => writeln!(out, "Sun        ↑ {}  ↓ {}", sun.sunrise, sun.sunset)?,
        Field::Unknown => writeln!(out, "Sun        --")?,
    }

    if !state.marina_schedule_table.is_empty() {
        writeln!(out, "{RULE}")?;
        writeln!(out, "{:<22} open   close  open   close  open", "Marina")?;
        for row in &state.marina_schedule_table {
            writeln!(
                out,
                "{:<22} {:<6} {:<6} {:<6} {:<6} {}",
                row.marina,
                row.open1.to_string(),
                row.close1.to_string(),
                row.open2.to_string(),
                row.close2.to_string(),
                row.open3
            )?;
        }
    }

    Ok(())
}

fn fmt_height(height: Field<f64>) -> Field<String> {
    height.map(|h| format!("{h:.2}"))
}

fn day_suffix(day: RelativeDay) -> String {
    match day {
        RelativeDay::Today => String::new(),
        other => format!(" ({other})"),
    }
}

fn fmt_extreme(extreme: &Field<Anchored<TideExtreme>>) -> String {
    match extreme.known() {
        Some(a) => format!(
            "{} {} {:.2} m{}",
            a.event.kind,
            a.event.time,
            a.event.height_m,
            day_suffix(a.day)
        ),
        None => "--".to_string(),
    }
}

fn fmt_gate(event: &Field<Anchored<MarinaEvent>>) -> String {
    match event.known() {
        Some(a) => {
            let kind = match a.event.kind {
                MarinaEventKind::Opened => "opens",
                MarinaEventKind::Closed => "closes",
            };
            format!("{kind} {}{}", a.event.time, day_suffix(a.day))
        }
        None => "--".to_string(),
    }
}

fn status_note(status: &DomainStatus) -> &'static str {
    match status {
        DomainStatus::Failed(_) => " (unavailable)",
        DomainStatus::NotAttempted | DomainStatus::Fresh => "",
    }
}
