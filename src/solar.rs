//! Sunrise/sunset from the NOAA solar equations (low precision).
//!
//! Accuracy: about a minute at mid latitudes, which is plenty for a night gate
//! that already carries a 30-minute margin either side.
//! References: NOAA Global Monitoring Laboratory "General Solar Position
//! Calculations" (Spencer 1971 Fourier series for declination and the
//! equation of time).

use crate::{Field, MinuteOfDay};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use core::f64::consts::PI;
use serde::{Deserialize, Serialize};

/// Sun's centre 50' below the horizon: refraction plus semi-diameter.
const ZENITH_DEG: f64 = 90.833;

/// Local sunrise and sunset for one day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SunTimes {
    pub sunrise: MinuteOfDay,
    pub sunset: MinuteOfDay,
}

/// Sunrise and sunset in the harbour's local time.
///
/// `Unknown` when the sun never crosses the horizon that day (polar day or night).
pub fn sun_times(date: NaiveDate, latitude: f64, longitude: f64, tz: Tz) -> Field<SunTimes> {
    let Some((rise_utc, set_utc)) = utc_minutes(date, latitude, longitude) else {
        return Field::Unknown;
    };

    let local = |minutes: f64| -> Option<MinuteOfDay> {
        let midnight = date.and_hms_opt(0, 0, 0)?.and_utc();
        let instant: DateTime<Utc> = midnight + Duration::seconds((minutes * 60.0).round() as i64);
        Some(MinuteOfDay::of(&instant.with_timezone(&tz)))
    };

    match (local(rise_utc), local(set_utc)) {
        (Some(sunrise), Some(sunset)) => Field::Known(SunTimes { sunrise, sunset }),
        _ => Field::Unknown,
    }
}

/// Sunrise and sunset as minutes after 00:00 UTC on `date` (may fall outside 0..1440).
fn utc_minutes(date: NaiveDate, latitude: f64, longitude: f64) -> Option<(f64, f64)> {
    // ---------- 1. Fractional year (radians), evaluated at local noon ----------
    let gamma = 2.0 * PI / 365.0 * (date.ordinal0() as f64);

    // ---------- 2. Equation of time (minutes) and declination (radians) -------
    let eq_time = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());

    let decl = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    // ---------- 3. Hour angle at the horizon crossing -------------------------
    let lat = latitude.to_radians();
    let cos_ha = ZENITH_DEG.to_radians().cos() / (lat.cos() * decl.cos()) - lat.tan() * decl.tan();
    if !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }
    let ha_deg = cos_ha.acos().to_degrees();

    // Longitude is east-positive; 4 minutes of time per degree
    let sunrise = 720.0 - 4.0 * (longitude + ha_deg) - eq_time;
    let sunset = 720.0 - 4.0 * (longitude - ha_deg) - eq_time;
    Some((sunrise, sunset))
}
