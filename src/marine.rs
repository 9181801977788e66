//! Wind and sea-state readings.
//!
//! Both come from JSON "current conditions" endpoints:
//! `{"current": {"wind_speed_10m": 12.3, "wind_direction_10m": 250}}` with speed
//! requested in knots, and `{"current": {"wave_height": 0.8}}` in metres.

use crate::fetch::{ContentFetcher, FetchError};
use crate::Field;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarineError {
    #[error("marine fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("marine response: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct Current<T> {
    current: T,
}

#[derive(Deserialize)]
struct WindNow {
    wind_speed_10m: Option<f64>,
    wind_direction_10m: Option<f64>,
}

#[derive(Deserialize)]
struct WaveNow {
    wave_height: Option<f64>,
}

/// Current wind and sea state. Direction is a compass point such as `"WSW"`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarineReading {
    pub wind_speed_kt: Field<f64>,
    pub wind_direction: Field<String>,
    pub wave_height_m: Field<f64>,
}

impl MarineReading {
    pub fn unknown() -> Self {
        Self::default()
    }
}

const COMPASS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Nearest of the 16 compass points to a bearing in degrees.
pub fn compass_point(degrees: f64) -> &'static str {
    let sector = (degrees.rem_euclid(360.0) / 22.5).round() as usize % 16;
    COMPASS[sector]
}

pub fn parse_wind(json: &str) -> Result<(Field<f64>, Field<String>), MarineError> {
    let body: Current<WindNow> = serde_json::from_str(json)?;
    let speed = body.current.wind_speed_10m.filter(|s| s.is_finite() && *s >= 0.0);
    let direction = body
        .current
        .wind_direction_10m
        .filter(|d| d.is_finite())
        .map(|d| compass_point(d).to_string());
    Ok((speed.into(), direction.into()))
}

pub fn parse_wave(json: &str) -> Result<Field<f64>, MarineError> {
    let body: Current<WaveNow> = serde_json::from_str(json)?;
    Ok(body
        .current
        .wave_height
        .filter(|h| h.is_finite() && *h >= 0.0)
        .into())
}

/// Fetch wind and waves concurrently; either failing fails the reading.
pub async fn fetch_marine(
    fetcher: &dyn ContentFetcher,
    wind_url: &str,
    wave_url: &str,
) -> Result<MarineReading, MarineError> {
    let (wind, wave) = tokio::join!(
        fetcher.fetch_text(wind_url),
        fetcher.fetch_text(wave_url),
    );
    let (wind_speed_kt, wind_direction) = parse_wind(&wind?)?;
    let wave_height_m = parse_wave(&wave?)?;

    Ok(MarineReading {
        wind_speed_kt,
        wind_direction,
        wave_height_m,
    })
}
