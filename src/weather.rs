//! # Weather Summary Feed
//!
//! Reads the first item of a forecast RSS feed and extracts what the scorer
//! needs: the headline condition (for precipitation), visibility, and the day's
//! sunrise/sunset. The feed follows the common broadcaster layout:
//!
//! ```text
//! <item>
//!   <title>Today: Light Rain, Minimum Temperature: 12°C (54°F) ...</title>
//!   <description>Maximum Temperature: 17°C (63°F), Wind Direction: South Westerly,
//!     Visibility: Poor, ..., Sunrise: 05:25 BST, Sunset: 21:12 BST</description>
//! </item>
//! ```
//!
//! Fields the feed does not carry stay `Unknown`.

use crate::fetch::{ContentFetcher, FetchError};
use crate::tide_table::selector;
use crate::{Field, MinuteOfDay};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("weather fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("weather feed has no items")]
    NoItems,
}

/// Visibility bands as reported by the forecast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Excellent,
    VeryGood,
    Good,
    Moderate,
    Poor,
    VeryPoor,
}

impl Visibility {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "excellent" => Some(Visibility::Excellent),
            "very good" => Some(Visibility::VeryGood),
            "good" => Some(Visibility::Good),
            "moderate" => Some(Visibility::Moderate),
            "poor" => Some(Visibility::Poor),
            "very poor" | "fog" => Some(Visibility::VeryPoor),
            _ => None,
        }
    }

    pub fn is_poor(self) -> bool {
        matches!(self, Visibility::Poor | Visibility::VeryPoor)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Visibility::Excellent => "Excellent",
            Visibility::VeryGood => "Very Good",
            Visibility::Good => "Good",
            Visibility::Moderate => "Moderate",
            Visibility::Poor => "Poor",
            Visibility::VeryPoor => "Very Poor",
        };
        f.write_str(label)
    }
}

const PRECIPITATION_WORDS: [&str; 7] = [
    "rain", "drizzle", "shower", "sleet", "snow", "hail", "thunder",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub condition: Field<String>,
    pub precipitation: bool,
    pub visibility: Field<Visibility>,
    pub temperature_c: Field<f64>,
    pub sunrise: Field<MinuteOfDay>,
    pub sunset: Field<MinuteOfDay>,
}

/// Parse the first `<item>` of a forecast feed.
pub fn parse_weather_rss(text: &str) -> Result<WeatherReading, WeatherError> {
    let cleaned = text.replace("<![CDATA[", "").replace("]]>", "");
    let doc = Html::parse_document(&cleaned);

    let item = doc
        .select(&selector("item"))
        .next()
        .ok_or(WeatherError::NoItems)?;

    let title: String = item
        .select(&selector("title"))
        .next()
        .map(|t| t.text().collect())
        .unwrap_or_default();
    let description: String = item
        .select(&selector("description"))
        .next()
        .map(|d| d.text().collect())
        .unwrap_or_default();

    let condition = headline_condition(&title);
    let precipitation = condition
        .known()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            PRECIPITATION_WORDS.iter().any(|w| c.contains(w))
        })
        .unwrap_or(false);

    let mut reading = WeatherReading {
        condition,
        precipitation,
        visibility: Field::Unknown,
        temperature_c: Field::Unknown,
        sunrise: Field::Unknown,
        sunset: Field::Unknown,
    };

    for (key, value) in description
        .split(',')
        .filter_map(|part| part.split_once(':'))
        .map(|(k, v)| (k.trim(), v.trim()))
    {
        match key {
            "Visibility" => reading.visibility = Visibility::from_label(value).into(),
            "Temperature" | "Maximum Temperature" => reading.temperature_c = celsius(value).into(),
            "Sunrise" => reading.sunrise = clock_value(value).into(),
            "Sunset" => reading.sunset = clock_value(value).into(),
            _ => {}
        }
    }

    Ok(reading)
}

/// Fetch and parse the forecast feed through `fetcher`.
pub async fn fetch_weather(
    fetcher: &dyn ContentFetcher,
    url: &str,
) -> Result<WeatherReading, WeatherError> {
    let body = fetcher.fetch_text(url).await?;
    parse_weather_rss(&body)
}

/// `"Today: Light Rain, Minimum ..."` → `"Light Rain"`
fn headline_condition(title: &str) -> Field<String> {
    let after_day = title.split_once(':').map(|(_, rest)| rest).unwrap_or(title);
    let condition = after_day.split(',').next().unwrap_or("").trim();
    if condition.is_empty() {
        Field::Unknown
    } else {
        Field::Known(condition.to_string())
    }
}

/// `"17°C (63°F)"` → 17.0
fn celsius(value: &str) -> Option<f64> {
    value.split("°C").next()?.trim().parse().ok()
}

/// Sunrise/sunset values put a zone suffix after the clock time: `"05:25 BST"`.
fn clock_value(value: &str) -> Option<MinuteOfDay> {
    let (time, rest) = value.split_once(' ').unwrap_or((value, ""));
    let rest = rest.trim().to_ascii_lowercase();
    if rest == "am" || rest == "pm" {
        MinuteOfDay::parse(value)
    } else {
        MinuteOfDay::parse(time)
    }
}
