//! # Go/No-Go Scoring
//!
//! A pure function from the current readings to a bounded-ish score, a rating
//! and the list of factors that pulled the score down. No I/O, no hidden state:
//! the same inputs always give the same assessment.
//!
//! ## Night Gate
//! From 30 minutes after sunset until 30 minutes before sunrise the assessment
//! short-circuits to [`Rating::Night`] with no score. Night sailing is outside
//! the model, not merely a low score.
//!
//! ## Penalties
//! The score starts at 100 and each matching condition subtracts a fixed amount:
//!
//! | Condition | Penalty | Factor |
//! |---|---|---|
//! | wind > 20 kt | −40 | Strong winds |
//! | wind in (15, 20] kt | −20 | Moderate winds |
//! | adjusted wave > 1.0 m | −35 | Rough seas |
//! | adjusted wave in (0.5, 1.0] m | −15 | Moderate seas |
//! | precipitation | −25 | Rain |
//! | visibility Poor or Very Poor | −30 | Poor visibility |
//! | no sill clearance | −50 | Insufficient depth |
//! | 0 < tide height < 3.0 m | −15 | Low tide conditions |
//!
//! The score is not clamped and can go negative.

use crate::config::Settings;
use crate::marine::MarineReading;
use crate::resolver::{MarinaStatus, ResolvedTideState};
use crate::solar::SunTimes;
use crate::weather::WeatherReading;
use crate::{Field, MinuteOfDay};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minutes after sunset / before sunrise that still count as daylight.
const TWILIGHT_MARGIN_MIN: i32 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Excellent,
    Good,
    Caution,
    Poor,
    Night,
}

impl Rating {
    /// Thresholds apply to the unclamped score.
    pub fn from_score(score: i32) -> Self {
        match score {
            s if s >= 80 => Rating::Excellent,
            s if s >= 60 => Rating::Good,
            s if s >= 40 => Rating::Caution,
            _ => Rating::Poor,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Rating::Excellent => "Excellent",
            Rating::Good => "Good",
            Rating::Caution => "Caution",
            Rating::Poor => "Poor",
            Rating::Night => "Night",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionsAssessment {
    /// `None` at night
    pub score: Option<i32>,
    pub rating: Rating,
    /// Penalty labels in table order
    pub factors: Vec<String>,
    /// Last gate event was a close, independent of the score
    pub marina_closed: bool,
    /// Advisory notes against the user's wind/wave limits; never scored
    pub limit_warnings: Vec<String>,
}

/// Everything the scorer looks at.
#[derive(Clone, Copy, Debug)]
pub struct ScoreInputs<'a> {
    pub marine: &'a MarineReading,
    pub weather: &'a Field<WeatherReading>,
    pub tide: &'a ResolvedTideState,
    pub settings: &'a Settings,
    pub now: MinuteOfDay,
    pub sun: Field<SunTimes>,
}

/// Inside `[sunset + 30, sunrise - 30]`, wrapping past midnight.
///
/// A night shorter than both margins together has no window at all.
pub fn is_night(now: MinuteOfDay, sun: SunTimes) -> bool {
    let night_len =
        (i32::from(sun.sunrise.minutes()) - i32::from(sun.sunset.minutes())).rem_euclid(1440);
    if night_len < 2 * TWILIGHT_MARGIN_MIN {
        return false;
    }
    let start = sun.sunset.offset(TWILIGHT_MARGIN_MIN);
    let end = sun.sunrise.offset(-TWILIGHT_MARGIN_MIN);
    if start <= end {
        start <= now && now <= end
    } else {
        now >= start || now <= end
    }
}

/// Scale wave height for how exposed the harbour is to the wind direction.
///
/// Westerlies are sheltered by the island; north and south run straight in.
pub fn adjusted_wave_height(height_m: f64, wind_direction: Option<&str>) -> f64 {
    let factor = match wind_direction {
        Some(d) if d.contains('W') => 0.7,
        Some(d) if d.contains('N') || d.contains('S') => 1.5,
        Some(d) if d.contains('E') => 1.2,
        _ => 1.0,
    };
    height_m * factor
}

/// Assess conditions. Unknown wind, wave or weather readings add no penalty;
/// an unknown tide height means no sill clearance.
pub fn assess(inputs: &ScoreInputs<'_>) -> ConditionsAssessment {
    let marina_closed = inputs.tide.marina_status() == MarinaStatus::Closed;

    if let Field::Known(sun) = inputs.sun {
        if is_night(inputs.now, sun) {
            return ConditionsAssessment {
                score: None,
                rating: Rating::Night,
                factors: Vec::new(),
                marina_closed,
                limit_warnings: Vec::new(),
            };
        }
    }

    let mut score = 100;
    let mut factors = Vec::new();
    let mut penalise = |points: i32, label: &str| {
        score -= points;
        factors.push(label.to_string());
    };

    if let Field::Known(wind) = inputs.marine.wind_speed_kt {
        if wind > 20.0 {
            penalise(40, "Strong winds");
        } else if wind > 15.0 {
            penalise(20, "Moderate winds");
        }
    }

    let waves = adjusted_waves(inputs.marine);
    if let Some(waves) = waves {
        if waves > 1.0 {
            penalise(35, "Rough seas");
        } else if waves > 0.5 {
            penalise(15, "Moderate seas");
        }
    }

    if let Field::Known(weather) = inputs.weather {
        if weather.precipitation {
            penalise(25, "Rain");
        }
        if weather.visibility.known().is_some_and(|v| v.is_poor()) {
            penalise(30, "Poor visibility");
        }
    }

    if !inputs.tide.sill_clearance {
        penalise(50, "Insufficient depth");
    }

    if let Field::Known(height) = inputs.tide.current_height {
        if height > 0.0 && height < 3.0 {
            penalise(15, "Low tide conditions");
        }
    }

    ConditionsAssessment {
        score: Some(score),
        rating: Rating::from_score(score),
        factors,
        marina_closed,
        limit_warnings: limit_warnings(inputs.marine, waves, inputs.settings),
    }
}

fn adjusted_waves(marine: &MarineReading) -> Option<f64> {
    let direction = marine.wind_direction.known().map(String::as_str);
    marine
        .wave_height_m
        .known()
        .map(|h| adjusted_wave_height(*h, direction))
}

fn limit_warnings(marine: &MarineReading, waves: Option<f64>, settings: &Settings) -> Vec<String> {
    let factor = settings.risk_tolerance.limit_factor();
    let wind_cap = settings.wind_limit * factor;
    let wave_cap = settings.wave_limit * factor;

    let mut warnings = Vec::new();
    if let Field::Known(wind) = marine.wind_speed_kt {
        if wind > wind_cap {
            warnings.push(format!("Wind {wind:.0} kt is above your {wind_cap:.0} kt limit"));
        }
    }
    if let Some(waves) = waves {
        if waves > wave_cap {
            warnings.push(format!("Waves {waves:.1} m are above your {wave_cap:.1} m limit"));
        }
    }
    warnings
}
