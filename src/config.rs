//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the sail-config.toml file.
//! It covers three concerns:
//!
//! - **Harbour**: where the boat is kept (timezone and coordinates)
//! - **Settings**: the user's boat and marina, passed to the resolver and scorer each cycle
//! - **Sources**: which URLs to scrape and which proxies to try, in order
//!
//! Settings are validated at this boundary. An invalid boat draft is rejected here
//! and never reaches the scorer.

use crate::clock::HarbourClock;
use crate::fetch::{ProxyEndpoint, ProxyStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

/// Default config file, looked up in the working directory.
pub const CONFIG_FILE: &str = "sail-config.toml";

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("boat draft must be a positive number of metres, got {0}")]
    InvalidDraft(String),

    #[error("{0} limit must be a positive number")]
    InvalidLimit(&'static str),

    #[error("marina name must not be empty")]
    EmptyMarina,

    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("harbour coordinates out of range: {0}, {1}")]
    InvalidCoordinates(f64, f64),

    #[error("at least one proxy endpoint is required")]
    NoProxies,

    #[error("proxy attempt timeout must be at least one second")]
    InvalidTimeout,

    #[error("config IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("config format: {0}")]
    Format(#[from] toml::de::Error),

    #[error("config serialise: {0}")]
    Serialise(#[from] toml::ser::Error),
}

/// Boat draft in metres. Always finite and greater than zero.
///
/// # Example
/// ```
/// use sail_check_lib::config::BoatDraft;
///
/// let draft: BoatDraft = "1.2".parse().unwrap();
/// assert_eq!(draft.metres(), 1.2);
/// assert!("0".parse::<BoatDraft>().is_err());
/// assert!("deep".parse::<BoatDraft>().is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct BoatDraft(f64);

impl BoatDraft {
    pub fn metres(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for BoatDraft {
    type Error = ConfigError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value.is_finite() && value > 0.0 {
            Ok(BoatDraft(value))
        } else {
            Err(ConfigError::InvalidDraft(value.to_string()))
        }
    }
}

impl From<BoatDraft> for f64 {
    fn from(draft: BoatDraft) -> f64 {
        draft.0
    }
}

impl FromStr for BoatDraft {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidDraft(s.to_string()))?;
        BoatDraft::try_from(value)
    }
}

impl fmt::Display for BoatDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}m", self.0)
    }
}

/// How much margin the advisory wind/wave limits get.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

impl RiskTolerance {
    /// Multiplier applied to `wind_limit` and `wave_limit`
    pub fn limit_factor(self) -> f64 {
        match self {
            RiskTolerance::Conservative => 0.8,
            RiskTolerance::Moderate => 1.0,
            RiskTolerance::Aggressive => 1.2,
        }
    }
}

/// Application configuration loaded from sail-config.toml
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub harbour: HarbourConfig,
    pub settings: Settings,
    pub sources: SourceConfig,
}

/// Harbour location, used for local time and sunrise/sunset
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HarbourConfig {
    /// Human-readable harbour name for reports
    pub name: String,
    /// IANA timezone name (e.g., "Europe/Guernsey")
    pub timezone: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Per-user sailing settings, passed into the resolver and scorer each cycle
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    /// Marina name exactly as it appears in the tide table's first column
    pub marina: String,
    pub boat_draft: BoatDraft,
    /// Advisory wind cap in knots (not part of the score)
    pub wind_limit: f64,
    /// Advisory wave cap in metres (not part of the score)
    pub wave_limit: f64,
    pub risk_tolerance: RiskTolerance,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.marina.trim().is_empty() {
            return Err(ConfigError::EmptyMarina);
        }
        if !(self.wind_limit.is_finite() && self.wind_limit > 0.0) {
            return Err(ConfigError::InvalidLimit("wind"));
        }
        if !(self.wave_limit.is_finite() && self.wave_limit > 0.0) {
            return Err(ConfigError::InvalidLimit("wave"));
        }
        // BoatDraft already guarantees a positive draft
        Ok(())
    }
}

/// Upstream URLs and the proxy fallback policy
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Tide page base URL; year, yearDay and reqDepth are appended per day
    pub tide_url: String,
    pub weather_rss_url: String,
    /// JSON current-conditions endpoint returning wind speed (knots) and direction
    pub wind_url: String,
    /// JSON current-conditions endpoint returning significant wave height
    pub wave_url: String,
    /// Known-good URL fetched through each proxy to test it
    pub probe_url: String,
    /// Proxies in the order they are tried
    pub proxies: Vec<ProxyEndpoint>,
    /// Seconds before a single proxy attempt (or fetch) is abandoned
    pub attempt_timeout_secs: u64,
    /// Upper bound on proxies probed per cycle
    pub max_proxy_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            harbour: HarbourConfig {
                name: "St Peter Port, Guernsey".to_string(),
                timezone: "Europe/Guernsey".to_string(),
                latitude: 49.4542,
                longitude: -2.5361,
            },
            settings: Settings {
                marina: "Victoria Marina".to_string(),
                boat_draft: BoatDraft(1.5),
                wind_limit: 20.0,
                wave_limit: 1.0,
                risk_tolerance: RiskTolerance::Moderate,
            },
            sources: SourceConfig {
                tide_url: "https://tides.digimap.gg/".to_string(),
                weather_rss_url:
                    "https://weather-broker-cdn.api.bbci.co.uk/en/forecast/rss/3day/3042287"
                        .to_string(),
                wind_url: concat!(
                    "https://api.open-meteo.com/v1/forecast?latitude=49.45&longitude=-2.54",
                    "&current=wind_speed_10m,wind_direction_10m&wind_speed_unit=kn"
                )
                .to_string(),
                wave_url: concat!(
                    "https://marine-api.open-meteo.com/v1/marine?latitude=49.45&longitude=-2.54",
                    "&current=wave_height"
                )
                .to_string(),
                probe_url: "https://httpbin.org/json".to_string(),
                proxies: vec![
                    ProxyEndpoint::new(
                        "https://api.codetabs.com/v1/proxy?quest=",
                        ProxyStyle::Prefix,
                    ),
                    ProxyEndpoint::new("https://corsproxy.io/?", ProxyStyle::Prefix),
                    ProxyEndpoint::new(
                        "https://cors-anywhere.herokuapp.com/",
                        ProxyStyle::Prefix,
                    ),
                    ProxyEndpoint::new(
                        "https://api.allorigins.win/get?url=",
                        ProxyStyle::JsonEnvelope,
                    ),
                ],
                attempt_timeout_secs: 8,
                max_proxy_attempts: 4,
            },
        }
    }
}

impl Config {
    /// Load configuration from sail-config.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load_from_path(&path) {
            Ok(config) => {
                info!(
                    harbour = %config.harbour.name,
                    marina = %config.settings.marina,
                    "loaded configuration"
                );
                config
            }
            Err(ConfigError::Io(_)) => {
                info!("no config file found, using default configuration (St Peter Port)");
                Self::default()
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "invalid config file, using default configuration (St Peter Port)"
                );
                Self::default()
            }
        }
    }

    /// Load and validate, reporting the first problem found.
    pub fn try_load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        HarbourClock::from_name(&self.harbour.timezone)?;
        let (lat, lon) = (self.harbour.latitude, self.harbour.longitude);
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(ConfigError::InvalidCoordinates(lat, lon));
        }
        if self.sources.proxies.is_empty() || self.sources.max_proxy_attempts == 0 {
            return Err(ConfigError::NoProxies);
        }
        if self.sources.attempt_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn clock(&self) -> Result<HarbourClock, ConfigError> {
        HarbourClock::from_name(&self.harbour.timezone)
    }

    /// Save current configuration to sail-config.toml
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to_path(CONFIG_FILE)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}
