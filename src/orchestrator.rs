//! # Refresh Cycle Coordination
//!
//! One refresh cycle turns the configured sources into a new [`AppState`]:
//!
//! 1. **Acquire**: probe the proxy list for a working channel
//! 2. **Tide**: fetch and parse today's table, then yesterday and/or tomorrow when
//!    the resolver needs them (fetched concurrently, joined before resolving)
//! 3. **Resolve**: last/next extreme and marina event, current height, sill clearance
//! 4. **Marine + Weather**: independent pipelines, run side by side
//! 5. **Score**: combine everything into a [`ConditionsAssessment`]
//! 6. **Publish**: stamp the update time and swap in the new snapshot
//!
//! ## Failure Isolation
//! Each data domain (tide, marine, weather) fails on its own. A failed domain has
//! its fields reset to `Unknown` and its status set to [`DomainStatus::Failed`];
//! the other domains keep whatever this cycle produced for them. If no proxy
//! answers at all, the cycle ends with [`RefreshOutcome::NoDataSource`] and the
//! previous snapshot's data is left as it was.
//!
//! ## Snapshots
//! [`AppState`] is never mutated in place. Each step goes through a reducer that
//! consumes the old value and returns the next, and readers get an
//! `Arc<AppState>` that stays valid however many refreshes follow.
//!
//! ## Reentrancy
//! Only one cycle runs at a time. A manual trigger that arrives while a cycle is
//! in flight returns [`RefreshOutcome::AlreadyRunning`] without doing anything.
//! A settings change is different: it waits for the running cycle to finish and
//! then runs its own, so the published snapshot always ends up with the settings
//! that were last applied.

use crate::clock::HarbourClock;
use crate::config::{Config, ConfigError, Settings};
use crate::fetch::{acquire_channel, ContentFetcher, ProbePolicy, ProxyChannel, ProxyEndpoint};
use crate::marine::{fetch_marine, MarineError, MarineReading};
use crate::resolver::{needs_more_data, resolve, ResolvedTideState};
use crate::scorer::{assess, ConditionsAssessment, ScoreInputs};
use crate::solar::{sun_times, SunTimes};
use crate::tide_table::{fetch_day, TideError};
use crate::weather::{fetch_weather, WeatherError, WeatherReading};
use crate::{DayTideData, Field, MarinaTimes, MinuteOfDay, RelativeDay};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How the last attempt to update one data domain went.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum DomainStatus {
    NotAttempted,
    Fresh,
    Failed(String),
}

/// Which proxy, if any, the last cycle went through.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum SourceStatus {
    Unprobed,
    Connected(ProxyEndpoint),
    Unavailable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed,
    AlreadyRunning,
    NoDataSource,
}

/// Result of the tide pipeline: the resolved state plus today's marina table.
#[derive(Clone, Debug, PartialEq)]
pub struct TideUpdate {
    pub resolved: ResolvedTideState,
    pub schedule_table: Vec<MarinaTimes>,
}

/// Everything the presentation layer shows, as of one refresh cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppState {
    pub harbour: String,
    pub settings: Settings,
    pub tide: ResolvedTideState,
    pub marine: MarineReading,
    pub weather: Field<WeatherReading>,
    pub sun: Field<SunTimes>,
    pub assessment: Field<ConditionsAssessment>,
    /// Today's published marina table, for reference display
    pub marina_schedule_table: Vec<MarinaTimes>,
    pub tide_status: DomainStatus,
    pub marine_status: DomainStatus,
    pub weather_status: DomainStatus,
    pub source: SourceStatus,
    pub last_updated: Option<DateTime<FixedOffset>>,
}

impl AppState {
    /// State before the first refresh: nothing known, nothing attempted.
    pub fn initial(harbour: impl Into<String>, settings: Settings) -> Self {
        AppState {
            harbour: harbour.into(),
            settings,
            tide: ResolvedTideState::unknown(),
            marine: MarineReading::unknown(),
            weather: Field::Unknown,
            sun: Field::Unknown,
            assessment: Field::Unknown,
            marina_schedule_table: Vec::new(),
            tide_status: DomainStatus::NotAttempted,
            marine_status: DomainStatus::NotAttempted,
            weather_status: DomainStatus::NotAttempted,
            source: SourceStatus::Unprobed,
            last_updated: None,
        }
    }

    pub fn with_settings(self, settings: Settings) -> Self {
        AppState { settings, ..self }
    }

    pub fn with_source(self, source: SourceStatus) -> Self {
        AppState { source, ..self }
    }

    pub fn with_tide(self, result: Result<TideUpdate, TideError>) -> Self {
        match result {
            Ok(update) => AppState {
                tide: update.resolved,
                marina_schedule_table: update.schedule_table,
                tide_status: DomainStatus::Fresh,
                ..self
            },
            Err(e) => AppState {
                tide: ResolvedTideState::unknown(),
                marina_schedule_table: Vec::new(),
                tide_status: failed(&e),
                ..self
            },
        }
    }

    pub fn with_marine(self, result: Result<MarineReading, MarineError>) -> Self {
        match result {
            Ok(marine) => AppState {
                marine,
                marine_status: DomainStatus::Fresh,
                ..self
            },
            Err(e) => AppState {
                marine: MarineReading::unknown(),
                marine_status: failed(&e),
                ..self
            },
        }
    }

    pub fn with_weather(self, result: Result<WeatherReading, WeatherError>) -> Self {
        match result {
            Ok(weather) => AppState {
                weather: Field::Known(weather),
                weather_status: DomainStatus::Fresh,
                ..self
            },
            Err(e) => AppState {
                weather: Field::Unknown,
                weather_status: failed(&e),
                ..self
            },
        }
    }

    pub fn with_assessment(self, sun: Field<SunTimes>, assessment: ConditionsAssessment) -> Self {
        AppState {
            sun,
            assessment: Field::Known(assessment),
            ..self
        }
    }

    pub fn stamped(self, at: DateTime<FixedOffset>) -> Self {
        AppState {
            last_updated: Some(at),
            ..self
        }
    }
}

fn failed(error: &dyn fmt::Display) -> DomainStatus {
    DomainStatus::Failed(error.to_string())
}

/// Owns the published snapshot and runs refresh cycles against it.
pub struct Orchestrator {
    config: Config,
    clock: HarbourClock,
    transport: Arc<dyn ContentFetcher>,
    settings: RwLock<Settings>,
    state: RwLock<Arc<AppState>>,
    /// Held for the whole of a cycle
    cycle: Mutex<()>,
}

impl Orchestrator {
    pub fn new(config: Config, transport: Arc<dyn ContentFetcher>) -> Result<Self, ConfigError> {
        config.validate()?;
        let clock = config.clock()?;
        let settings = config.settings.clone();
        let state = AppState::initial(config.harbour.name.clone(), settings.clone());

        Ok(Orchestrator {
            config,
            clock,
            transport,
            settings: RwLock::new(settings),
            state: RwLock::new(Arc::new(state)),
            cycle: Mutex::new(()),
        })
    }

    /// The most recently published state.
    pub fn snapshot(&self) -> Arc<AppState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.cycle.try_lock().is_err()
    }

    /// Validate and store new settings, then run a refresh with them.
    ///
    /// Invalid settings are rejected here and never reach the resolver or scorer.
    pub async fn apply_settings(&self, settings: Settings) -> Result<RefreshOutcome, ConfigError> {
        self.apply_settings_at(settings, Utc::now()).await
    }

    /// [`Orchestrator::apply_settings`] with the cycle run as if at `now`.
    ///
    /// Waits for any cycle already in flight, so the refresh that follows always
    /// sees the new settings.
    pub async fn apply_settings_at(
        &self,
        mut settings: Settings,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, ConfigError> {
        settings.validate()?;
        settings.marina = settings.marina.trim().to_string();

        let _cycle = self.cycle.lock().await;
        info!(marina = %settings.marina, draft = %settings.boat_draft, "settings updated");
        *self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
        Ok(self.run_cycle(now).await)
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        self.refresh_at(Utc::now()).await
    }

    /// Run one cycle as if the current instant were `now`.
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> RefreshOutcome {
        let Ok(_cycle) = self.cycle.try_lock() else {
            debug!("refresh already in flight, ignoring trigger");
            return RefreshOutcome::AlreadyRunning;
        };
        self.run_cycle(now).await
    }

    /// One full cycle; callers hold the cycle lock.
    async fn run_cycle(&self, now: DateTime<Utc>) -> RefreshOutcome {
        let settings = self.settings();
        let sources = &self.config.sources;
        let policy = ProbePolicy::from_sources(sources);

        let channel = match acquire_channel(
            self.transport.clone(),
            &sources.proxies,
            &sources.probe_url,
            &policy,
        )
        .await
        {
            Ok(channel) => channel,
            Err(e) => {
                warn!(error = %e, "no live data this cycle");
                let state = self.current().with_source(SourceStatus::Unavailable);
                self.publish(state);
                return RefreshOutcome::NoDataSource;
            }
        };

        let today = self.clock.today(now);
        let minute = self.clock.minute_of_day(now);
        info!(%today, now = %minute, marina = %settings.marina, "refresh cycle started");

        let tide = self.tide_pipeline(&channel, &settings, today, minute).await;
        let (marine, weather) = tokio::join!(
            fetch_marine(&channel, &sources.wind_url, &sources.wave_url),
            fetch_weather(&channel, &sources.weather_rss_url),
        );

        if let Err(e) = &tide {
            warn!(error = %e, "tide data unavailable");
        }
        if let Err(e) = &marine {
            warn!(error = %e, "wind/wave data unavailable");
        }
        if let Err(e) = &weather {
            warn!(error = %e, "weather data unavailable");
        }

        let state = self
            .current()
            .with_settings(settings.clone())
            .with_source(SourceStatus::Connected(channel.endpoint().clone()))
            .with_tide(tide)
            .with_marine(marine)
            .with_weather(weather);

        let sun = self.sun_for(&state.weather, today);
        let assessment = assess(&ScoreInputs {
            marine: &state.marine,
            weather: &state.weather,
            tide: &state.tide,
            settings: &settings,
            now: minute,
            sun,
        });
        info!(
            rating = %assessment.rating,
            score = ?assessment.score,
            marina_closed = assessment.marina_closed,
            "conditions assessed"
        );

        let state = state
            .with_assessment(sun, assessment)
            .stamped(self.clock.local(now).fixed_offset());
        self.publish(state);

        RefreshOutcome::Completed
    }

    async fn tide_pipeline(
        &self,
        channel: &ProxyChannel,
        settings: &Settings,
        today: NaiveDate,
        now: MinuteOfDay,
    ) -> Result<TideUpdate, TideError> {
        let base = &self.config.sources.tide_url;
        let draft = settings.boat_draft;

        let day = fetch_day(channel, base, today, draft).await?;
        let needs = needs_more_data(&day, &settings.marina, now);
        if needs.any() {
            debug!(
                yesterday = needs.yesterday,
                tomorrow = needs.tomorrow,
                "fetching adjacent days"
            );
        }

        let (yesterday, tomorrow) = tokio::join!(
            self.adjacent_day(channel, settings, today, RelativeDay::Yesterday, needs.yesterday),
            self.adjacent_day(channel, settings, today, RelativeDay::Tomorrow, needs.tomorrow),
        );

        let resolved = resolve(
            &day,
            yesterday.as_ref(),
            tomorrow.as_ref(),
            &settings.marina,
            now,
            draft,
        );

        Ok(TideUpdate {
            resolved,
            schedule_table: day.schedule_table,
        })
    }

    /// An adjacent day is best effort: failure leaves its fields unknown.
    async fn adjacent_day(
        &self,
        channel: &ProxyChannel,
        settings: &Settings,
        today: NaiveDate,
        which: RelativeDay,
        needed: bool,
    ) -> Option<DayTideData> {
        if !needed {
            return None;
        }
        let date = which.date_from(today)?;
        let base = &self.config.sources.tide_url;
        match fetch_day(channel, base, date, settings.boat_draft).await {
            Ok(day) => Some(day),
            Err(e) => {
                warn!(day = %which, %date, error = %e, "adjacent tide table unavailable");
                None
            }
        }
    }

    /// Forecast sunrise/sunset when the feed has both, otherwise computed.
    fn sun_for(&self, weather: &Field<WeatherReading>, today: NaiveDate) -> Field<SunTimes> {
        if let Field::Known(w) = weather {
            if let (Field::Known(sunrise), Field::Known(sunset)) = (w.sunrise, w.sunset) {
                return Field::Known(SunTimes { sunrise, sunset });
            }
        }
        let harbour = &self.config.harbour;
        sun_times(today, harbour.latitude, harbour.longitude, self.clock.timezone())
    }

    fn current(&self) -> AppState {
        self.snapshot().as_ref().clone()
    }

    fn publish(&self, state: AppState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::resolver::Anchored;
    use crate::{MarinaEvent, MarinaEventKind};

    fn base() -> AppState {
        AppState::initial("Test Harbour", Config::default().settings)
    }

    fn resolved_open() -> ResolvedTideState {
        ResolvedTideState {
            current_height: Field::Known(5.2),
            last_marina_event: Field::Known(Anchored {
                day: RelativeDay::Today,
                event: MarinaEvent {
                    kind: MarinaEventKind::Opened,
                    time: MinuteOfDay::from_hm(9, 15).unwrap(),
                },
            }),
            sill_clearance: true,
            ..ResolvedTideState::unknown()
        }
    }

    #[test]
    fn initial_state_knows_nothing() {
        let state = base();
        assert_eq!(state.tide, ResolvedTideState::unknown());
        assert_eq!(state.assessment, Field::Unknown);
        assert_eq!(state.source, SourceStatus::Unprobed);
        assert_eq!(state.tide_status, DomainStatus::NotAttempted);
        assert!(state.last_updated.is_none());
    }

    #[test]
    fn weather_failure_does_not_touch_tide() {
        let state = base().with_tide(Ok(TideUpdate {
            resolved: resolved_open(),
            schedule_table: vec![],
        }));
        let before = state.tide.clone();

        let state = state.with_weather(Err(WeatherError::NoItems));
        assert_eq!(state.tide, before);
        assert_eq!(state.tide_status, DomainStatus::Fresh);
        assert_eq!(state.weather, Field::Unknown);
        assert!(matches!(state.weather_status, DomainStatus::Failed(_)));
    }

    #[test]
    fn tide_failure_resets_tide_fields_only() {
        let state = base()
            .with_tide(Ok(TideUpdate {
                resolved: resolved_open(),
                schedule_table: vec![],
            }))
            .with_marine(Ok(MarineReading {
                wind_speed_kt: Field::Known(11.0),
                ..MarineReading::unknown()
            }));

        let state = state.with_tide(Err(TideError::NoReadings));
        assert_eq!(state.tide, ResolvedTideState::unknown());
        assert_eq!(state.marine.wind_speed_kt, Field::Known(11.0));
        assert_eq!(state.marine_status, DomainStatus::Fresh);
        assert_eq!(
            state.tide_status,
            DomainStatus::Failed(TideError::NoReadings.to_string())
        );
    }

    #[test]
    fn marine_failure_is_recorded() {
        let err = MarineError::Fetch(FetchError::Transport("reset".to_string()));
        let state = base().with_marine(Err(err));
        assert_eq!(state.marine, MarineReading::unknown());
        assert!(matches!(
            state.marine_status,
            DomainStatus::Failed(ref m) if m.contains("reset")
        ));
    }

    #[test]
    fn settings_change_replaces_settings_and_keeps_readings() {
        let mut albert = Config::default().settings;
        albert.marina = "Albert Marina".to_string();
        let state = base()
            .with_marine(Ok(MarineReading {
                wind_speed_kt: Field::Known(9.0),
                ..MarineReading::unknown()
            }))
            .with_settings(albert.clone());
        assert_eq!(state.settings, albert);
        assert_eq!(state.marine.wind_speed_kt, Field::Known(9.0));
    }
}
