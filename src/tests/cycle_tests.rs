//! # Refresh Cycle Tests
//!
//! Runs full orchestrator cycles against a canned transport. The transport sits
//! below the proxy layer, so every request arrives wrapped and percent-encoded
//! exactly as it would on the wire; it decodes the target and answers from fixed
//! pages. Switches on the transport simulate an outage or a broken feed.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sail_check_lib::config::{Config, ConfigError};
use sail_check_lib::fetch::{ContentFetcher, FetchError, ProxyEndpoint, ProxyStyle};
use sail_check_lib::orchestrator::{DomainStatus, Orchestrator, RefreshOutcome, SourceStatus};
use sail_check_lib::resolver::MarinaStatus;
use sail_check_lib::scorer::Rating;
use sail_check_lib::{ExtremeKind, Field, MarinaEventKind, MinuteOfDay, RelativeDay};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const PROXY: &str = "https://proxy.test/?";
const PROBE_URL: &str = "https://probe.test/ok";
const TIDE_URL: &str = "https://tides.test/";
const WEATHER_URL: &str = "https://weather.test/rss";
const WIND_URL: &str = "https://wind.test/current";
const WAVE_URL: &str = "https://wave.test/current";

const TODAY_PAGE: &str = r#"<html><body>
<table>
  <tr><th>Marina</th><th>Open</th><th>Close</th><th>Open</th><th>Close</th><th>Open</th></tr>
  <tr><td>Victoria Marina</td><td>09:20</td><td>16:05</td><td>21:40</td><td></td><td></td></tr>
  <tr><td>Albert Marina</td><td>08:45</td><td>16:50</td><td>21:00</td><td></td><td></td></tr>
  <tr><td>QEII Marina</td><td>00:10</td><td></td><td></td><td></td><td></td></tr>
</table>
<table>
  <tr><th>Tide</th><th>Time</th><th>Height</th></tr>
  <tr><td>Low</td><td>06:10</td><td>1.8m</td></tr>
  <tr><td>High</td><td>12:40</td><td>8.9m</td></tr>
  <tr><td>Low</td><td>18:55</td><td>2.1m</td></tr>
</table>
<table>
  <tr><th>Time</th><th>Height</th></tr>
  <tr><td>00:00</td><td>3.9m</td></tr>
  <tr><td>11:00</td><td>4.8m</td></tr>
  <tr><td>12:00</td><td>5.6m</td></tr>
  <tr><td>13:00</td><td>6.2m</td></tr>
</table>
</body></html>"#;

const YESTERDAY_PAGE: &str = r#"<html><body>
<table>
  <tr><th>Time</th><th>Height</th></tr>
  <tr><td>23:00</td><td>7.7m</td></tr>
</table>
<table>
  <tr><th>Tide</th><th>Time</th><th>Height</th></tr>
  <tr><td>Low</td><td>05:20</td><td>1.5m</td></tr>
  <tr><td>High</td><td>11:50</td><td>8.6m</td></tr>
  <tr><td>Low</td><td>17:58</td><td>1.9m</td></tr>
  <tr><td>High</td><td>23:50</td><td>8.4m</td></tr>
</table>
<table>
  <tr><th>Marina</th><th>Open</th><th>Close</th><th>Open</th><th>Close</th><th>Open</th></tr>
  <tr><td>Victoria Marina</td><td>08:30</td><td>15:10</td><td>20:50</td><td>22:30</td><td></td></tr>
</table>
</body></html>"#;

const TOMORROW_PAGE: &str = r#"<html><body>
<table>
  <tr><th>Time</th><th>Height</th></tr>
  <tr><td>01:00</td><td>8.7m</td></tr>
</table>
<table>
  <tr><th>Tide</th><th>Time</th><th>Height</th></tr>
  <tr><td>High</td><td>01:10</td><td>8.8m</td></tr>
  <tr><td>Low</td><td>07:25</td><td>1.7m</td></tr>
  <tr><td>High</td><td>13:40</td><td>8.9m</td></tr>
  <tr><td>Low</td><td>19:55</td><td>2.0m</td></tr>
</table>
<table>
  <tr><th>Marina</th><th>Open</th><th>Close</th><th>Open</th><th>Close</th><th>Open</th></tr>
  <tr><td>Victoria Marina</td><td></td><td>00:35</td><td>10:05</td><td>16:50</td><td></td></tr>
  <tr><td>QEII Marina</td><td></td><td>06:30</td><td>13:00</td><td></td><td></td></tr>
</table>
</body></html>"#;

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <item>
    <title>Today: Sunny, Minimum Temperature: 14&#176;C (57&#176;F) Maximum Temperature: 21&#176;C (70&#176;F)</title>
    <description>Maximum Temperature: 21&#176;C (70&#176;F), Visibility: Good, Sunrise: 05:25 BST, Sunset: 21:12 BST</description>
  </item>
</channel></rss>"#;

const WIND_JSON: &str = r#"{"current":{"wind_speed_10m":12.0,"wind_direction_10m":250}}"#;
const WAVE_JSON: &str = r#"{"current":{"wave_height":0.4}}"#;

/// Answers decoded target URLs from the fixtures above.
struct CannedTransport {
    offline: AtomicBool,
    weather_broken: AtomicBool,
    requests: Mutex<Vec<String>>,
    hold_probe: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl CannedTransport {
    fn new() -> Self {
        CannedTransport {
            offline: AtomicBool::new(false),
            weather_broken: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
            hold_probe: Mutex::new(None),
        }
    }

    /// Park the next probe until `release` fires, signalling `entered` first.
    fn hold_next_probe(&self, entered: Arc<Notify>, release: Arc<Notify>) {
        *self.hold_probe.lock().unwrap() = Some((entered, release));
    }

    fn requested(&self, needle: &str) -> bool {
        self.requests.lock().unwrap().iter().any(|r| r.contains(needle))
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ContentFetcher for CannedTransport {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let encoded = url
            .strip_prefix(PROXY)
            .ok_or_else(|| FetchError::Transport(format!("not proxied: {url}")))?;
        let target = urlencoding::decode(encoded)
            .map_err(|e| FetchError::Transport(e.to_string()))?
            .into_owned();
        self.requests.lock().unwrap().push(target.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Transport("connection refused".to_string()));
        }

        if target == PROBE_URL {
            let hold = self.hold_probe.lock().unwrap().take();
            if let Some((entered, release)) = hold {
                entered.notify_one();
                release.notified().await;
            }
            return Ok("{}".to_string());
        }

        let body = if target.starts_with(TIDE_URL) {
            if target.contains("yearDay=196") {
                TODAY_PAGE
            } else if target.contains("yearDay=195") {
                YESTERDAY_PAGE
            } else if target.contains("yearDay=197") {
                TOMORROW_PAGE
            } else {
                return Err(FetchError::Transport(format!("no page for {target}")));
            }
        } else if target == WEATHER_URL {
            if self.weather_broken.load(Ordering::SeqCst) {
                "<html><body>502 Bad Gateway</body></html>"
            } else {
                FEED
            }
        } else if target == WIND_URL {
            WIND_JSON
        } else if target == WAVE_URL {
            WAVE_JSON
        } else {
            return Err(FetchError::Transport(format!("unknown target {target}")));
        };

        Ok(body.to_string())
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.sources.tide_url = TIDE_URL.to_string();
    config.sources.weather_rss_url = WEATHER_URL.to_string();
    config.sources.wind_url = WIND_URL.to_string();
    config.sources.wave_url = WAVE_URL.to_string();
    config.sources.probe_url = PROBE_URL.to_string();
    config.sources.proxies = vec![ProxyEndpoint::new(PROXY, ProxyStyle::Prefix)];
    config.sources.max_proxy_attempts = 1;
    config
}

fn setup() -> (Arc<CannedTransport>, Orchestrator) {
    let transport = Arc::new(CannedTransport::new());
    let orchestrator = Orchestrator::new(test_config(), transport.clone()).unwrap();
    (transport, orchestrator)
}

/// 12:00 BST on 15 July 2025 (day 196)
fn midday() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 15, 11, 0, 0).unwrap()
}

/// 00:20 BST on 15 July 2025
fn just_after_midnight() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 14, 23, 20, 0).unwrap()
}

/// 23:30 BST on 15 July 2025
fn late_evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 15, 22, 30, 0).unwrap()
}

fn at(text: &str) -> MinuteOfDay {
    MinuteOfDay::parse(text).unwrap()
}

#[tokio::test]
async fn midday_cycle_resolves_everything_from_today() {
    let (transport, orchestrator) = setup();

    assert_eq!(orchestrator.refresh_at(midday()).await, RefreshOutcome::Completed);
    let state = orchestrator.snapshot();

    assert_eq!(
        state.source,
        SourceStatus::Connected(ProxyEndpoint::new(PROXY, ProxyStyle::Prefix))
    );
    assert_eq!(state.tide_status, DomainStatus::Fresh);
    assert_eq!(state.marine_status, DomainStatus::Fresh);
    assert_eq!(state.weather_status, DomainStatus::Fresh);

    let tide = &state.tide;
    assert_eq!(tide.current_height, Field::Known(5.6));
    assert!(tide.sill_clearance);
    let last = tide.last_extreme.known().unwrap();
    assert_eq!((last.event.kind, last.event.time), (ExtremeKind::Low, at("06:10")));
    let next = tide.next_extreme.known().unwrap();
    assert_eq!((next.event.kind, next.day), (ExtremeKind::High, RelativeDay::Today));
    assert_eq!(tide.marina_status(), MarinaStatus::Open);
    assert_eq!(
        tide.next_marina_event.known().map(|a| (a.event.kind, a.event.time)),
        Some((MarinaEventKind::Closed, at("16:05")))
    );

    assert_eq!(state.marine.wind_direction, Field::Known("WSW".to_string()));
    assert_eq!(state.marina_schedule_table.len(), 3);

    let assessment = state.assessment.known().unwrap();
    assert_eq!(assessment.score, Some(100));
    assert_eq!(assessment.rating, Rating::Excellent);
    assert!(!assessment.marina_closed);

    let updated = state.last_updated.unwrap();
    assert_eq!(updated.offset().local_minus_utc(), 3600);

    // Both streams bracket midday, so neither neighbour is fetched
    assert!(transport.requested("yearDay=196&reqDepth=150"));
    assert!(!transport.requested("yearDay=195"));
    assert!(!transport.requested("yearDay=197"));
}

#[tokio::test]
async fn broken_weather_feed_leaves_tide_untouched() {
    let (transport, orchestrator) = setup();
    orchestrator.refresh_at(midday()).await;
    let before = orchestrator.snapshot();

    transport.weather_broken.store(true, Ordering::SeqCst);
    assert_eq!(orchestrator.refresh_at(midday()).await, RefreshOutcome::Completed);
    let after = orchestrator.snapshot();

    assert_eq!(after.tide, before.tide);
    assert_eq!(after.tide_status, DomainStatus::Fresh);
    assert_eq!(after.marine, before.marine);
    assert_eq!(after.weather, Field::Unknown);
    assert!(matches!(after.weather_status, DomainStatus::Failed(_)));

    // Sun times fall back to the computed values
    assert!(after.sun.is_known());
    assert!(after.assessment.is_known());
}

#[tokio::test]
async fn outage_keeps_last_snapshot_data() {
    let (transport, orchestrator) = setup();
    orchestrator.refresh_at(midday()).await;
    let before = orchestrator.snapshot();

    transport.offline.store(true, Ordering::SeqCst);
    assert_eq!(orchestrator.refresh_at(midday()).await, RefreshOutcome::NoDataSource);
    let after = orchestrator.snapshot();

    assert_eq!(after.source, SourceStatus::Unavailable);
    assert_eq!(after.tide, before.tide);
    assert_eq!(after.assessment, before.assessment);
    assert_eq!(after.last_updated, before.last_updated);
}

#[tokio::test]
async fn first_cycle_without_a_source_reports_no_data() {
    let (transport, orchestrator) = setup();
    transport.offline.store(true, Ordering::SeqCst);

    assert_eq!(orchestrator.refresh_at(midday()).await, RefreshOutcome::NoDataSource);
    let state = orchestrator.snapshot();
    assert_eq!(state.source, SourceStatus::Unavailable);
    assert_eq!(state.tide_status, DomainStatus::NotAttempted);
    assert_eq!(state.assessment, Field::Unknown);
    assert!(state.last_updated.is_none());
    // Only the single probe went out
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn after_midnight_backfills_from_yesterday() {
    let (transport, orchestrator) = setup();

    assert_eq!(
        orchestrator.refresh_at(just_after_midnight()).await,
        RefreshOutcome::Completed
    );
    assert!(transport.requested("yearDay=195"));
    assert!(!transport.requested("yearDay=197"));

    let state = orchestrator.snapshot();
    let last = state.tide.last_extreme.known().unwrap();
    assert_eq!(last.day, RelativeDay::Yesterday);
    assert_eq!((last.event.kind, last.event.time), (ExtremeKind::High, at("23:50")));
    assert_eq!(state.tide.next_extreme.known().unwrap().event.time, at("06:10"));

    let gate = state.tide.last_marina_event.known().unwrap();
    assert_eq!(gate.day, RelativeDay::Yesterday);
    assert_eq!(gate.event.kind, MarinaEventKind::Closed);

    // Night wins over the score, but the closed marina is still flagged
    let assessment = state.assessment.known().unwrap();
    assert_eq!(assessment.rating, Rating::Night);
    assert_eq!(assessment.score, None);
    assert!(assessment.marina_closed);
}

#[tokio::test]
async fn late_evening_backfills_from_tomorrow() {
    let (transport, orchestrator) = setup();

    assert_eq!(orchestrator.refresh_at(late_evening()).await, RefreshOutcome::Completed);
    assert!(transport.requested("yearDay=197"));
    assert!(!transport.requested("yearDay=195"));

    let state = orchestrator.snapshot();
    let last = state.tide.last_extreme.known().unwrap();
    assert_eq!((last.day, last.event.time), (RelativeDay::Today, at("18:55")));
    let next = state.tide.next_extreme.known().unwrap();
    assert_eq!(next.day, RelativeDay::Tomorrow);
    assert_eq!((next.event.kind, next.event.time), (ExtremeKind::High, at("01:10")));

    // Reopened at 21:40 today, next gate move is after midnight
    assert_eq!(state.tide.marina_status(), MarinaStatus::Open);
    let gate = state.tide.next_marina_event.known().unwrap();
    assert_eq!(gate.day, RelativeDay::Tomorrow);
    assert_eq!((gate.event.kind, gate.event.time), (MarinaEventKind::Closed, at("00:35")));
}

#[tokio::test]
async fn both_neighbours_are_fetched_when_both_are_needed() {
    let (transport, orchestrator) = setup();
    let mut settings = orchestrator.settings();
    settings.marina = " QEII Marina ".to_string();

    let outcome = orchestrator
        .apply_settings_at(settings, just_after_midnight())
        .await
        .unwrap();
    assert_eq!(outcome, RefreshOutcome::Completed);
    assert!(transport.requested("yearDay=195"));
    assert!(transport.requested("yearDay=197"));

    let state = orchestrator.snapshot();
    assert_eq!(state.settings.marina, "QEII Marina");
    assert_eq!(state.tide_status, DomainStatus::Fresh);

    // Tides reach back to yesterday's last high water
    let last = state.tide.last_extreme.known().unwrap();
    assert_eq!(last.day, RelativeDay::Yesterday);
    assert_eq!((last.event.kind, last.event.time), (ExtremeKind::High, at("23:50")));

    // Gates open just after midnight today and next close tomorrow morning
    let opened = state.tide.last_marina_event.known().unwrap();
    assert_eq!(opened.day, RelativeDay::Today);
    assert_eq!((opened.event.kind, opened.event.time), (MarinaEventKind::Opened, at("00:10")));
    let closes = state.tide.next_marina_event.known().unwrap();
    assert_eq!(closes.day, RelativeDay::Tomorrow);
    assert_eq!((closes.event.kind, closes.event.time), (MarinaEventKind::Closed, at("06:30")));
}

#[tokio::test]
async fn trigger_during_a_cycle_is_ignored() {
    let (transport, orchestrator) = setup();
    let orchestrator = Arc::new(orchestrator);
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    transport.hold_next_probe(entered.clone(), release.clone());

    let background = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.refresh_at(midday()).await })
    };

    entered.notified().await;
    assert!(orchestrator.is_refreshing());
    assert_eq!(
        orchestrator.refresh_at(midday()).await,
        RefreshOutcome::AlreadyRunning
    );

    release.notify_one();
    assert_eq!(background.await.unwrap(), RefreshOutcome::Completed);
    assert!(!orchestrator.is_refreshing());
    assert!(orchestrator.snapshot().assessment.is_known());
}

#[tokio::test]
async fn settings_applied_during_a_cycle_are_published() {
    let (transport, orchestrator) = setup();
    let orchestrator = Arc::new(orchestrator);
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    transport.hold_next_probe(entered.clone(), release.clone());

    let background = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.refresh_at(midday()).await })
    };
    entered.notified().await;

    let mut settings = orchestrator.settings();
    settings.marina = "Albert Marina".to_string();
    let applying = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.apply_settings_at(settings, midday()).await })
    };

    // The settings change queues behind the running cycle
    tokio::task::yield_now().await;
    assert!(!applying.is_finished());
    assert_eq!(orchestrator.settings().marina, "Victoria Marina");

    release.notify_one();
    assert_eq!(background.await.unwrap(), RefreshOutcome::Completed);
    assert_eq!(applying.await.unwrap().unwrap(), RefreshOutcome::Completed);

    let state = orchestrator.snapshot();
    assert_eq!(state.settings.marina, "Albert Marina");
    assert_eq!(orchestrator.settings().marina, state.settings.marina);
    let last = state.tide.last_marina_event.known().unwrap();
    assert_eq!(last.event.time, at("08:45"));
}

#[tokio::test]
async fn invalid_settings_are_rejected_before_any_fetch() {
    let (transport, orchestrator) = setup();
    let mut settings = orchestrator.settings();
    settings.marina = "   ".to_string();

    let result = orchestrator.apply_settings(settings).await;
    assert!(matches!(result, Err(ConfigError::EmptyMarina)));
    assert_eq!(orchestrator.settings().marina, "Victoria Marina");
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn switching_marina_resolves_its_gate_times() {
    let (_transport, orchestrator) = setup();
    let mut settings = orchestrator.settings();
    settings.marina = "Albert Marina".to_string();

    let outcome = orchestrator.apply_settings_at(settings, midday()).await.unwrap();
    assert_eq!(outcome, RefreshOutcome::Completed);

    let state = orchestrator.snapshot();
    assert_eq!(state.settings.marina, "Albert Marina");
    let last = state.tide.last_marina_event.known().unwrap();
    assert_eq!((last.event.kind, last.event.time), (MarinaEventKind::Opened, at("08:45")));
    assert_eq!(
        state.tide.next_marina_event.known().map(|a| a.event.time),
        Some(at("16:50"))
    );
}
