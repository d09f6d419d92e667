//! # Station Telemetry
//!
//! Normalizes battery-swap-station telemetry and keeps the dashboard fed.
//!
//! Live readings are read from stdin as JSON lines, one sensor document per
//! line, and every resulting station snapshot is written to stdout as a JSON
//! line. When stdin ends or fails, the feed falls back to simulated data.

use anyhow::{Context, Result};
use chrono::Utc;
use std::io::{BufReader, ErrorKind, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

use station_telemetry::config::{Config, LoggingConfig};
use station_telemetry::error::TelemetryError;
use station_telemetry::feed::{ChannelSource, FeedHandlers, FeedSupervisor, LiveSource};
use station_telemetry::fleet::simulator::UPDATE_PERIOD;
use station_telemetry::fleet::{summary, FleetSimulator, RoverTracker};
use station_telemetry::history::{metric, HistoricalSampler, MemoryHistoryStore, TrackedSample, WindowArena};
use station_telemetry::telemetry::{Normalizer, StationSnapshot};

/// Rovers in the simulated fleet
const FLEET_SIZE: usize = 12;

/// Number of snapshots between status log messages
const LOG_INTERVAL_SNAPSHOTS: u64 = 60;

/// Log file name prefix inside `logging.log_dir`
const LOG_FILE_PREFIX: &str = "station-telemetry.log";

/// Main entry point for Station Telemetry
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (path from the first argument, else defaults)
///    - Set up logging with tracing subscriber
///    - Start the feed supervisor on stdin, or on simulated data when
///      `USE_MOCK_DATA` is set
///
/// 2. **Main Loop**
///    - Print every station snapshot as a JSON line; a closed stdout ends
///      the loop
///    - Track per-slot SoC history over the configured chart range
///    - Advance the simulated rover fleet every 5 seconds
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop the feed supervisor
///    - Log snapshot count, the live slot's window and history summary
///
/// # Examples
///
/// ```bash
/// echo '{"voltage": 12.7, "current_mA": 1500, "temperatureC": 28.1}' | station-telemetry
/// USE_MOCK_DATA=true station-telemetry config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _log_guard = init_logging(&config.logging)?;

    info!("Station Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));

    let normalizer = Normalizer::new(config.calibration.profile());
    let history = Arc::new(MemoryHistoryStore::new(config.history.retained_samples));
    let sampler = HistoricalSampler::with_store(
        normalizer,
        history.clone(),
        config.feed.collection_name.clone(),
        config.feed.live_slot,
        config.history.max_page_size,
    );

    let (snapshot_tx, mut snapshots) = mpsc::unbounded_channel::<StationSnapshot>();
    let handlers = FeedHandlers::new(Arc::new(move |snapshot: StationSnapshot| {
        let _ = snapshot_tx.send(snapshot);
    }))
    .with_error(Arc::new(|e: TelemetryError| warn!("Feed error: {}", e)));

    let supervisor = FeedSupervisor::start(
        config.feed.clone(),
        normalizer,
        Some(history),
        handlers,
        |feed| {
            // Blocking reads on a detached thread keep shutdown from waiting on stdin
            let stdin = BufReader::new(std::io::stdin());
            let source = ChannelSource::from_blocking_reader(stdin, &feed.collection_name)?;
            Ok(Box::new(source) as Box<dyn LiveSource>)
        },
    );
    info!("Feed started in {:?} mode", supervisor.mode());

    let mut slot_history = WindowArena::for_range(config.history.chart_range_minutes);
    let stdout = std::io::stdout();
    let mut fleet = FleetSimulator::new(FLEET_SIZE);
    let mut tracker = RoverTracker::new(config.history.rover_buffer_capacity);
    let mut fleet_interval = interval(UPDATE_PERIOD);

    info!("Press Ctrl+C to exit");

    let mut snapshot_count: u64 = 0;

    loop {
        tokio::select! {
            Some(snapshot) = snapshots.recv() => {
                record_slot_history(&mut slot_history, &snapshot);
                if !write_snapshot(&mut stdout.lock(), &snapshot)? {
                    info!("stdout closed, shutting down...");
                    break;
                }

                snapshot_count += 1;
                if snapshot_count % LOG_INTERVAL_SNAPSHOTS == 0 {
                    info!("Emitted {} snapshots ({} active slots); {}",
                        snapshot_count, snapshot.active_slot_count(),
                        window_summary(&slot_history, config.feed.live_slot));
                }
            }

            _ = fleet_interval.tick() => {
                let now = Utc::now();
                let rovers = fleet.advance(now);
                if let Some(drain_rate) = tracker.observe(rovers, now) {
                    debug!("Rover {} drain rate {:.2} %/min",
                        tracker.selected().unwrap_or("-"), drain_rate);
                }
                debug!("Fleet: {}", summary(rovers));
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    supervisor.stop();

    let series = sampler.sample(config.feed.live_slot, config.history.chart_range_minutes);
    info!(
        "Total snapshots emitted: {}; slot {} history: {} points; {}",
        snapshot_count,
        config.feed.live_slot,
        series.len(),
        window_summary(&slot_history, config.feed.live_slot)
    );

    Ok(())
}

/// Loads the config file named by the first argument, or defaults.
fn load_config() -> Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => {
            Config::load(&path).with_context(|| format!("Failed to load configuration from {}", path))
        }
        None => Config::from_env().context("Invalid configuration"),
    }
}

/// Installs the tracing subscriber. Logs go to stderr, or to a daily rolling
/// file when `log_dir` is set; the returned guard must outlive logging.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let directive: Directive = logging
        .level
        .parse()
        .with_context(|| format!("Invalid log level {}", logging.level))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    if logging.log_dir.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    }

    let appender = tracing_appender::rolling::daily(&logging.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

/// Appends each occupied slot's SoC to that slot's window.
fn record_slot_history(windows: &mut WindowArena, snapshot: &StationSnapshot) {
    for slot in snapshot.slots.iter().filter(|slot| slot.occupied) {
        if let Some(soc) = slot.state_of_charge_percent {
            let sample = TrackedSample::new(slot.observed_at, soc)
                .with_metric(metric::SOC, Some(soc))
                .with_metric(metric::VOLTAGE, slot.voltage_volts);
            windows.append(&slot_key(slot.slot_id), sample);
        }
    }
}

fn slot_key(slot_id: u32) -> String {
    format!("slot-{}", slot_id)
}

/// One-line view of a slot's window: fill, latest SoC and drain rate.
fn window_summary(windows: &WindowArena, slot_id: u32) -> String {
    let key = slot_key(slot_id);
    let Some((buffer, latest)) = windows
        .buffer(&key)
        .and_then(|buffer| buffer.latest().map(|latest| (buffer, latest)))
    else {
        return format!("{} window empty", key);
    };
    format!(
        "{} window {}/{} points, SoC {:.1}%, drain {:.2} %/min",
        key,
        buffer.len(),
        buffer.capacity(),
        latest.metric(metric::SOC).unwrap_or(0.0),
        latest.metric(metric::DRAIN_RATE).unwrap_or(0.0)
    )
}

/// Writes a snapshot as one JSON line. Returns `false` once the reader of
/// `out` has gone away.
fn write_snapshot<W: Write>(out: &mut W, snapshot: &StationSnapshot) -> Result<bool> {
    let line = serde_json::to_string(snapshot).context("Failed to encode snapshot")?;
    match writeln!(out, "{}", line).and_then(|()| out.flush()) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(false),
        Err(e) => Err(e).context("Failed to write snapshot"),
    }
}
