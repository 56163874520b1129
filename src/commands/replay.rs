use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::bridge_client::parse_frame;
use crate::config::AppConfig;
use crate::flight_session::{FlightSession, format_duration};
use crate::session_runner::SessionRunner;
use crate::telemetry::Sample;

/// Feed a recorded telemetry file (one JSON bridge frame per line) through
/// the full pipeline without a simulator or network.
///
/// Useful for demos and for replaying a flight that misbehaved.
pub async fn handle_replay(config: &AppConfig, path: &Path, interval_secs: f64) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read replay file {:?}", path))?;

    let session = FlightSession::with_thresholds(
        config.low_speed_threshold_kts,
        config.max_segment_nm,
    );
    let runner = SessionRunner::spawn(session);
    let handle = runner.handle();
    let tx = runner.sample_sender();

    // Frames carry no timestamps, so replay advances a synthetic clock at
    // the bridge's native 2 s cadence (or the requested interval)
    let step_secs = if interval_secs > 0.0 { interval_secs } else { 2.0 };
    let mut clock = Utc::now();

    let mut fed = 0usize;
    let mut skipped = 0usize;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(raw) = parse_frame(line) else {
            skipped += 1;
            continue;
        };
        if let Some(error) = &raw.error {
            warn!("Skipping bridge error frame: {}", error);
            skipped += 1;
            continue;
        }

        tx.send(Sample::from_raw(&raw, clock))
            .await
            .context("Session update loop stopped unexpectedly")?;
        fed += 1;
        clock += chrono::Duration::milliseconds((step_secs * 1000.0) as i64);

        if interval_secs > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(interval_secs)).await;
        }
    }

    runner.shutdown().await;

    let snapshot = handle.snapshot().await;
    info!(
        "Replayed {} frames ({} skipped) from {:?}",
        fed, skipped, path
    );
    info!(
        "Result: state {:?}, {:.1} nm, duration {}, max {:.0} kts / {:.0} ft, {} track points, report ready: {}",
        snapshot.state,
        snapshot.distance_nm,
        format_duration(snapshot.duration_secs),
        snapshot.max_speed_knots,
        snapshot.max_altitude_feet,
        snapshot.track_points,
        snapshot.report_ready,
    );

    Ok(())
}
