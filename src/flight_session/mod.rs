//! Flight session tracking: one session per flight attempt, from first
//! movement to landing-and-stop.
//!
//! The session is the exclusive owner of its running statistics and its
//! track. Samples must be delivered in arrival order by a single producer;
//! the session itself does no locking.

pub mod track;

pub use track::Track;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::geo::{Position, haversine_nm};
use crate::telemetry::{Phase, Sample};

/// Below this ground speed a LANDED aircraft counts as stopped
pub const DEFAULT_LOW_SPEED_THRESHOLD_KTS: f64 = 10.0;

/// Lifecycle state of a flight session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No movement seen yet (or freshly reset)
    Idle,
    /// Clock running, flight in progress
    Active,
    /// Landed and observed below the low-speed threshold; a report may be filed
    LandedReady,
}

/// Emitted once per phase transition; repeated identical phases never re-emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub phase: Phase,
    pub at: DateTime<Utc>,
}

/// Immutable copy of the session state for display consumers.
///
/// Readers get a snapshot, never a reference into live state, so a display
/// refresh can never observe a half-applied update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub phase: Option<Phase>,
    pub started_at: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub distance_nm: f64,
    /// Current values from the last sample, for HUD display and live updates
    pub speed_knots: f64,
    pub altitude_feet: f64,
    pub heading_degrees: f64,
    pub max_speed_knots: f64,
    pub max_altitude_feet: f64,
    pub fuel_kg: Option<f64>,
    pub last_position: Option<Position>,
    pub track_points: usize,
    pub report_ready: bool,
}

/// Format an elapsed duration as `h:mm` for log lines and HUD display
pub fn format_duration(secs: i64) -> String {
    let secs = secs.max(0);
    format!("{}:{:02}", secs / 3600, (secs % 3600) / 60)
}

/// State for one tracked flight attempt.
///
/// Created empty; the duration clock starts on the first sample whose phase
/// is not PARKED, not at connect time. Reset is explicit only (logout or new
/// flight selection); a bridge disconnect leaves the trip in progress.
#[derive(Debug, Clone)]
pub struct FlightSession {
    low_speed_threshold_kts: f64,
    /// When set, a single segment longer than this is dropped from the
    /// distance accumulation instead of being merged (bridge reconnect
    /// glitches can report a wildly different coordinate)
    max_segment_nm: Option<f64>,

    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    last_sample_at: Option<DateTime<Utc>>,
    last_position: Option<Position>,
    distance_nm: f64,
    speed_knots: f64,
    altitude_feet: f64,
    heading_degrees: f64,
    max_speed_knots: f64,
    max_altitude_feet: f64,
    last_fuel_kg: Option<f64>,
    current_phase: Option<Phase>,
    last_logged_phase: Option<Phase>,
    track: Track,
}

impl Default for FlightSession {
    fn default() -> Self {
        Self::new()
    }
}

impl FlightSession {
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_LOW_SPEED_THRESHOLD_KTS, None)
    }

    pub fn with_thresholds(low_speed_threshold_kts: f64, max_segment_nm: Option<f64>) -> Self {
        Self {
            low_speed_threshold_kts,
            max_segment_nm,
            state: SessionState::Idle,
            started_at: None,
            last_sample_at: None,
            last_position: None,
            distance_nm: 0.0,
            speed_knots: 0.0,
            altitude_feet: 0.0,
            heading_degrees: 0.0,
            max_speed_knots: 0.0,
            max_altitude_feet: 0.0,
            last_fuel_kg: None,
            current_phase: None,
            last_logged_phase: None,
            track: Track::new(),
        }
    }

    /// Apply one normalized sample in arrival order.
    ///
    /// Returns a `PhaseChange` when the phase differs from the last one
    /// logged. Distance accumulation is irrevocable: a merged segment is
    /// never corrected retroactively.
    pub fn apply(&mut self, sample: &Sample) -> Option<PhaseChange> {
        metrics::counter!("session.samples_applied_total").increment(1);

        // The clock starts with first movement, not at connect: a parked
        // aircraft does not start the flight
        if self.started_at.is_none() && sample.phase != Phase::Parked {
            self.started_at = Some(sample.received_at);
            if self.state == SessionState::Idle {
                self.state = SessionState::Active;
            }
            info!(
                "Flight session started at {} (phase {})",
                sample.received_at, sample.phase
            );
        }

        match (self.last_position, sample.position) {
            (Some(prev), Some(current)) => {
                let segment = haversine_nm(prev, current);
                if let Some(limit) = self.max_segment_nm
                    && segment > limit
                {
                    warn!(
                        "Dropping {:.1} nm segment (limit {:.1} nm), position jump from {:.4},{:.4} to {:.4},{:.4}",
                        segment,
                        limit,
                        prev.latitude,
                        prev.longitude,
                        current.latitude,
                        current.longitude
                    );
                    metrics::counter!("session.segments_clamped_total").increment(1);
                } else {
                    self.distance_nm += segment;
                }
            }
            (_, None) => {
                metrics::counter!("session.samples_without_fix_total").increment(1);
            }
            _ => {}
        }

        self.speed_knots = sample.speed_knots;
        self.altitude_feet = sample.altitude_feet;
        self.heading_degrees = sample.heading_degrees;
        self.max_speed_knots = self.max_speed_knots.max(sample.speed_knots);
        self.max_altitude_feet = self.max_altitude_feet.max(sample.altitude_feet);

        if let Some(position) = sample.position {
            self.last_position = Some(position);
            self.track.append(position);
        }

        if sample.fuel_kg.is_some() {
            self.last_fuel_kg = sample.fuel_kg;
        }

        self.last_sample_at = Some(sample.received_at);
        self.current_phase = Some(sample.phase.clone());

        // Landed-and-slow latches the readiness flag for the rest of the
        // session: taxiing to the gate afterwards must not withdraw an
        // eligible report
        if self.state != SessionState::LandedReady
            && sample.phase == Phase::Landed
            && sample.speed_knots < self.low_speed_threshold_kts
        {
            self.state = SessionState::LandedReady;
            info!(
                "Landed and stopped ({:.0} kts), flight report ready",
                sample.speed_knots
            );
        }

        if self.last_logged_phase.as_ref() != Some(&sample.phase) {
            self.last_logged_phase = Some(sample.phase.clone());
            debug!("Phase change: {}", sample.phase);
            return Some(PhaseChange {
                phase: sample.phase.clone(),
                at: sample.received_at,
            });
        }

        None
    }

    /// Elapsed flight time as of the last applied sample; zero before the
    /// clock has started
    pub fn duration_secs(&self) -> i64 {
        match (self.started_at, self.last_sample_at) {
            (Some(started), Some(last)) => (last - started).num_seconds().max(0),
            _ => 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True iff the session has reached landed-and-stopped
    pub fn is_report_ready(&self) -> bool {
        self.state == SessionState::LandedReady
    }

    pub fn distance_nm(&self) -> f64 {
        self.distance_nm
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    /// Immutable copy of the current state for display consumers
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            phase: self.current_phase.clone(),
            started_at: self.started_at,
            duration_secs: self.duration_secs(),
            distance_nm: self.distance_nm,
            speed_knots: self.speed_knots,
            altitude_feet: self.altitude_feet,
            heading_degrees: self.heading_degrees,
            max_speed_knots: self.max_speed_knots,
            max_altitude_feet: self.max_altitude_feet,
            fuel_kg: self.last_fuel_kg,
            last_position: self.last_position,
            track_points: self.track.len(),
            report_ready: self.is_report_ready(),
        }
    }

    /// Discard all per-flight state and return to Idle.
    ///
    /// Only called on logout or when the pilot selects a new flight; never
    /// on bridge disconnect.
    pub fn reset(&mut self) {
        info!(
            "Resetting flight session ({} track points, {:.1} nm)",
            self.track.len(),
            self.distance_nm
        );
        metrics::counter!("session.resets_total").increment(1);

        self.state = SessionState::Idle;
        self.started_at = None;
        self.last_sample_at = None;
        self.last_position = None;
        self.distance_nm = 0.0;
        self.speed_knots = 0.0;
        self.altitude_feet = 0.0;
        self.heading_degrees = 0.0;
        self.max_speed_knots = 0.0;
        self.max_altitude_feet = 0.0;
        self.last_fuel_kg = None;
        self.current_phase = None;
        self.last_logged_phase = None;
        self.track.clear();
    }
}
