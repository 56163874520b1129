//! Channel-driven session update loop.
//!
//! Telemetry producers (bridge client, replay source) push normalized
//! Samples into a bounded mpsc queue; a single consumer task drains it into
//! the `FlightSession` under one mutex, so every update is a complete
//! critical section. Display consumers subscribe to broadcast channels and
//! only ever see immutable snapshots.

use std::sync::Arc;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::flight_session::{FlightSession, PhaseChange, SessionSnapshot};
use crate::geo::Position;
use crate::report::{Pirep, PilotIdentity, ReportError, build_pirep};
use crate::telemetry::Sample;

pub const SAMPLE_QUEUE_SIZE: usize = 1000;
const SNAPSHOT_CHANNEL_SIZE: usize = 64;
const PHASE_EVENT_CHANNEL_SIZE: usize = 64;

/// Shared access to the running session.
///
/// Reset and report building take the same lock as sample updates, so they
/// can never interleave with a half-applied sample.
#[derive(Clone)]
pub struct SessionHandle {
    session: Arc<Mutex<FlightSession>>,
    snapshots: broadcast::Sender<SessionSnapshot>,
    phase_events: broadcast::Sender<PhaseChange>,
}

impl SessionHandle {
    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn subscribe_phase_events(&self) -> broadcast::Receiver<PhaseChange> {
        self.phase_events.subscribe()
    }

    /// Current state as an immutable copy
    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Copy of the flown path for map rendering
    pub async fn track_points(&self) -> Vec<Position> {
        self.session.lock().await.track().points().to_vec()
    }

    /// Discard the session (logout or new flight selection)
    pub async fn reset(&self) {
        self.session.lock().await.reset();
    }

    /// Build a completion report; fails with `InvalidState` before
    /// landed-and-stopped
    pub async fn build_pirep(&self, identity: &PilotIdentity) -> Result<Pirep, ReportError> {
        build_pirep(&*self.session.lock().await, identity)
    }
}

/// Owns the consumer task draining samples into the session
pub struct SessionRunner {
    handle: SessionHandle,
    sample_tx: mpsc::Sender<Sample>,
    task: JoinHandle<()>,
}

impl SessionRunner {
    /// Spawn the update loop for one session.
    ///
    /// The returned sender is the only way samples enter the session, which
    /// keeps them serialized in arrival order.
    pub fn spawn(session: FlightSession) -> Self {
        let (sample_tx, mut sample_rx) = mpsc::channel::<Sample>(SAMPLE_QUEUE_SIZE);
        let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_SIZE);
        let (phase_events, _) = broadcast::channel(PHASE_EVENT_CHANNEL_SIZE);

        let handle = SessionHandle {
            session: Arc::new(Mutex::new(session)),
            snapshots: snapshots.clone(),
            phase_events: phase_events.clone(),
        };

        let session = Arc::clone(&handle.session);
        let task = tokio::spawn(async move {
            while let Some(sample) = sample_rx.recv().await {
                let (event, snapshot) = {
                    let mut session = session.lock().await;
                    let event = session.apply(&sample);
                    (event, session.snapshot())
                };

                if let Some(event) = event {
                    info!("Phase change: {}", event.phase);
                    // No receiver is fine: nobody is watching yet
                    let _ = phase_events.send(event);
                }
                let _ = snapshots.send(snapshot);
            }
            debug!("Sample channel closed, session update loop ending");
        });

        Self {
            handle,
            sample_tx,
            task,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn sample_sender(&self) -> mpsc::Sender<Sample> {
        self.sample_tx.clone()
    }

    /// Close the intake and wait for the loop to drain
    pub async fn shutdown(self) {
        drop(self.sample_tx);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Phase;
    use chrono::{TimeZone, Utc};

    fn sample(lat: f64, lon: f64, phase: Phase, speed: f64) -> Sample {
        Sample {
            position: Some(Position::new(lat, lon)),
            speed_knots: speed,
            altitude_feet: 1000.0,
            heading_degrees: 90.0,
            phase,
            fuel_kg: None,
            received_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_samples_flow_through_to_snapshots() {
        let runner = SessionRunner::spawn(FlightSession::new());
        let handle = runner.handle();
        let mut snapshots = handle.subscribe_snapshots();
        let tx = runner.sample_sender();

        tx.send(sample(42.0, 9.0, Phase::Taxi, 8.0)).await.unwrap();
        let snap = snapshots.recv().await.unwrap();
        assert_eq!(snap.track_points, 1);
        assert_eq!(snap.phase, Some(Phase::Taxi));

        runner.shutdown().await;
        // Handle outlives the runner: the trip survives a producer shutdown
        assert_eq!(handle.snapshot().await.track_points, 1);
    }

    #[tokio::test]
    async fn test_phase_events_are_deduplicated_across_channel() {
        let runner = SessionRunner::spawn(FlightSession::new());
        let handle = runner.handle();
        let mut events = handle.subscribe_phase_events();
        let tx = runner.sample_sender();

        tx.send(sample(42.0, 9.0, Phase::Climb, 150.0)).await.unwrap();
        tx.send(sample(42.01, 9.0, Phase::Climb, 150.0)).await.unwrap();
        tx.send(sample(42.02, 9.0, Phase::Cruise, 240.0)).await.unwrap();
        runner.shutdown().await;

        assert_eq!(events.recv().await.unwrap().phase, Phase::Climb);
        assert_eq!(events.recv().await.unwrap().phase, Phase::Cruise);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reset_through_handle_clears_session() {
        let runner = SessionRunner::spawn(FlightSession::new());
        let handle = runner.handle();
        let tx = runner.sample_sender();

        tx.send(sample(42.0, 9.0, Phase::Cruise, 200.0)).await.unwrap();
        runner.shutdown().await;

        handle.reset().await;
        let snap = handle.snapshot().await;
        assert_eq!(snap.track_points, 0);
        assert_eq!(snap.distance_nm, 0.0);
    }
}
