use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::flight_session::{FlightSession, SessionState};
use crate::telemetry::Phase;

/// Errors raised by the report gate
#[derive(Debug, Error)]
pub enum ReportError {
    /// A report was requested before the flight landed and stopped
    #[error("flight is not ready for reporting (session state {state:?})")]
    InvalidState { state: SessionState },
}

/// Who is filing the report, supplied by the auth/dispatch collaborators at
/// build time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotIdentity {
    pub pilot_id: String,
    pub pilot_name: String,
    /// Assigned flight from the crew center, if the pilot selected one
    pub flight_id: Option<String>,
}

/// A completed-flight report (PIREP), frozen at submission time.
///
/// Built only once the session reached landed-and-stopped; never mutated
/// afterwards. Serialization is the transport's concern, this is the
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pirep {
    pub id: Uuid,
    pub pilot_id: String,
    pub pilot_name: String,
    pub flight_id: Option<String>,
    pub distance_nm: f64,
    pub duration_secs: i64,
    pub max_speed_knots: f64,
    pub max_altitude_feet: f64,
    pub final_phase: Phase,
    pub fuel_remaining_kg: Option<f64>,
    pub completed_at: DateTime<Utc>,
}

/// Package the session's final statistics into an immutable `Pirep`.
///
/// Fails with `InvalidState` unless the session is LandedReady. The session
/// is only read: a failed or retried submission leaves it untouched and the
/// gate stays open.
pub fn build_pirep(
    session: &FlightSession,
    identity: &PilotIdentity,
) -> Result<Pirep, ReportError> {
    if !session.is_report_ready() {
        return Err(ReportError::InvalidState {
            state: session.state(),
        });
    }

    let snapshot = session.snapshot();
    Ok(Pirep {
        id: Uuid::new_v4(),
        pilot_id: identity.pilot_id.clone(),
        pilot_name: identity.pilot_name.clone(),
        flight_id: identity.flight_id.clone(),
        distance_nm: snapshot.distance_nm,
        duration_secs: snapshot.duration_secs,
        max_speed_knots: snapshot.max_speed_knots,
        max_altitude_feet: snapshot.max_altitude_feet,
        final_phase: snapshot.phase.unwrap_or(Phase::Landed),
        fuel_remaining_kg: snapshot.fuel_kg,
        completed_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Position;
    use crate::telemetry::Sample;
    use chrono::{Duration, TimeZone};

    fn identity() -> PilotIdentity {
        PilotIdentity {
            pilot_id: "1042".to_string(),
            pilot_name: "J. Colombani".to_string(),
            flight_id: Some("ACV204".to_string()),
        }
    }

    fn sample(lat: f64, phase: Phase, speed: f64, alt: f64, at: DateTime<Utc>) -> Sample {
        Sample {
            position: Some(Position::new(lat, 9.0)),
            speed_knots: speed,
            altitude_feet: alt,
            heading_degrees: 0.0,
            phase,
            fuel_kg: None,
            received_at: at,
        }
    }

    #[test]
    fn test_build_fails_while_idle() {
        let session = FlightSession::new();
        let err = build_pirep(&session, &identity()).unwrap_err();
        assert!(matches!(
            err,
            ReportError::InvalidState {
                state: SessionState::Idle
            }
        ));
    }

    #[test]
    fn test_build_fails_while_airborne() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut session = FlightSession::new();
        session.apply(&sample(42.0, Phase::Cruise, 240.0, 25000.0, t));

        let err = build_pirep(&session, &identity()).unwrap_err();
        assert!(matches!(
            err,
            ReportError::InvalidState {
                state: SessionState::Active
            }
        ));
    }

    #[test]
    fn test_build_matches_last_snapshot() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut session = FlightSession::new();
        session.apply(&sample(42.0, Phase::Takeoff, 130.0, 800.0, t));
        session.apply(&sample(
            42.3,
            Phase::Cruise,
            260.0,
            27000.0,
            t + Duration::seconds(900),
        ));
        session.apply(&sample(
            42.5,
            Phase::Landed,
            6.0,
            40.0,
            t + Duration::seconds(2700),
        ));

        let snapshot = session.snapshot();
        let pirep = build_pirep(&session, &identity()).unwrap();

        assert_eq!(pirep.distance_nm, snapshot.distance_nm);
        assert_eq!(pirep.duration_secs, snapshot.duration_secs);
        assert_eq!(pirep.max_speed_knots, 260.0);
        assert_eq!(pirep.max_altitude_feet, 27000.0);
        assert_eq!(pirep.final_phase, Phase::Landed);
        assert_eq!(pirep.pilot_id, "1042");
        assert_eq!(pirep.flight_id.as_deref(), Some("ACV204"));

        // Building a report does not consume readiness: a failed submission
        // can be retried
        assert!(session.is_report_ready());
        assert!(build_pirep(&session, &identity()).is_ok());
    }
}
