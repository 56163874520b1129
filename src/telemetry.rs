use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::geo::Position;

/// Coarse flight-state tag reported by the simulator bridge.
///
/// Unrecognized tags are preserved as `Other` so a newer bridge can ship
/// phases this client does not know about without breaking tracking; they
/// are display-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Phase {
    Parked,
    Taxi,
    Takeoff,
    Climb,
    Cruise,
    Descent,
    Approach,
    Landed,
    Other(String),
}

impl Phase {
    /// Parse a bridge phase tag. Matching is case-insensitive; unknown tags
    /// pass through uppercased.
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_uppercase().as_str() {
            "PARKED" => Phase::Parked,
            "TAXI" => Phase::Taxi,
            "TAKEOFF" => Phase::Takeoff,
            "CLIMB" => Phase::Climb,
            "CRUISE" => Phase::Cruise,
            "DESCENT" => Phase::Descent,
            "APPROACH" => Phase::Approach,
            "LANDED" => Phase::Landed,
            other => Phase::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Phase::Parked => "PARKED",
            Phase::Taxi => "TAXI",
            Phase::Takeoff => "TAKEOFF",
            Phase::Climb => "CLIMB",
            Phase::Cruise => "CRUISE",
            Phase::Descent => "DESCENT",
            Phase::Approach => "APPROACH",
            Phase::Landed => "LANDED",
            Phase::Other(tag) => tag,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for Phase {
    fn from(tag: String) -> Self {
        Phase::from_tag(&tag)
    }
}

impl From<Phase> for String {
    fn from(phase: Phase) -> Self {
        phase.as_str().to_string()
    }
}

/// One telemetry frame as the bridge sends it over the wire.
///
/// Every field is optional: bridges differ in what they can read from the
/// simulator, and a frame with holes must still be usable for display.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTelemetry {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub airspeed: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub vertical_speed: Option<f64>,
    /// SimConnect reports this as a numeric flag, some bridges as a bool
    #[serde(default, deserialize_with = "de_loose_bool")]
    pub on_ground: Option<bool>,
    #[serde(default, alias = "fuel_total")]
    pub fuel: Option<f64>,
    #[serde(default)]
    pub phase: Option<String>,
    /// Set by the bridge when the simulator is not reachable
    #[serde(default)]
    pub error: Option<String>,
}

/// Accept `true`/`false`, `1`/`0`, or `1.0`/`0.0` for boolean simulator flags
fn de_loose_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::Number(n)) => Some(n.as_f64().unwrap_or(0.0) != 0.0),
        _ => None,
    })
}

/// A normalized telemetry reading, ready for the session state machine.
///
/// `position` is `None` when the frame carried no usable fix (missing or
/// exactly-zero latitude/longitude). Such a sample still updates the
/// displayed speed/altitude/phase but never extends the track or the
/// cumulative distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub position: Option<Position>,
    pub speed_knots: f64,
    pub altitude_feet: f64,
    pub heading_degrees: f64,
    pub phase: Phase,
    /// `None` means the bridge did not report fuel; zero is a real reading
    pub fuel_kg: Option<f64>,
    pub received_at: DateTime<Utc>,
}

impl Sample {
    /// Normalize a raw bridge frame into a `Sample`.
    ///
    /// Missing speed/altitude/heading default to zero. Fuel stays unknown
    /// when unreported. A missing phase tag is derived from the raw flight
    /// parameters the same way the bridge itself derives it.
    pub fn from_raw(raw: &RawTelemetry, received_at: DateTime<Utc>) -> Self {
        let position = match (raw.latitude, raw.longitude) {
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0 => Some(Position::new(lat, lon)),
            _ => None,
        };

        let phase = match raw.phase.as_deref() {
            Some(tag) => Phase::from_tag(tag),
            None => derive_phase(raw),
        };

        Self {
            position,
            speed_knots: raw.airspeed.unwrap_or(0.0).max(0.0),
            altitude_feet: raw.altitude.unwrap_or(0.0),
            heading_degrees: raw.heading.unwrap_or(0.0).rem_euclid(360.0),
            phase,
            fuel_kg: raw.fuel,
            received_at,
        }
    }

    /// True when this sample carries a usable fix
    pub fn has_valid_fix(&self) -> bool {
        self.position.is_some()
    }
}

/// Derive a flight phase from raw parameters when the bridge did not tag one.
///
/// Mirrors the bridge's own derivation: on the ground the aircraft is LANDED
/// below 10 knots and TAXI otherwise; airborne it is TAKEOFF below 2000 ft,
/// then CLIMB/DESCENT past 500 fpm, else CRUISE. Without an on-ground flag
/// there is nothing to derive from and the sample stays PARKED, which never
/// starts the session clock.
fn derive_phase(raw: &RawTelemetry) -> Phase {
    let airspeed = raw.airspeed.unwrap_or(0.0);
    let altitude = raw.altitude.unwrap_or(0.0);
    let vertical_speed = raw.vertical_speed.unwrap_or(0.0);

    match raw.on_ground {
        Some(true) => {
            if airspeed < 10.0 {
                Phase::Landed
            } else {
                Phase::Taxi
            }
        }
        Some(false) => {
            if altitude < 2000.0 {
                Phase::Takeoff
            } else if vertical_speed > 500.0 {
                Phase::Climb
            } else if vertical_speed < -500.0 {
                Phase::Descent
            } else {
                Phase::Cruise
            }
        }
        None => Phase::Parked,
    }
}
