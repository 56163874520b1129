//! VACARS - ACARS companion library for virtual airline pilots
//!
//! Tracks one flight at a time from live simulator-bridge telemetry and
//! files completion reports (PIREPs) against a crew-management API.

pub mod api_client;
pub mod auth;
pub mod bridge_client;
pub mod chat;
pub mod commands;
pub mod config;
pub mod flight_session;
pub mod geo;
pub mod log_format;
pub mod report;
pub mod session_runner;
pub mod telemetry;

pub use api_client::{ApiClient, AssignedFlight, ChatMessage, LiveAircraft, PilotRecord};
pub use config::AppConfig;
pub use flight_session::{FlightSession, PhaseChange, SessionSnapshot, SessionState, Track};
pub use geo::{Position, haversine_nm};
pub use report::{Pirep, PilotIdentity, ReportError, build_pirep};
pub use session_runner::{SessionHandle, SessionRunner};
pub use telemetry::{Phase, RawTelemetry, Sample};
