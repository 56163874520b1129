use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::flight_session::SessionSnapshot;
use crate::geo::Position;
use crate::report::Pirep;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Pilot record returned by the crew center on key verification
#[derive(Debug, Clone, Deserialize)]
pub struct PilotRecord {
    #[serde(deserialize_with = "de_id_string")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ident: Option<String>,
}

impl PilotRecord {
    /// Display name, falling back to the pilot ident then the raw id
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.ident.as_deref())
            .unwrap_or(&self.id)
    }
}

/// A flight assigned to the pilot in the crew center
#[derive(Debug, Clone, Deserialize)]
pub struct AssignedFlight {
    #[serde(deserialize_with = "de_id_string")]
    pub id: String,
    #[serde(default)]
    pub flight_number: Option<String>,
    #[serde(default)]
    pub depicao: Option<String>,
    #[serde(default)]
    pub arricao: Option<String>,
    #[serde(default)]
    pub aircraft: Option<String>,
}

/// One chat message, pilot-to-pilot or an admin broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, alias = "pilot")]
    pub user: String,
    pub text: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Another pilot's aircraft from the live ACARS feed, for the traffic map
#[derive(Debug, Clone, PartialEq)]
pub struct LiveAircraft {
    pub pilot_name: String,
    pub flight_number: Option<String>,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub position: Position,
    pub altitude_feet: Option<f64>,
    pub groundspeed_knots: Option<f64>,
}

/// Live position payload for the crew map ("ACARS update")
#[derive(Debug, Serialize)]
struct AcarsUpdate {
    latitude: f64,
    longitude: f64,
    altitude: f64,
    groundspeed: f64,
    phase: String,
    distance_nm: f64,
}

/// phpVMS ids arrive as numbers or strings depending on the backend version
fn de_id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Pull the pilot record out of a crew-center `user` response.
///
/// phpVMS deployments wrap it differently across versions: `data`, `user`,
/// or the bare record.
fn parse_user_response(value: serde_json::Value) -> Result<PilotRecord> {
    let record = value
        .get("data")
        .or_else(|| value.get("user"))
        .unwrap_or(&value);
    let pilot: PilotRecord = serde_json::from_value(record.clone())
        .context("Unrecognized user response from crew API")?;
    Ok(pilot)
}

/// Pull the assigned-flight list out of a `flights` response
fn parse_flights_response(value: serde_json::Value) -> Result<Vec<AssignedFlight>> {
    let list = value
        .get("flights")
        .or_else(|| value.get("data"))
        .unwrap_or(&value);
    let flights: Vec<AssignedFlight> = serde_json::from_value(list.clone())
        .context("Unrecognized flights response from crew API")?;
    Ok(flights)
}

/// First number found under any of the candidate paths
fn number_at(entry: &serde_json::Value, paths: &[&[&str]]) -> Option<f64> {
    paths.iter().find_map(|path| {
        let mut node = entry;
        for key in *path {
            node = node.get(key)?;
        }
        node.as_f64()
    })
}

/// First string found under any of the candidate paths
fn string_at(entry: &serde_json::Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        let mut node = entry;
        for key in *path {
            node = node.get(key)?;
        }
        node.as_str().map(str::to_string)
    })
}

/// Pull the live aircraft list out of an `acars` response.
///
/// Backends differ in both the envelope (`data`, `flights`, `acars`, or a
/// bare list) and in where each entry keeps its position, so every known
/// layout is probed. Entries without a usable fix are skipped.
fn parse_acars_response(value: &serde_json::Value) -> Vec<LiveAircraft> {
    let list = value
        .get("data")
        .or_else(|| value.get("flights"))
        .or_else(|| value.get("acars"))
        .unwrap_or(value);
    let Some(entries) = list.as_array() else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let latitude = number_at(
                entry,
                &[
                    &["position", "lat"],
                    &["latitude"],
                    &["lat"],
                    &["last_position", "lat"],
                ],
            )?;
            let longitude = number_at(
                entry,
                &[
                    &["position", "lon"],
                    &["longitude"],
                    &["lon"],
                    &["last_position", "lon"],
                ],
            )?;
            if latitude == 0.0 || longitude == 0.0 {
                return None;
            }
            Some(LiveAircraft {
                pilot_name: string_at(entry, &[&["user", "name_private"], &["user", "name"]])
                    .unwrap_or_else(|| "Pilot".to_string()),
                flight_number: string_at(entry, &[&["flight", "flight_number"], &["flight_number"]]),
                departure: string_at(entry, &[&["flight", "dpt_airport_id"], &["depicao"]]),
                arrival: string_at(entry, &[&["flight", "arr_airport_id"], &["arricao"]]),
                position: Position::new(latitude, longitude),
                altitude_feet: number_at(entry, &[&["position", "altitude"], &["altitude"]]),
                groundspeed_knots: number_at(entry, &[&["position", "groundspeed"], &["groundspeed"]]),
            })
        })
        .collect()
}

/// Client for the crew-management HTTP API
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn get_json(&self, endpoint: &str) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(self.url(endpoint))
            .header("X-API-KEY", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("Failed to reach crew API endpoint {}", endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Crew API error {} on {}: {}", status, endpoint, body));
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse crew API response from {}", endpoint))
    }

    async fn post_json<T: Serialize + ?Sized>(&self, endpoint: &str, payload: &T) -> Result<()> {
        let start = std::time::Instant::now();
        let response = self
            .client
            .post(self.url(endpoint))
            .header("X-API-KEY", &self.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to reach crew API endpoint {}", endpoint))?;

        metrics::histogram!("api.post_duration_ms")
            .record(start.elapsed().as_micros() as f64 / 1000.0);

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Crew API error {} on {}: {}", status, endpoint, body));
        }
        Ok(())
    }

    /// Verify the stored API key and return the pilot it belongs to
    pub async fn verify_key(&self) -> Result<PilotRecord> {
        let value = self.get_json("user").await?;
        let pilot = parse_user_response(value)?;
        info!("Authenticated as {} (id {})", pilot.display_name(), pilot.id);
        metrics::counter!("api.auth.verified_total").increment(1);
        Ok(pilot)
    }

    /// Flights currently assigned to the pilot in the crew center
    pub async fn assigned_flights(&self) -> Result<Vec<AssignedFlight>> {
        let value = self.get_json("flights").await?;
        let flights = parse_flights_response(value)?;
        debug!("Fetched {} assigned flights", flights.len());
        Ok(flights)
    }

    /// Best-effort live position update for the crew map.
    ///
    /// Skipped silently when the session has no fix yet.
    pub async fn send_position(&self, snapshot: &SessionSnapshot) -> Result<()> {
        let Some(position) = snapshot.last_position else {
            return Ok(());
        };
        let payload = AcarsUpdate {
            latitude: position.latitude,
            longitude: position.longitude,
            altitude: snapshot.altitude_feet,
            groundspeed: snapshot.speed_knots,
            phase: snapshot
                .phase
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_default(),
            distance_nm: snapshot.distance_nm,
        };
        self.post_json("acars/update", &payload).await?;
        metrics::counter!("api.position_updates_total").increment(1);
        Ok(())
    }

    /// Submit a completed-flight report
    pub async fn submit_pirep(&self, pirep: &Pirep) -> Result<()> {
        self.post_json("pireps", pirep).await?;
        info!(
            "PIREP {} submitted ({:.1} nm, {} s)",
            pirep.id, pirep.distance_nm, pirep.duration_secs
        );
        metrics::counter!("api.pireps_submitted_total").increment(1);
        Ok(())
    }

    /// Other pilots currently flying, for the traffic layer of the map
    pub async fn live_traffic(&self) -> Result<Vec<LiveAircraft>> {
        let value = self.get_json("acars").await?;
        let traffic = parse_acars_response(&value);
        debug!("Live ACARS feed lists {} aircraft", traffic.len());
        Ok(traffic)
    }

    /// Fetch the pilot chat messages
    pub async fn chat_list(&self) -> Result<Vec<ChatMessage>> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            messages: Vec<ChatMessage>,
        }
        let value = self.get_json("chat/list").await?;
        let envelope: Envelope =
            serde_json::from_value(value).context("Unrecognized chat response from crew API")?;
        Ok(envelope.messages)
    }

    /// Send a chat message
    pub async fn chat_send(&self, text: &str) -> Result<()> {
        #[derive(Serialize)]
        struct Outgoing<'a> {
            message: &'a str,
        }
        self.post_json("chat/send", &Outgoing { message: text }).await
    }

    /// Fetch admin broadcasts; absent endpoint is treated as "no broadcasts"
    pub async fn broadcasts(&self) -> Result<Vec<ChatMessage>> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            broadcasts: Vec<ChatMessage>,
        }
        match self.get_json("broadcasts").await {
            Ok(value) => {
                if let Ok(list) = serde_json::from_value::<Vec<ChatMessage>>(value.clone()) {
                    return Ok(list);
                }
                let envelope: Envelope = serde_json::from_value(value)
                    .context("Unrecognized broadcasts response from crew API")?;
                Ok(envelope.broadcasts)
            }
            Err(e) => {
                warn!("Broadcast fetch failed (continuing without): {}", e);
                Ok(Vec::new())
            }
        }
    }
}
