//! WebSocket client for the local simulator bridge.
//!
//! The bridge is a separate process that reads live simulator state
//! (SimConnect, X-Plane, FSUIPC) and serves JSON telemetry frames on a local
//! WebSocket. This client connects, normalizes every frame into a `Sample`,
//! and pushes it into the session queue. It reconnects forever with
//! exponential backoff: a simulator restart must not kill the trip in
//! progress.

use chrono::Utc;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, info, trace, warn};

use crate::telemetry::{RawTelemetry, Sample};

const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Parse one bridge frame; malformed frames are dropped, never fatal
pub(crate) fn parse_frame(text: &str) -> Option<RawTelemetry> {
    match serde_json::from_str::<RawTelemetry>(text) {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!("Dropping malformed bridge frame: {}", e);
            metrics::counter!("bridge.frames_malformed_total").increment(1);
            None
        }
    }
}

/// Connects to the simulator bridge and feeds the session sample queue
pub struct BridgeClient {
    url: String,
    initial_delay: Duration,
    sample_tx: mpsc::Sender<Sample>,
}

impl BridgeClient {
    pub fn new(url: &str, reconnect_delay_secs: u64, sample_tx: mpsc::Sender<Sample>) -> Self {
        Self {
            url: url.to_string(),
            initial_delay: Duration::from_secs(reconnect_delay_secs.max(1)),
            sample_tx,
        }
    }

    /// Run until the sample queue is closed.
    ///
    /// Connection loss only pauses intake; the session keeps its state and
    /// tracking resumes with the next frame after reconnect.
    pub async fn run(self) {
        let mut delay = self.initial_delay;

        loop {
            match connect_async(self.url.as_str()).await {
                Ok((ws_stream, _)) => {
                    info!("Connected to simulator bridge at {}", self.url);
                    metrics::gauge!("bridge.connected").set(1.0);
                    metrics::counter!("bridge.connects_total").increment(1);
                    delay = self.initial_delay;

                    let intake_open = self.read_frames(ws_stream).await;
                    metrics::gauge!("bridge.connected").set(0.0);
                    if !intake_open {
                        info!("Sample queue closed, stopping bridge client");
                        return;
                    }
                    warn!("Bridge connection lost, reconnecting in {:?}", delay);
                }
                Err(e) => {
                    debug!("Bridge not reachable at {} ({}), retrying in {:?}", self.url, e, delay);
                    metrics::counter!("bridge.connect_failures_total").increment(1);
                }
            }

            if self.sample_tx.is_closed() {
                return;
            }
            tokio::time::sleep(delay).await;
            delay = std::cmp::min(delay * 2, MAX_RECONNECT_DELAY);
        }
    }

    /// Drain frames from one connection. Returns false when the sample
    /// queue is closed and the client should stop entirely.
    async fn read_frames(
        &self,
        mut ws_stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> bool {
        while let Some(message) = ws_stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    let Some(raw) = parse_frame(&text) else {
                        continue;
                    };
                    if let Some(error) = &raw.error {
                        warn!("Bridge reports simulator error: {}", error);
                        continue;
                    }

                    let sample = Sample::from_raw(&raw, Utc::now());
                    trace!(
                        "Bridge frame: phase {} speed {:.0} kts fix {}",
                        sample.phase,
                        sample.speed_knots,
                        sample.has_valid_fix()
                    );
                    metrics::counter!("bridge.frames_received_total").increment(1);

                    if self.sample_tx.send(sample).await.is_err() {
                        return false;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Bridge closed the connection");
                    break;
                }
                // Pings are answered by the protocol layer; binary frames
                // are not part of the bridge contract
                Ok(_) => {}
                Err(e) => {
                    warn!("Bridge read error: {}", e);
                    break;
                }
            }
        }
        !self.sample_tx.is_closed()
    }
}
