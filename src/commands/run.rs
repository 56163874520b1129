use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::api_client::ApiClient;
use crate::auth::CredentialStore;
use crate::bridge_client::BridgeClient;
use crate::config::AppConfig;
use crate::chat::ChatService;
use crate::flight_session::{FlightSession, format_duration};
use crate::report::PilotIdentity;
use crate::session_runner::SessionRunner;

/// Refresh cadence for other pilots' positions on the traffic layer
const TRAFFIC_POLL_SECS: u64 = 15;

/// Run the companion: connect to the crew API and the simulator bridge,
/// track the flight, and file the PIREP once landed and stopped.
pub async fn handle_run(
    config: &AppConfig,
    store: &CredentialStore,
    flight_id: Option<String>,
    no_submit: bool,
) -> Result<()> {
    let api_key = store
        .load()?
        .context("No stored API key; run `vacars login <api-key>` first")?;
    let api = ApiClient::new(&config.api_base_url, &api_key);

    let pilot = api.verify_key().await?;
    let identity = PilotIdentity {
        pilot_id: pilot.id.clone(),
        pilot_name: pilot.display_name().to_string(),
        flight_id: flight_id.clone(),
    };

    match api.assigned_flights().await {
        Ok(flights) if flights.is_empty() => info!("No assigned flights in the crew center"),
        Ok(flights) => {
            for flight in &flights {
                info!(
                    "Assigned flight {} {} -> {} ({})",
                    flight.flight_number.as_deref().unwrap_or("?"),
                    flight.depicao.as_deref().unwrap_or("--"),
                    flight.arricao.as_deref().unwrap_or("--"),
                    flight.aircraft.as_deref().unwrap_or("--"),
                );
            }
            if let Some(id) = &flight_id
                && !flights.iter().any(|f| &f.id == id)
            {
                warn!("Flight {} is not in the assigned list, reporting it anyway", id);
            }
        }
        Err(e) => warn!("Could not fetch assigned flights: {}", e),
    }

    let session = FlightSession::with_thresholds(
        config.low_speed_threshold_kts,
        config.max_segment_nm,
    );
    let runner = SessionRunner::spawn(session);
    let handle = runner.handle();

    let bridge = BridgeClient::new(
        &config.bridge_url(),
        config.reconnect_delay_secs,
        runner.sample_sender(),
    );
    let bridge_task = tokio::spawn(bridge.run());

    // Other pilots on the network, refreshed like the map's traffic layer
    let traffic_api = api.clone();
    let traffic_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TRAFFIC_POLL_SECS));
        loop {
            interval.tick().await;
            match traffic_api.live_traffic().await {
                Ok(traffic) => {
                    for aircraft in &traffic {
                        debug!(
                            "Traffic: {} {} at {:.3},{:.3}",
                            aircraft.pilot_name,
                            aircraft.flight_number.as_deref().unwrap_or("--"),
                            aircraft.position.latitude,
                            aircraft.position.longitude,
                        );
                    }
                }
                Err(e) => debug!("Live traffic fetch failed: {}", e),
            }
        }
    });

    let (mut chat_rx, chat_task) = ChatService::new(api.clone(), config.chat_poll_secs).start();
    let chat_log = tokio::spawn(async move {
        while let Ok(messages) = chat_rx.recv().await {
            for message in messages.iter().filter(|m| m.is_admin) {
                info!("Broadcast from {}: {}", message.user, message.text);
            }
        }
    });

    // Periodic live position updates; once landed-and-stopped, file the
    // PIREP on the same cadence until it goes through
    let update_handle = handle.clone();
    let update_api = api.clone();
    let update_identity = identity.clone();
    // The update cadence also drives report submission retries
    let update_secs = config.acars_update_secs.max(5);
    let update_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(update_secs));
        interval.tick().await;
        let mut submitted = false;

        loop {
            interval.tick().await;
            let snapshot = update_handle.snapshot().await;

            if let Err(e) = update_api.send_position(&snapshot).await {
                warn!("Position update failed: {}", e);
            }

            if snapshot.report_ready && !submitted && !no_submit {
                match update_handle.build_pirep(&update_identity).await {
                    Ok(pirep) => match update_api.submit_pirep(&pirep).await {
                        Ok(()) => {
                            info!(
                                "Flight complete: {:.1} nm in {}",
                                pirep.distance_nm,
                                format_duration(pirep.duration_secs)
                            );
                            submitted = true;
                        }
                        // Session stays LandedReady; retry next tick
                        Err(e) => warn!("PIREP submission failed (will retry): {}", e),
                    },
                    Err(e) => error!("Report gate refused: {}", e),
                }
            }
        }
    });

    info!("Tracking started; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");

    update_task.abort();
    traffic_task.abort();
    chat_task.abort();
    chat_log.abort();
    bridge_task.abort();
    runner.shutdown().await;

    let snapshot = handle.snapshot().await;
    info!(
        "Session summary: {:.1} nm, duration {}, max {:.0} kts / {:.0} ft, {} track points",
        snapshot.distance_nm,
        format_duration(snapshot.duration_secs),
        snapshot.max_speed_knots,
        snapshot.max_altitude_feet,
        snapshot.track_points,
    );

    Ok(())
}
