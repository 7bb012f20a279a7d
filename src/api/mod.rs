//! HTTP API for controlling capture and retrieving frames

mod report;

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::capture::{CaptureController, CaptureFilter, ChannelSpec};

pub use report::PacketReport;

/// Shared application state
pub struct AppState {
    pub controller: Arc<CaptureController>,
    /// Frames returned per `/api/sniff/packets` call
    pub drain_batch: usize,
}

/// Build the HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/sniff/start", get(start_capture))
        .route("/api/sniff/stop", get(stop_capture))
        .route("/api/sniff/packets", get(get_packets))
        .route("/api/sniff/status", get(get_status))
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Query parameters for the start endpoint
#[derive(Debug, Deserialize)]
struct StartParams {
    channel: Option<String>,
    filter: Option<String>,
}

fn error_reply(message: impl Into<String>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "error",
        "message": message.into(),
    }))
}

/// Start (or restart) packet capture
async fn start_capture(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StartParams>,
) -> impl IntoResponse {
    let channel = match params.channel.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(raw) => match raw.parse::<i64>() {
            Ok(channel) => channel,
            Err(_) => {
                warn!("Rejected start request with channel {:?}", raw);
                return error_reply(format!("Invalid channel '{}'", raw));
            }
        },
    };

    let spec = match ChannelSpec::from_number(channel) {
        Ok(spec) => spec,
        Err(e) => {
            warn!("Rejected start request: {}", e);
            return error_reply(e.to_string());
        }
    };
    let filter = CaptureFilter::from_name(params.filter.as_deref().unwrap_or("all"));

    info!("Starting packet sniffer on {} with filter {}", spec, filter);
    match state.controller.start(spec, filter).await {
        Ok(started) => {
            if started.restarted {
                info!("Replaced the running capture with session {}", started.session_id);
            }
            Json(serde_json::json!({
                "status": "success",
                "channel": started.channel.number(),
                "filter": started.filter.name(),
                "message": "Packet capture started",
            }))
        }
        Err(e) => {
            error!("Failed to start packet capture: {}", e);
            error_reply("Failed to start packet capture")
        }
    }
}

/// Stop packet capture
async fn stop_capture(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Stopping packet sniffer");
    match state.controller.stop().await {
        Ok(_) => Json(serde_json::json!({
            "status": "success",
            "message": "Packet capture stopped",
        })),
        Err(e) => error_reply(e.to_string()),
    }
}

/// Drain a batch of captured frames
async fn get_packets(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let packets: Vec<PacketReport> = state
        .controller
        .drain(state.drain_batch)
        .iter()
        .map(PacketReport::from_record)
        .collect();

    Json(serde_json::json!({ "packets": packets }))
}

/// Session snapshot and counters
async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SchedulerTiming;
    use crate::radio::sim::build_frame;
    use crate::radio::SimulatedRadio;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn setup(drain_batch: usize) -> (Arc<SimulatedRadio>, Router) {
        let radio = Arc::new(SimulatedRadio::new());
        let controller = Arc::new(CaptureController::new(
            radio.clone(),
            SchedulerTiming::default(),
        ));
        let app = router(Arc::new(AppState {
            controller,
            drain_batch,
        }));
        (radio, app)
    }

    async fn get_json(app: &Router, uri: &str) -> Value {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn beacon() -> Vec<u8> {
        build_frame(
            0x0080,
            [0xff; 6],
            [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
            [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
            &[0u8; 12],
        )
    }

    fn assoc_req() -> Vec<u8> {
        build_frame(0x0000, [0x02; 6], [0x04; 6], [0x02; 6], &[0u8; 4])
    }

    #[tokio::test]
    async fn test_health() {
        let (_radio, app) = setup(10);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_defaults_to_hopping_all() {
        let (_radio, app) = setup(10);

        let reply = get_json(&app, "/api/sniff/start").await;
        assert_eq!(
            reply,
            serde_json::json!({
                "status": "success",
                "channel": 0,
                "filter": "all",
                "message": "Packet capture started",
            })
        );

        let status = get_json(&app, "/api/sniff/status").await;
        assert_eq!(status["state"], "running");
        assert_eq!(status["channel"]["mode"], "hopping");
        assert_eq!(status["filter"], "all");
        assert_eq!(status["backend"], "simulated");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_filter_selects_all() {
        let (_radio, app) = setup(10);
        let reply = get_json(&app, "/api/sniff/start?channel=3&filter=bogus").await;
        assert_eq!(reply["status"], "success");
        assert_eq!(reply["channel"], 3);
        assert_eq!(reply["filter"], "all");
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_channel_rejected() {
        let (radio, app) = setup(10);

        let reply = get_json(&app, "/api/sniff/start?channel=14").await;
        assert_eq!(reply["status"], "error");
        assert!(reply["message"].as_str().unwrap().contains("Invalid channel"));

        let reply = get_json(&app, "/api/sniff/start?channel=six").await;
        assert_eq!(reply["status"], "error");

        assert!(!radio.is_promiscuous());
        let status = get_json(&app, "/api/sniff/status").await;
        assert_eq!(status["state"], "idle");
    }

    #[tokio::test(start_paused = true)]
    async fn test_beacon_capture_round_trip() {
        let (radio, app) = setup(10);

        let reply = get_json(&app, "/api/sniff/start?channel=6&filter=beacon").await;
        assert_eq!(reply["filter"], "beacon");
        tokio::time::sleep(Duration::from_millis(1)).await;

        radio.deliver(&assoc_req(), -70);
        radio.deliver(&beacon(), -45);

        let reply = get_json(&app, "/api/sniff/packets").await;
        let packets = reply["packets"].as_array().unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0]["type"], "BEACON");
        assert_eq!(packets[0]["src"], "00:11:22:33:44:55");
        assert_eq!(packets[0]["dst"], "ff:ff:ff:ff:ff:ff");
        assert_eq!(packets[0]["channel"], 6);
        assert_eq!(packets[0]["rssi"], -45);
        assert!(packets[0]["data"].as_str().unwrap().starts_with("80 00 00 00 "));

        let reply = get_json(&app, "/api/sniff/packets").await;
        assert_eq!(reply["packets"].as_array().unwrap().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_packets_drain_in_batches() {
        let (radio, app) = setup(10);
        get_json(&app, "/api/sniff/start?channel=1").await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        for _ in 0..15 {
            radio.deliver(&beacon(), -50);
        }

        let sizes = [10, 5, 0];
        for expected in sizes {
            let reply = get_json(&app, "/api/sniff/packets").await;
            assert_eq!(reply["packets"].as_array().unwrap().len(), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_replies() {
        let (radio, app) = setup(10);

        let reply = get_json(&app, "/api/sniff/stop").await;
        assert_eq!(
            reply,
            serde_json::json!({"status": "error", "message": "Sniffer was not running"})
        );

        get_json(&app, "/api/sniff/start?channel=11").await;
        let reply = get_json(&app, "/api/sniff/stop").await;
        assert_eq!(
            reply,
            serde_json::json!({"status": "success", "message": "Packet capture stopped"})
        );
        assert!(!radio.is_promiscuous());

        // nothing is returned once stopped
        let reply = get_json(&app, "/api/sniff/packets").await;
        assert_eq!(reply["packets"].as_array().unwrap().len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_failure_reply() {
        let (radio, app) = setup(10);
        radio.fail_promiscuous(Some(0x3002));

        let reply = get_json(&app, "/api/sniff/start?channel=6").await;
        assert_eq!(
            reply,
            serde_json::json!({"status": "error", "message": "Failed to start packet capture"})
        );
    }
}
