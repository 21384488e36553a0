/**
 * API REST SURAXIT - Serveur HTTP de la passerelle
 *
 * RÔLE :
 * Interface entre le matériel (pushs capteur, nœuds mesh), le dashboard
 * (polling) et les actions de démo (blackout, chute simulée).
 *
 * FONCTIONNEMENT :
 * - Routes Axum : /api/health, /api/sensors, /api/predict,
 *   /api/mesh/{heartbeat,status}, /api/emergency/{relay,history},
 *   /api/simulate/{blackout,fall}
 * - L'heure est lue une fois par requête (Clock) puis passée aux stores
 * - Les corps sont lus en octets et parsés en JSON quel que soit le
 *   Content-Type (le firmware n'en envoie pas toujours)
 * - CORS permissif : le dashboard est servi depuis une autre origine
 */

use crate::clock::{round_to, unix_seconds, SharedClock};
use crate::error::GatewayResult;
use crate::hardware::{Freshness, DASHBOARD_MAX_AGE};
use crate::health::{GatewayHealth, HealthTracker};
use crate::ingest::{blackout_duration, parse_payload, GatewayStatus, IngestGateway};
use crate::mesh::BlackoutTransition;
use crate::predictor::{assess, classify_activity, spo2_status};
use crate::simulator::SensorSimulator;
use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use time::OffsetDateTime;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub ingest: IngestGateway,
    pub health_tracker: HealthTracker,
    pub clock: SharedClock,
    pub simulator: Arc<SensorSimulator>,
    pub default_blackout_secs: f64,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", post(push_sensor_data))
        .route("/api/health", get(get_health))
        .route("/api/sensors", get(get_sensor_data))
        .route("/api/sensors/push", post(push_sensor_data))
        .route("/api/predict", get(predict))
        .route("/api/emergency/relay", post(emergency_relay))
        .route("/api/emergency/history", get(emergency_history))
        .route("/api/mesh/heartbeat", post(mesh_heartbeat))
        .route("/api/mesh/status", get(mesh_status))
        .route("/api/simulate/blackout", post(simulate_blackout))
        .route("/api/simulate/fall", post(simulate_fall))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn get_health(State(app): State<AppState>) -> Json<GatewayHealth> {
    let mesh = app.ingest.mesh();
    Json(app.health_tracker.get_health(app.ingest.predictor().as_ref(), mesh))
}

async fn get_sensor_data(State(app): State<AppState>) -> Json<Value> {
    let now = app.clock.now();
    let reading = match app.ingest.latest_reading(DASHBOARD_MAX_AGE, now) {
        Freshness::Fresh(reading) => reading,
        Freshness::Stale { push_count } => return Json(waiting_payload(push_count, now)),
        Freshness::NeverReceived => return Json(waiting_payload(0, now)),
    };

    let fields = &reading.fields;
    let accel = fields.acceleration();
    let spo2 = fields.number("spo2") as i64;
    let heart_rate = fields.number("hr") as i64;
    let fall = assess(app.ingest.predictor().as_ref(), accel);
    let mesh = app.ingest.mesh().snapshot(now);

    Json(json!({
        "data_source": "hardware",
        "spo2": { "value": spo2, "status": spo2_status(spo2), "unit": "%" },
        "heart_rate": { "value": heart_rate, "unit": "bpm" },
        "accelerometer": {
            "x": round_to(accel.x, 4),
            "y": round_to(accel.y, 4),
            "z": round_to(accel.z, 4),
            "magnitude": round_to(fall.magnitude, 4),
            "activity": classify_activity(fall.magnitude),
        },
        "fall_detection": {
            "probability": fall.probability,
            "detected": fall.detected,
            "status": if fall.detected { "Fall Detected!" } else { "No Falls" },
            "sensitivity": "High",
        },
        "mesh": {
            "active": mesh.mesh_active,
            "blackout": mesh.blackout_mode,
            "node_count": mesh.nodes.len(),
        },
        "timestamp": unix_seconds(now),
    }))
}

fn waiting_payload(push_count: u64, now: OffsetDateTime) -> Value {
    json!({
        "data_source": "waiting",
        "hardware_online": false,
        "message": "No sensor data received yet. Waiting for hardware...",
        "push_count": push_count,
        "timestamp": unix_seconds(now),
    })
}

async fn predict(State(app): State<AppState>) -> Json<Value> {
    let reading = app.simulator.reading(app.clock.now());
    let fall = assess(app.ingest.predictor().as_ref(), reading.accelerometer);
    Json(json!({
        "fall_probability": fall.probability,
        "fall_detected": fall.detected,
        "accelerometer": reading.accelerometer,
    }))
}

async fn push_sensor_data(State(app): State<AppState>, body: Bytes) -> GatewayResult<Json<Value>> {
    let accepted = app.ingest.push_body(&body, app.clock.now())?;
    Ok(Json(json!({
        "status": "ok",
        "push_count": accepted.push_count,
        "fall_probability": accepted.fall.probability,
        "fall_detected": accepted.fall.detected,
    })))
}

async fn emergency_relay(State(app): State<AppState>, body: Bytes) -> GatewayResult<Json<Value>> {
    let payload = parse_payload(&body)?;
    let recorded = app.ingest.relay_emergency(payload, app.clock.now());
    Ok(Json(json!({
        "status": "received",
        "emergency_id": recorded.sequence,
        "chain_reference": recorded.event.chain_reference,
        "message": "Emergency relayed — Orphan Transaction path",
    })))
}

async fn mesh_heartbeat(State(app): State<AppState>, body: Bytes) -> GatewayResult<Json<Value>> {
    let payload = parse_payload(&body)?;
    app.ingest.heartbeat(&payload, app.clock.now());
    Ok(Json(json!({ "status": "ok" })))
}

async fn mesh_status(State(app): State<AppState>) -> Json<GatewayStatus> {
    Json(app.ingest.status(app.clock.now()))
}

async fn emergency_history(State(app): State<AppState>) -> Json<Value> {
    let snapshot = app.ingest.mesh().snapshot(app.clock.now());
    Json(json!({
        "total": snapshot.total_emergencies,
        "events": snapshot.recent_emergencies,
    }))
}

async fn simulate_blackout(State(app): State<AppState>, body: Bytes) -> Json<Value> {
    // corps optionnel : `{}` ou vide = durée par défaut
    let requested = serde_json::from_slice::<Value>(&body).ok();
    let duration = blackout_duration(requested.as_ref().and_then(|v| v.get("duration")), app.default_blackout_secs);

    match app.ingest.toggle_blackout(duration, app.clock.now()) {
        BlackoutTransition::Started { .. } => Json(json!({
            "status": "started",
            "blackout": true,
            "duration": duration,
            "message": format!("Server will reject sensor pushes for {duration}s"),
        })),
        BlackoutTransition::Stopped => Json(json!({ "status": "stopped", "blackout": false })),
    }
}

async fn simulate_fall(State(app): State<AppState>) -> Json<Value> {
    app.ingest.inject_fall(app.clock.now());
    Json(json!({
        "status": "fall_simulated",
        "message": "Injected fall data — dashboard will show alert on next poll",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::hardware::HardwareFreshnessStore;
    use crate::mesh::MeshRegistry;
    use crate::predictor::ThresholdPredictor;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use time::macros::datetime;
    use time::Duration;
    use tower::ServiceExt;

    fn test_app() -> (Router, Arc<ManualClock>) {
        test_app_with_blackout_default(30.0)
    }

    fn test_app_with_blackout_default(default_blackout_secs: f64) -> (Router, Arc<ManualClock>) {
        let start = datetime!(2025-03-01 10:00:00 UTC);
        let clock = Arc::new(ManualClock::new(start));
        let ingest = IngestGateway::new(
            Arc::new(MeshRegistry::new()),
            Arc::new(HardwareFreshnessStore::new()),
            Arc::new(ThresholdPredictor),
        );
        let state = AppState {
            ingest,
            health_tracker: HealthTracker::new(),
            clock: clock.clone(),
            simulator: Arc::new(SensorSimulator::with_seed(start, 42)),
            default_blackout_secs,
        };
        (build_router(state), clock)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_route() {
        let (app, _) = test_app();
        let (status, body) = call(&app, "GET", "/api/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model_loaded"], false);
        assert_eq!(body["predictor"], "threshold");
    }

    #[tokio::test]
    async fn test_empty_heartbeat_is_rejected() {
        let (app, _) = test_app();
        let (status, body) = call(&app, "POST", "/api/mesh/heartbeat", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid JSON");

        let (status, _) = call(&app, "POST", "/api/mesh/heartbeat", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_push_then_dashboard() {
        let (app, clock) = test_app();
        let (_, body) = call(&app, "GET", "/api/sensors", "").await;
        assert_eq!(body["data_source"], "waiting");
        assert_eq!(body["push_count"], 0);

        // pas de Content-Type : parsé quand même
        let (status, body) = call(
            &app,
            "POST",
            "/api/sensors/push",
            r#"{"ax":0.5,"ay":-1.8,"az":3.2,"hr":110.7,"spo2":88}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["push_count"], 1);
        assert_eq!(body["fall_probability"], 0.85);
        assert_eq!(body["fall_detected"], true);

        clock.advance(Duration::seconds(2));
        let (_, body) = call(&app, "GET", "/api/sensors", "").await;
        assert_eq!(body["data_source"], "hardware");
        assert_eq!(body["heart_rate"]["value"], 110);
        assert_eq!(body["spo2"]["status"], "Critical — Alert");
        assert_eq!(body["accelerometer"]["activity"], "High Motion");
        assert_eq!(body["fall_detection"]["status"], "Fall Detected!");
        assert_eq!(body["mesh"]["node_count"], 0);

        clock.advance(Duration::seconds(4));
        let (_, body) = call(&app, "GET", "/api/sensors", "").await;
        assert_eq!(body["data_source"], "waiting");
        assert_eq!(body["push_count"], 1);
    }

    #[tokio::test]
    async fn test_root_push_alias() {
        let (app, _) = test_app();
        let (status, body) = call(&app, "POST", "/", r#"{"ax":0,"ay":0,"az":1}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fall_detected"], false);
    }

    #[tokio::test]
    async fn test_blackout_rejects_push_then_expires() {
        let (app, clock) = test_app();
        let (_, body) = call(&app, "POST", "/api/simulate/blackout", r#"{"duration": 10}"#).await;
        assert_eq!(body["status"], "started");
        assert_eq!(body["duration"], 10.0);

        let (status, body) = call(&app, "POST", "/api/sensors/push", r#"{"ax":0,"ay":0,"az":1}"#).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "blackout_simulation");
        assert_eq!(body["message"], "Simulated Wi-Fi failure");

        clock.advance(Duration::seconds(4));
        let (_, body) = call(&app, "GET", "/api/mesh/status", "").await;
        assert_eq!(body["blackout_mode"], true);
        assert_eq!(body["blackout_remaining"], 6.0);
        assert_eq!(body["sensor_node"]["last_push"], 0);

        clock.advance(Duration::seconds(7));
        let (_, body) = call(&app, "GET", "/api/mesh/status", "").await;
        assert_eq!(body["blackout_mode"], false);
        let (status, _) = call(&app, "POST", "/api/sensors/push", r#"{"ax":0,"ay":0,"az":1}"#).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_blackout_toggle_and_default_duration() {
        let (app, _) = test_app();
        let (_, body) = call(&app, "POST", "/api/simulate/blackout", "").await;
        assert_eq!(body["duration"], 30.0);
        let (_, body) = call(&app, "POST", "/api/simulate/blackout", r#"{"duration":"soon"}"#).await;
        assert_eq!(body, json!({"status": "stopped", "blackout": false}));
        let (_, body) = call(&app, "POST", "/api/simulate/blackout", r#"{"duration":-3}"#).await;
        assert_eq!(body["duration"], 30.0);
    }

    #[tokio::test]
    async fn test_huge_configured_default_is_bounded() {
        let (app, clock) = test_app_with_blackout_default(1.0e15);
        let (status, body) = call(&app, "POST", "/api/simulate/blackout", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "started");
        assert_eq!(body["duration"], 86_400.0);

        let push = r#"{"ax":0,"ay":0,"az":1}"#;
        let (status, _) = call(&app, "POST", "/api/sensors/push", push).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        clock.advance(Duration::seconds(86_401));
        let (status, _) = call(&app, "POST", "/api/sensors/push", push).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_nan_configured_default_uses_thirty_seconds() {
        let (app, _) = test_app_with_blackout_default(f64::NAN);
        let (_, body) = call(&app, "POST", "/api/simulate/blackout", "{}").await;
        assert_eq!(body["status"], "started");
        assert_eq!(body["duration"], 30.0);
    }

    #[tokio::test]
    async fn test_emergency_relay_and_history() {
        let (app, _) = test_app();
        for ts in 1..=3 {
            let packet = json!({"origin_mac": "AA:01", "relay_mac": "BB:02", "alert_type": 1, "timestamp": ts, "is_orphan": true});
            let (status, body) = call(&app, "POST", "/api/emergency/relay", &packet.to_string()).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "received");
            assert_eq!(body["emergency_id"], ts);
            assert_eq!(body["chain_reference"], Value::Null);
        }

        let (_, body) = call(&app, "GET", "/api/emergency/history", "").await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["events"][0]["timestamp"], 3);
        assert_eq!(body["events"][0]["acknowledged"], false);
    }

    #[tokio::test]
    async fn test_heartbeat_shows_in_mesh_status() {
        let (app, clock) = test_app();
        let hb = r#"{"node":"relay","mac":"BB:02","wifi":-61,"total_relayed":4,"total_heartbeats":12}"#;
        let (status, body) = call(&app, "POST", "/api/mesh/heartbeat", hb).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        clock.advance(Duration::seconds(3));
        let (_, body) = call(&app, "GET", "/api/mesh/status", "").await;
        assert_eq!(body["mesh_active"], true);
        assert_eq!(body["nodes"][0]["mac"], "BB:02");
        assert_eq!(body["nodes"][0]["node_type"], "relay");
        assert_eq!(body["nodes"][0]["battery"], 255);
        assert_eq!(body["nodes"][0]["seconds_ago"], 3.0);
        assert_eq!(body["sensor_node"]["data_source"], "simulated");
    }

    #[tokio::test]
    async fn test_simulated_fall_during_blackout() {
        let (app, _) = test_app();
        call(&app, "POST", "/api/simulate/blackout", "").await;
        let (_, body) = call(&app, "POST", "/api/simulate/fall", "").await;
        assert_eq!(body["status"], "fall_simulated");

        let (_, body) = call(&app, "GET", "/api/sensors", "").await;
        assert_eq!(body["fall_detection"]["detected"], true);
        assert_eq!(body["mesh"]["blackout"], true);
        assert_eq!(body["spo2"]["value"], 88);
    }

    #[tokio::test]
    async fn test_predict_route_on_simulated_reading() {
        let (app, _) = test_app();
        let (status, body) = call(&app, "GET", "/api/predict", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fall_detected"], false);
        assert!(body["accelerometer"]["z"].as_f64().unwrap() > 0.9);
    }
}
