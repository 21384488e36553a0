/**
 * INGEST GATEWAY - Politique d'ingestion entre HTTP et les stores
 *
 * RÔLE :
 * - Pushs matériel : refusés pendant le blackout (aucune mutation), sinon
 *   stockés puis évalués par le prédicteur de chute
 * - Heartbeats / urgences : transmis au MeshRegistry
 * - Statut : compose MeshRegistry.snapshot + HardwareFreshnessStore.is_online
 *
 * Les deux stores ont chacun leur verrou ; on ne tient jamais les deux à la fois.
 */

use crate::error::{GatewayError, GatewayResult};
use crate::hardware::{Freshness, SharedHardwareStore};
use crate::mesh::{BlackoutTransition, MeshSnapshot, RecordedEmergency, SharedMeshRegistry};
use crate::models::{HeartbeatIn, NodeRecord, Payload, SensorFields};
use crate::predictor::{assess, FallAssessment, SharedPredictor};
use serde::Serialize;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

pub use crate::config::{DEFAULT_BLACKOUT_SECS, MAX_BLACKOUT_SECS};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushAccepted {
    pub push_count: u64,
    pub fall: FallAssessment,
}

#[derive(Debug, Clone, Serialize)]
pub struct SensorNodeStatus {
    pub online: bool,
    pub last_push: u64,
    pub data_source: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    #[serde(flatten)]
    pub mesh: MeshSnapshot,
    pub sensor_node: SensorNodeStatus,
}

#[derive(Clone)]
pub struct IngestGateway {
    mesh: SharedMeshRegistry,
    hardware: SharedHardwareStore,
    predictor: SharedPredictor,
}

/// Corps JSON accepté par les routes d'ingestion : un objet non vide.
pub fn parse_payload(body: &[u8]) -> GatewayResult<Payload> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) if !map.is_empty() => Ok(map),
        _ => Err(GatewayError::InvalidJson),
    }
}

/// Durée demandée pour `/api/simulate/blackout`, en secondes, bornée à
/// [0, MAX_BLACKOUT_SECS] qu'elle vienne du corps ou de la configuration.
pub fn blackout_duration(requested: Option<&Value>, default_secs: f64) -> f64 {
    let bounded = |secs: f64| (secs.is_finite() && secs >= 0.0).then(|| secs.min(MAX_BLACKOUT_SECS));
    requested
        .and_then(Value::as_f64)
        .and_then(bounded)
        .or_else(|| bounded(default_secs))
        .unwrap_or(DEFAULT_BLACKOUT_SECS)
}

impl IngestGateway {
    pub fn new(mesh: SharedMeshRegistry, hardware: SharedHardwareStore, predictor: SharedPredictor) -> Self {
        Self { mesh, hardware, predictor }
    }

    pub fn mesh(&self) -> &SharedMeshRegistry {
        &self.mesh
    }

    pub fn predictor(&self) -> &SharedPredictor {
        &self.predictor
    }

    pub fn push_hardware(&self, fields: SensorFields, now: OffsetDateTime) -> GatewayResult<PushAccepted> {
        if self.mesh.is_blackout_rejecting(now) {
            return Err(GatewayError::BlackoutActive);
        }
        Ok(self.store_reading(fields, now))
    }

    /// Corps brut d'un push : le refus blackout passe avant la validation JSON.
    pub fn push_body(&self, body: &[u8], now: OffsetDateTime) -> GatewayResult<PushAccepted> {
        if self.mesh.is_blackout_rejecting(now) {
            return Err(GatewayError::BlackoutActive);
        }
        let fields = SensorFields(parse_payload(body)?);
        Ok(self.store_reading(fields, now))
    }

    /// Injection de chute pour la démo : contourne le refus blackout.
    pub fn inject_fall(&self, now: OffsetDateTime) -> PushAccepted {
        let accepted = self.store_reading(SensorFields::simulated_fall(), now);
        warn!(push = accepted.push_count, "[sim] *** FALL SIMULATED — injected high-accel data ***");
        accepted
    }

    fn store_reading(&self, fields: SensorFields, now: OffsetDateTime) -> PushAccepted {
        let accel = fields.acceleration();
        let hr = fields.number("hr");
        let spo2 = fields.number("spo2");
        let push_count = self.hardware.update(fields, now);
        let fall = assess(self.predictor.as_ref(), accel);

        info!(
            push = push_count,
            ax = accel.x,
            ay = accel.y,
            az = accel.z,
            hr,
            spo2,
            fall = fall.probability,
            "[hw] push{}",
            if fall.detected { "  *** FALL ***" } else { "" }
        );
        PushAccepted { push_count, fall }
    }

    pub fn latest_reading(&self, max_age: Duration, now: OffsetDateTime) -> Freshness {
        self.hardware.get(max_age, now)
    }

    pub fn push_count(&self) -> u64 {
        self.hardware.push_count()
    }

    pub fn heartbeat(&self, payload: &Payload, now: OffsetDateTime) -> NodeRecord {
        self.mesh.record_heartbeat(HeartbeatIn::from_payload(payload), now)
    }

    pub fn relay_emergency(&self, payload: Payload, now: OffsetDateTime) -> RecordedEmergency {
        let recorded = self.mesh.record_emergency(payload, now);
        let event = &recorded.event;
        warn!(
            emergency_id = recorded.sequence,
            origin = event.origin(),
            relay = event.relay(),
            alert = %event.alert_type(),
            hops = event.hop_count(),
            fall = event.fall_prob(),
            spo2 = event.spo2(),
            orphan = event.is_orphan(),
            "[mesh] *** EMERGENCY RELAY — ORPHAN TRANSACTION ***"
        );
        recorded
    }

    pub fn status(&self, now: OffsetDateTime) -> GatewayStatus {
        let mesh = self.mesh.snapshot(now);
        let online = self.hardware.is_online(now);
        GatewayStatus {
            mesh,
            sensor_node: SensorNodeStatus {
                online,
                last_push: self.hardware.push_count(),
                data_source: if online { "hardware" } else { "simulated" },
            },
        }
    }

    pub fn toggle_blackout(&self, duration_secs: f64, now: OffsetDateTime) -> BlackoutTransition {
        let transition = self.mesh.start_blackout(Duration::seconds_f64(duration_secs), now);
        match transition {
            BlackoutTransition::Started { .. } => {
                warn!(duration_secs, "[sim] *** BLACKOUT SIMULATION START ***")
            }
            BlackoutTransition::Stopped => info!("[sim] blackout simulation STOPPED"),
        }
        transition
    }
}
