/**
 * MESH REGISTRY - Vue autoritaire du réseau mesh de capteurs
 *
 * RÔLE :
 * - Nœuds vivants : un enregistrement par identifiant (dernier heartbeat gagne)
 * - Journal des urgences relayées : borné aux 50 dernières (FIFO)
 * - Simulation de blackout : coupure Wi-Fi simulée avec date d'expiration
 *
 * FONCTIONNEMENT :
 * - Tout passe par un seul Mutex (volume de requêtes faible)
 * - Le temps `now` est toujours fourni par l'appelant
 * - L'expiration du blackout est constatée paresseusement à la lecture
 */

use crate::clock::round_to;
use crate::models::{EmergencyEvent, HeartbeatIn, NodeRecord, Payload};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};

pub const NODE_ONLINE_WINDOW: Duration = Duration::seconds(15);
pub const EMERGENCY_LOG_CAPACITY: usize = 50;
pub const RECENT_EMERGENCIES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlackoutState {
    pub active: bool,
    pub until: OffsetDateTime,
}

impl Default for BlackoutState {
    fn default() -> Self {
        Self { active: false, until: OffsetDateTime::UNIX_EPOCH }
    }
}

impl BlackoutState {
    fn expire(&mut self, now: OffsetDateTime) -> bool {
        if self.active && now > self.until {
            self.active = false;
            return true;
        }
        false
    }

    fn remaining_seconds(&self, now: OffsetDateTime) -> f64 {
        if !self.active {
            return 0.0;
        }
        round_to((self.until - now).as_seconds_f64(), 1).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlackoutTransition {
    Started { until: OffsetDateTime },
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    #[serde(flatten)]
    pub record: NodeRecord,
    pub online: bool,
    pub seconds_ago: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeshSnapshot {
    pub nodes: Vec<NodeView>,
    pub mesh_active: bool,
    pub blackout_mode: bool,
    pub blackout_remaining: f64,
    pub total_emergencies: usize,
    pub recent_emergencies: Vec<EmergencyEvent>,
}

#[derive(Debug, Clone)]
pub struct RecordedEmergency {
    pub event: EmergencyEvent,
    /// Rang de l'événement depuis le démarrage (non borné par le journal).
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct MeshState {
    nodes: IndexMap<String, NodeRecord>,
    emergencies: VecDeque<EmergencyEvent>,
    emergencies_recorded: u64,
    blackout: BlackoutState,
}

#[derive(Debug, Default)]
pub struct MeshRegistry {
    state: Mutex<MeshState>,
}

pub type SharedMeshRegistry = Arc<MeshRegistry>;

impl MeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert du nœud : remplace intégralement l'enregistrement précédent.
    pub fn record_heartbeat(&self, heartbeat: HeartbeatIn, now: OffsetDateTime) -> NodeRecord {
        let record = heartbeat.into_record(now);
        let mut state = self.state.lock();
        if state.nodes.insert(record.identifier.clone(), record.clone()).is_none() {
            info!(node = %record.identifier, node_type = %record.node_type, "[mesh] new node joined");
        } else {
            debug!(node = %record.identifier, battery = record.battery_level, "[mesh] heartbeat");
        }
        record
    }

    pub fn record_emergency(&self, payload: Payload, now: OffsetDateTime) -> RecordedEmergency {
        let event = EmergencyEvent::new(payload, now);
        let mut state = self.state.lock();
        if state.emergencies.len() == EMERGENCY_LOG_CAPACITY {
            state.emergencies.pop_front();
        }
        state.emergencies.push_back(event.clone());
        state.emergencies_recorded += 1;
        RecordedEmergency { event, sequence: state.emergencies_recorded }
    }

    pub fn snapshot(&self, now: OffsetDateTime) -> MeshSnapshot {
        let mut state = self.state.lock();
        if state.blackout.expire(now) {
            info!("[mesh] blackout window expired");
        }

        let nodes: Vec<NodeView> = state
            .nodes
            .values()
            .map(|record| {
                let age = now - record.last_seen;
                NodeView {
                    record: record.clone(),
                    online: age < NODE_ONLINE_WINDOW,
                    seconds_ago: round_to(age.as_seconds_f64(), 1),
                }
            })
            .collect();

        MeshSnapshot {
            mesh_active: nodes.iter().any(|n| n.online),
            nodes,
            blackout_mode: state.blackout.active,
            blackout_remaining: state.blackout.remaining_seconds(now),
            total_emergencies: state.emergencies.len(),
            recent_emergencies: state
                .emergencies
                .iter()
                .rev()
                .take(RECENT_EMERGENCIES)
                .cloned()
                .collect(),
        }
    }

    /// Bascule : démarre une fenêtre de blackout, ou l'arrête si elle est déjà active.
    pub fn start_blackout(&self, duration: Duration, now: OffsetDateTime) -> BlackoutTransition {
        let mut state = self.state.lock();
        state.blackout.expire(now);
        if state.blackout.active {
            state.blackout = BlackoutState::default();
            return BlackoutTransition::Stopped;
        }
        let until = now + duration;
        state.blackout = BlackoutState { active: true, until };
        BlackoutTransition::Started { until }
    }

    pub fn stop_blackout(&self) {
        self.state.lock().blackout = BlackoutState::default();
    }

    pub fn is_blackout_rejecting(&self, now: OffsetDateTime) -> bool {
        let state = self.state.lock();
        state.blackout.active && now < state.blackout.until
    }

    pub fn blackout(&self) -> BlackoutState {
        self.state.lock().blackout
    }

    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    pub fn emergencies_recorded(&self) -> u64 {
        self.state.lock().emergencies_recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use time::macros::datetime;

    const T: OffsetDateTime = datetime!(2025-03-01 10:00:00 UTC);

    fn heartbeat(v: Value) -> HeartbeatIn {
        HeartbeatIn::from_payload(v.as_object().unwrap())
    }

    fn emergency(n: u64) -> Payload {
        json!({"origin_mac": format!("E{n}"), "alert_type": 1, "hop_count": 1})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_heartbeat_last_write_wins() {
        let mesh = MeshRegistry::new();
        mesh.record_heartbeat(heartbeat(json!({"mac": "A", "node": "sensor", "wifi": 1, "battery": 90, "total_heartbeats": 3})), T);
        mesh.record_heartbeat(heartbeat(json!({"mac": "B", "node": "relay"})), T);
        mesh.record_heartbeat(heartbeat(json!({"mac": "A", "total_relayed": 7})), T + Duration::seconds(2));

        let snap = mesh.snapshot(T + Duration::seconds(2));
        assert_eq!(snap.nodes.len(), 2);
        let a = &snap.nodes[0].record;
        assert_eq!(a.identifier, "A");
        // remplacement complet, pas de fusion
        assert_eq!(a.node_type, "unknown");
        assert_eq!(a.signal_strength, 0);
        assert_eq!(a.battery_level, 255);
        assert_eq!(a.total_heartbeats, 0);
        assert_eq!(a.total_relayed, 7);
        assert_eq!(a.last_seen, T + Duration::seconds(2));
        assert_eq!(snap.nodes[1].record.identifier, "B");
    }

    #[test]
    fn test_missing_identifier_collapses_into_unknown() {
        let mesh = MeshRegistry::new();
        mesh.record_heartbeat(heartbeat(json!({"node": "sensor"})), T);
        mesh.record_heartbeat(heartbeat(json!({"node": "relay"})), T);
        assert_eq!(mesh.node_count(), 1);
        let snap = mesh.snapshot(T);
        assert_eq!(snap.nodes[0].record.identifier, "unknown");
        assert_eq!(snap.nodes[0].record.node_type, "relay");
    }

    #[test]
    fn test_mesh_active_uses_strict_window() {
        let mesh = MeshRegistry::new();
        assert!(!mesh.snapshot(T).mesh_active);

        mesh.record_heartbeat(heartbeat(json!({"mac": "A"})), T);
        let snap = mesh.snapshot(T + Duration::milliseconds(14_900));
        assert!(snap.mesh_active);
        assert!(snap.nodes[0].online);
        assert_eq!(snap.nodes[0].seconds_ago, 14.9);

        let snap = mesh.snapshot(T + NODE_ONLINE_WINDOW);
        assert!(!snap.mesh_active);
        assert!(!snap.nodes[0].online);
    }

    #[test]
    fn test_emergency_log_is_bounded_fifo() {
        let mesh = MeshRegistry::new();
        for n in 1..=51 {
            let recorded = mesh.record_emergency(emergency(n), T);
            assert_eq!(recorded.sequence, n);
            assert!(recorded.event.chain_reference.is_none());
            assert!(!recorded.event.acknowledged);
        }

        let snap = mesh.snapshot(T);
        assert_eq!(snap.total_emergencies, EMERGENCY_LOG_CAPACITY);
        assert_eq!(mesh.emergencies_recorded(), 51);

        let origins: Vec<&str> = snap.recent_emergencies.iter().map(|e| e.origin()).collect();
        assert_eq!(origins, vec!["E51", "E50", "E49", "E48", "E47"]);

        let state = mesh.state.lock();
        assert_eq!(state.emergencies.front().map(|e| e.origin()), Some("E2"));
        assert_eq!(state.emergencies.back().map(|e| e.origin()), Some("E51"));
    }

    #[test]
    fn test_blackout_expires_lazily_on_snapshot() {
        let mesh = MeshRegistry::new();
        let transition = mesh.start_blackout(Duration::seconds(30), T);
        assert_eq!(transition, BlackoutTransition::Started { until: T + Duration::seconds(30) });

        let snap = mesh.snapshot(T + Duration::seconds(10));
        assert!(snap.blackout_mode);
        assert_eq!(snap.blackout_remaining, 20.0);

        // pas encore observé : le drapeau brut reste levé
        assert!(mesh.blackout().active);
        let snap = mesh.snapshot(T + Duration::seconds(31));
        assert!(!snap.blackout_mode);
        assert_eq!(snap.blackout_remaining, 0.0);
        assert!(!mesh.blackout().active);
    }

    #[test]
    fn test_blackout_toggle_and_force_stop() {
        let mesh = MeshRegistry::new();
        mesh.start_blackout(Duration::seconds(30), T);
        assert_eq!(mesh.start_blackout(Duration::seconds(30), T + Duration::seconds(1)), BlackoutTransition::Stopped);
        assert_eq!(mesh.blackout(), BlackoutState::default());

        mesh.start_blackout(Duration::seconds(30), T);
        mesh.stop_blackout();
        assert!(!mesh.is_blackout_rejecting(T + Duration::seconds(1)));
        assert_eq!(mesh.blackout().until, OffsetDateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_expired_window_is_restarted_not_stopped() {
        let mesh = MeshRegistry::new();
        mesh.start_blackout(Duration::seconds(5), T);
        let later = T + Duration::seconds(60);
        assert_eq!(
            mesh.start_blackout(Duration::seconds(5), later),
            BlackoutTransition::Started { until: later + Duration::seconds(5) }
        );
    }

    #[test]
    fn test_rejecting_until_deadline() {
        let mesh = MeshRegistry::new();
        mesh.start_blackout(Duration::seconds(30), T);
        assert!(mesh.is_blackout_rejecting(T));
        assert!(mesh.is_blackout_rejecting(T + Duration::milliseconds(29_999)));
        assert!(!mesh.is_blackout_rejecting(T + Duration::seconds(30)));
    }

    #[test]
    fn test_concurrent_heartbeats_keep_one_record_per_node() {
        let mesh = Arc::new(MeshRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let mesh = mesh.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let mac = format!("node-{}", i % 4);
                        mesh.record_heartbeat(heartbeat(json!({"mac": mac, "total_heartbeats": worker})), T);
                        mesh.record_emergency(emergency(i), T);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(mesh.node_count(), 4);
        assert_eq!(mesh.emergencies_recorded(), 800);
        assert_eq!(mesh.snapshot(T).total_emergencies, EMERGENCY_LOG_CAPACITY);
    }
}
