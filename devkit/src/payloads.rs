/*!
Constructeurs de payloads pour la passerelle

Corps JSON tels que les envoient les nœuds : heartbeats mesh, lectures
capteur poussées, paquets d'urgence relayés.
*/

use crate::protocol::EmergencyPacket;
use serde_json::{json, Value};

pub struct SuraxitPayloadBuilder;

impl SuraxitPayloadBuilder {
    /// Heartbeat mesh (`node` = "sensor" | "relay").
    pub fn heartbeat(node: &str, mac: &str, wifi: i32, battery: u8, total_relayed: u64, total_heartbeats: u64) -> Value {
        json!({
            "node": node,
            "mac": mac,
            "wifi": wifi,
            "battery": battery,
            "total_relayed": total_relayed,
            "total_heartbeats": total_heartbeats,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sensor_reading(ax: f64, ay: f64, az: f64, gx: f64, gy: f64, gz: f64, hr: f64, spo2: f64, gas: f64) -> Value {
        json!({
            "ax": ax, "ay": ay, "az": az,
            "gx": gx, "gy": gy, "gz": gz,
            "hr": hr, "spo2": spo2, "gas": gas,
        })
    }

    /// Porteur immobile, à plat (~1 g sur z).
    pub fn resting_reading() -> Value {
        Self::sensor_reading(0.01, -0.02, 1.0, 0.3, -0.1, 0.05, 72.0, 97.0, 12.0)
    }

    /// Pic d'accélération d'une chute (~3.7 g).
    pub fn fall_reading() -> Value {
        Self::sensor_reading(0.5, -1.8, 3.2, 45.0, -30.0, 12.0, 110.0, 88.0, 8.0)
    }

    pub fn emergency(packet: &EmergencyPacket) -> Value {
        serde_json::to_value(packet).unwrap_or(Value::Null)
    }

    pub fn blackout(duration_secs: f64) -> Value {
        json!({ "duration": duration_secs })
    }
}
