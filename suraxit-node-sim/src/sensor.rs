//! Nœud capteur porté : pousse ses lectures en Wi-Fi, bascule en mode
//! blackout après plusieurs échecs et envoie alors ses alertes au relais.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::time::Duration;
use suraxit_devkit::protocol::{
    near_alert_threshold, BLACKOUT_THRESHOLD, DATA_PUSH_INTERVAL_MS, FALL_ACCEL_THRESHOLD, FALL_ACCEL_WARNING,
    HEARTBEAT_INTERVAL_MS,
};
use suraxit_devkit::{AlertReading, AlertType, EmergencyPacket, GatewayClient, SuraxitPayloadBuilder};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTransition {
    EnteredBlackout,
    Recovered,
}

/// Compteur d'échecs Wi-Fi consécutifs.
#[derive(Debug, Default)]
pub struct WifiLink {
    consecutive_failures: u32,
    blackout: bool,
}

impl WifiLink {
    pub fn in_blackout(&self) -> bool {
        self.blackout
    }

    pub fn record(&mut self, delivered: bool) -> Option<LinkTransition> {
        if delivered {
            self.consecutive_failures = 0;
            if self.blackout {
                self.blackout = false;
                return Some(LinkTransition::Recovered);
            }
            return None;
        }

        self.consecutive_failures += 1;
        if !self.blackout && self.consecutive_failures >= BLACKOUT_THRESHOLD {
            self.blackout = true;
            return Some(LinkTransition::EnteredBlackout);
        }
        None
    }
}

/// Probabilité de chute embarquée (seuils firmware).
pub fn local_fall_probability(magnitude: f32) -> f32 {
    if magnitude > FALL_ACCEL_THRESHOLD {
        0.85
    } else if magnitude > FALL_ACCEL_WARNING {
        0.3
    } else {
        0.05
    }
}

pub struct SensorNode {
    mac: String,
    fall_every: u64,
    pushes: u64,
    heartbeats: u64,
    link: WifiLink,
    rng: StdRng,
}

impl SensorNode {
    pub fn new(mac: impl Into<String>, fall_every: u64) -> Self {
        Self {
            mac: mac.into(),
            fall_every,
            pushes: 0,
            heartbeats: 0,
            link: WifiLink::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Lecture suivante : repos bruité, ou chute tous les `fall_every` pushs.
    pub fn next_reading(&mut self) -> Value {
        self.pushes += 1;
        if self.fall_every > 0 && self.pushes % self.fall_every == 0 {
            return SuraxitPayloadBuilder::fall_reading();
        }
        let mut jitter = |spread: f64| self.rng.gen_range(-spread..spread);
        SuraxitPayloadBuilder::sensor_reading(
            0.01 + jitter(0.02),
            -0.02 + jitter(0.02),
            1.0 + jitter(0.01),
            jitter(0.5),
            jitter(0.5),
            jitter(0.3),
            (72.0 + jitter(4.0)).round(),
            (97.0 + jitter(1.5)).round(),
            12.0 + jitter(2.0),
        )
    }

    /// Paquet d'urgence si la lecture déclenche une alerte.
    pub fn alert_packet(&self, reading: &Value) -> Option<EmergencyPacket> {
        let field = |key: &str| reading.get(key).and_then(Value::as_f64).unwrap_or(0.0) as f32;
        let magnitude = (field("ax").powi(2) + field("ay").powi(2) + field("az").powi(2)).sqrt();
        let alert_reading = AlertReading {
            fall_prob: local_fall_probability(magnitude),
            spo2: field("spo2").clamp(0.0, 100.0) as u8,
            heart_rate: field("hr").clamp(0.0, f32::from(u16::MAX)) as u16,
            gas_ppm: field("gas"),
            accel_magnitude: magnitude,
        };
        let Some(alert) = AlertType::detect(magnitude, alert_reading.spo2, alert_reading.gas_ppm) else {
            if near_alert_threshold(magnitude, alert_reading.spo2, alert_reading.gas_ppm) {
                debug!(accel = magnitude, spo2 = alert_reading.spo2, gas = alert_reading.gas_ppm, "[sensor] reading near alert thresholds");
            }
            return None;
        };
        Some(EmergencyPacket::originate(&self.mac, alert, &alert_reading))
    }

    async fn push(&mut self, client: &GatewayClient, espnow: &mpsc::Sender<EmergencyPacket>) {
        let reading = self.next_reading();
        let delivered = match client.push_reading(&reading).await {
            Ok(reply) if reply.is_success() => {
                debug!(push = %reply.body["push_count"], fall = %reply.body["fall_detected"], "[sensor] push ok");
                true
            }
            Ok(reply) => {
                debug!(status = reply.status, "[sensor] push rejected");
                false
            }
            Err(e) => {
                debug!(error = %e, "[sensor] push failed");
                false
            }
        };

        match self.link.record(delivered) {
            Some(LinkTransition::EnteredBlackout) => {
                warn!(failures = BLACKOUT_THRESHOLD, "[sensor] *** Wi-Fi BLACKOUT — switching to ESP-NOW mesh ***")
            }
            Some(LinkTransition::Recovered) => info!("[sensor] Wi-Fi restored"),
            None => {}
        }

        if !self.link.in_blackout() {
            return;
        }
        if let Some(packet) = self.alert_packet(&reading) {
            warn!(alert = ?AlertType::from_code(packet.alert_type), "[sensor] alert sent over ESP-NOW");
            if espnow.send(packet).await.is_err() {
                warn!("[sensor] relay link closed");
            }
        }
    }

    async fn heartbeat(&mut self, client: &GatewayClient) {
        self.heartbeats += 1;
        let wifi = if self.link.in_blackout() { -100 } else { -48 };
        let hb = SuraxitPayloadBuilder::heartbeat("sensor", &self.mac, wifi, 100, 0, self.heartbeats);
        if let Err(e) = client.heartbeat(&hb).await {
            debug!(error = %e, "[sensor] heartbeat failed");
        }
    }

    pub async fn run(mut self, client: GatewayClient, espnow: mpsc::Sender<EmergencyPacket>) {
        info!(mac = %self.mac, fall_every = self.fall_every, "[sensor] started");
        let mut push_ticker = tokio::time::interval(Duration::from_millis(DATA_PUSH_INTERVAL_MS));
        let mut heartbeat_ticker = tokio::time::interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));

        loop {
            tokio::select! {
                _ = push_ticker.tick() => self.push(&client, &espnow).await,
                _ = heartbeat_ticker.tick() => self.heartbeat(&client).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blackout_after_three_failures() {
        let mut link = WifiLink::default();
        assert_eq!(link.record(false), None);
        assert_eq!(link.record(false), None);
        assert_eq!(link.record(false), Some(LinkTransition::EnteredBlackout));
        assert!(link.in_blackout());
        assert_eq!(link.record(false), None);
        assert_eq!(link.record(true), Some(LinkTransition::Recovered));
        assert!(!link.in_blackout());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut link = WifiLink::default();
        link.record(false);
        link.record(false);
        link.record(true);
        assert_eq!(link.record(false), None);
        assert_eq!(link.record(false), None);
        assert!(!link.in_blackout());
    }

    #[test]
    fn test_fall_every_and_alerts() {
        let mut node = SensorNode::new("AA:01", 3);
        let first = node.next_reading();
        assert!(node.alert_packet(&first).is_none());
        node.next_reading();
        let third = node.next_reading();
        let packet = node.alert_packet(&third).unwrap();
        assert_eq!(packet.alert_type, AlertType::Fall.code());
        assert_eq!(packet.fall_prob, 0.85);
        assert_eq!(packet.spo2, 88);
        assert_eq!(packet.origin_mac, "AA:01");
    }

    #[test]
    fn test_warning_levels_do_not_alert() {
        let node = SensorNode::new("AA:01", 0);
        let reading = SuraxitPayloadBuilder::sensor_reading(0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 80.0, 93.0, 30.0);
        assert!(node.alert_packet(&reading).is_none());

        let reading = SuraxitPayloadBuilder::sensor_reading(0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 80.0, 97.0, 60.0);
        let packet = node.alert_packet(&reading).unwrap();
        assert_eq!(AlertType::from_code(packet.alert_type), Some(AlertType::Gas));
    }

    #[test]
    fn test_never_falls_when_disabled() {
        let mut node = SensorNode::new("AA:01", 0);
        for _ in 0..50 {
            let reading = node.next_reading();
            assert!(node.alert_packet(&reading).is_none());
        }
    }
}
