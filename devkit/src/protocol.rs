/*!
Protocole mesh d'urgence des nœuds Suraxit

Constantes partagées par le nœud capteur et le nœud relais (seuils,
intervalles, taille de la table de déduplication) et paquet d'urgence
tel qu'il circule sur le lien ESP-NOW puis vers la passerelle.
*/

use serde::{Deserialize, Serialize};

pub const FALL_ACCEL_THRESHOLD: f32 = 2.5;
pub const FALL_ACCEL_WARNING: f32 = 1.8;
pub const SPO2_CRITICAL: u8 = 90;
pub const SPO2_WARNING: u8 = 95;
pub const GAS_HAZARDOUS: f32 = 50.0;
pub const GAS_MODERATE: f32 = 25.0;

pub const MAX_HOP_COUNT: u8 = 5;
pub const HEARTBEAT_INTERVAL_MS: u64 = 5000;
/// Échecs Wi-Fi consécutifs avant de passer en mode blackout.
pub const BLACKOUT_THRESHOLD: u32 = 3;
pub const DATA_PUSH_INTERVAL_MS: u64 = 1000;
pub const DEDUP_TABLE_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertType {
    Fall,
    LowSpo2,
    Gas,
    Manual,
}

impl AlertType {
    pub fn code(self) -> u8 {
        match self {
            AlertType::Fall => 0x01,
            AlertType::LowSpo2 => 0x02,
            AlertType::Gas => 0x03,
            AlertType::Manual => 0x04,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(AlertType::Fall),
            0x02 => Some(AlertType::LowSpo2),
            0x03 => Some(AlertType::Gas),
            0x04 => Some(AlertType::Manual),
            _ => None,
        }
    }

    /// Alerte déclenchée par une lecture, par priorité chute > SpO2 > gaz.
    pub fn detect(accel_magnitude: f32, spo2: u8, gas_ppm: f32) -> Option<Self> {
        if accel_magnitude > FALL_ACCEL_THRESHOLD {
            Some(AlertType::Fall)
        } else if spo2 > 0 && spo2 < SPO2_CRITICAL {
            Some(AlertType::LowSpo2)
        } else if gas_ppm > GAS_HAZARDOUS {
            Some(AlertType::Gas)
        } else {
            None
        }
    }
}

/// Lecture sous les seuils d'alerte mais au-dessus des seuils de vigilance.
pub fn near_alert_threshold(accel_magnitude: f32, spo2: u8, gas_ppm: f32) -> bool {
    accel_magnitude > FALL_ACCEL_WARNING || (spo2 > 0 && spo2 < SPO2_WARNING) || gas_ppm > GAS_MODERATE
}

/// Mesures embarquées dans un paquet d'urgence.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AlertReading {
    pub fall_prob: f32,
    pub spo2: u8,
    pub heart_rate: u16,
    pub gas_ppm: f32,
    pub accel_magnitude: f32,
}

/// Paquet d'urgence relayé. Les MAC sont en texte `AA:BB:CC:DD:EE:FF`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyPacket {
    pub origin_mac: String,
    pub timestamp: u32,
    pub alert_type: u8,
    pub fall_prob: f32,
    pub spo2: u8,
    pub heart_rate: u16,
    pub gas_ppm: f32,
    pub accel_magnitude: f32,
    pub hop_count: u8,
    pub relay_mac: String,
    #[serde(default)]
    pub is_orphan: bool,
}

impl EmergencyPacket {
    /// Paquet émis par le nœud d'origine : zéro saut, pas encore relayé.
    pub fn originate(origin_mac: &str, alert: AlertType, reading: &AlertReading) -> Self {
        Self {
            origin_mac: origin_mac.to_string(),
            timestamp: u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX),
            alert_type: alert.code(),
            fall_prob: reading.fall_prob,
            spo2: reading.spo2,
            heart_rate: reading.heart_rate,
            gas_ppm: reading.gas_ppm,
            accel_magnitude: reading.accel_magnitude,
            hop_count: 0,
            relay_mac: String::new(),
            is_orphan: false,
        }
    }

    /// Clé de déduplication côté relais.
    pub fn dedup_key(&self) -> (&str, u32) {
        (&self.origin_mac, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_codes() {
        for alert in [AlertType::Fall, AlertType::LowSpo2, AlertType::Gas, AlertType::Manual] {
            assert_eq!(AlertType::from_code(alert.code()), Some(alert));
        }
        assert_eq!(AlertType::from_code(0x09), None);
    }

    #[test]
    fn test_alert_detection_priority() {
        assert_eq!(AlertType::detect(3.1, 85, 80.0), Some(AlertType::Fall));
        assert_eq!(AlertType::detect(1.0, 85, 80.0), Some(AlertType::LowSpo2));
        assert_eq!(AlertType::detect(1.0, 97, 80.0), Some(AlertType::Gas));
        assert_eq!(AlertType::detect(2.5, 90, 50.0), None);
        // capteur SpO2 absent (0) : pas d'alerte
        assert_eq!(AlertType::detect(1.0, 0, 10.0), None);
    }

    #[test]
    fn test_near_alert_threshold() {
        assert!(!near_alert_threshold(1.0, 97, 12.0));
        assert!(near_alert_threshold(2.0, 97, 12.0));
        assert!(near_alert_threshold(1.0, 93, 12.0));
        assert!(near_alert_threshold(1.0, 97, 30.0));
        assert!(!near_alert_threshold(1.0, 0, 12.0));
    }

    #[test]
    fn test_originate_packet() {
        let reading = AlertReading { fall_prob: 0.85, spo2: 88, heart_rate: 110, gas_ppm: 8.0, accel_magnitude: 3.7 };
        let packet = EmergencyPacket::originate("AA:01", AlertType::Fall, &reading);
        assert_eq!(packet.alert_type, 1);
        assert_eq!(packet.hop_count, 0);
        assert!(packet.relay_mac.is_empty());
        assert!(!packet.is_orphan);
        assert!(packet.timestamp > 1_600_000_000);
        assert_eq!(packet.dedup_key(), ("AA:01", packet.timestamp));
    }
}
