use crate::clock::epoch_seconds;
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

pub type Payload = Map<String, Value>;

/// Clé de repli quand un heartbeat n'a pas de `mac` : tous ces nœuds
/// partagent le même enregistrement.
pub const UNKNOWN_NODE: &str = "unknown";
pub const BATTERY_UNKNOWN: u8 = 255;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub node_type: String,
    #[serde(rename = "mac")]
    pub identifier: String,
    #[serde(rename = "wifi")]
    pub signal_strength: i64,
    #[serde(rename = "battery")]
    pub battery_level: u8,
    #[serde(serialize_with = "epoch_seconds::serialize")]
    pub last_seen: OffsetDateTime,
    pub total_relayed: u64,
    pub total_heartbeats: u64,
}

/// Heartbeat entrant, champs tolérants (valeurs par défaut si absents ou mal typés).
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatIn {
    pub node_type: String,
    pub identifier: String,
    pub signal_strength: i64,
    pub battery_level: u8,
    pub total_relayed: u64,
    pub total_heartbeats: u64,
}

impl HeartbeatIn {
    pub fn from_payload(payload: &Payload) -> Self {
        Self {
            node_type: string_field(payload, "node").unwrap_or_else(|| UNKNOWN_NODE.to_string()),
            identifier: string_field(payload, "mac").unwrap_or_else(|| UNKNOWN_NODE.to_string()),
            signal_strength: payload.get("wifi").and_then(as_integer).unwrap_or(0),
            battery_level: payload
                .get("battery")
                .and_then(as_integer)
                .and_then(|b| u8::try_from(b).ok())
                .unwrap_or(BATTERY_UNKNOWN),
            total_relayed: counter_field(payload, "total_relayed"),
            total_heartbeats: counter_field(payload, "total_heartbeats"),
        }
    }

    pub fn into_record(self, now: OffsetDateTime) -> NodeRecord {
        NodeRecord {
            node_type: self.node_type,
            identifier: self.identifier,
            signal_strength: self.signal_strength,
            battery_level: self.battery_level,
            last_seen: now,
            total_relayed: self.total_relayed,
            total_heartbeats: self.total_heartbeats,
        }
    }
}

/// Paquet d'urgence relayé. Le payload d'origine est conservé tel quel,
/// seuls les trois champs serveur sont ajoutés.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyEvent {
    #[serde(flatten)]
    pub payload: Payload,
    #[serde(serialize_with = "epoch_seconds::serialize")]
    pub server_received_at: OffsetDateTime,
    pub chain_reference: Option<String>,
    pub acknowledged: bool,
}

impl EmergencyEvent {
    const SERVER_FIELDS: [&'static str; 3] = ["server_received_at", "chain_reference", "acknowledged"];

    pub fn new(mut payload: Payload, now: OffsetDateTime) -> Self {
        for key in Self::SERVER_FIELDS {
            payload.remove(key);
        }
        Self {
            payload,
            server_received_at: now,
            chain_reference: None,
            acknowledged: false,
        }
    }

    pub fn origin(&self) -> &str {
        self.payload.get("origin_mac").and_then(Value::as_str).unwrap_or("?")
    }

    pub fn relay(&self) -> &str {
        self.payload.get("relay_mac").and_then(Value::as_str).unwrap_or("?")
    }

    pub fn alert_type(&self) -> String {
        match self.payload.get("alert_type") {
            Some(Value::String(s)) => s.clone(),
            Some(v) if !v.is_null() => v.to_string(),
            _ => "?".to_string(),
        }
    }

    pub fn hop_count(&self) -> i64 {
        self.payload.get("hop_count").and_then(as_integer).unwrap_or(0)
    }

    pub fn fall_prob(&self) -> f64 {
        self.payload.get("fall_prob").and_then(Value::as_f64).unwrap_or(0.0)
    }

    pub fn spo2(&self) -> f64 {
        self.payload.get("spo2").and_then(Value::as_f64).unwrap_or(0.0)
    }

    pub fn is_orphan(&self) -> bool {
        self.payload.get("is_orphan").and_then(Value::as_bool).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Acceleration {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Vitesse angulaire du gyroscope, en °/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AngularRate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AngularRate {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Champs bruts poussés par le matériel (`ax,ay,az,gx,gy,gz,hr,spo2,gas`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SensorFields(pub Payload);

impl SensorFields {
    /// Valeur numérique d'un champ, 0 si absent ou non numérique.
    pub fn number(&self, key: &str) -> f64 {
        self.0.get(key).and_then(as_number).unwrap_or(0.0)
    }

    pub fn acceleration(&self) -> Acceleration {
        Acceleration::new(self.number("ax"), self.number("ay"), self.number("az"))
    }

    /// Lecture synthétique de chute injectée par `/api/simulate/fall`.
    pub fn simulated_fall() -> Self {
        let fields = serde_json::json!({
            "ax": 0.5, "ay": -1.8, "az": 3.2,
            "gx": 45.0, "gy": -30.0, "gz": 12.0,
            "hr": 110, "spo2": 88, "gas": 8.0
        });
        match fields {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HardwareReading {
    pub fields: SensorFields,
    pub received_at: OffsetDateTime,
    pub push_count: u64,
}

fn string_field(payload: &Payload, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

fn counter_field(payload: &Payload, key: &str) -> u64 {
    payload
        .get(key)
        .and_then(as_integer)
        .and_then(|v| u64::try_from(v).ok())
        .unwrap_or(0)
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|f: &f64| f.is_finite())
}
