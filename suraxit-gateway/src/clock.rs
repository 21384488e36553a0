/**
 * CLOCK - Source de temps injectée dans la passerelle
 *
 * RÔLE : Les handlers lisent l'heure une seule fois à la frontière HTTP puis
 * la passent en paramètre aux stores. Aucun store ne lit l'horloge lui-même.
 *
 * UTILITÉ : fenêtres de fraîcheur et expiration du blackout testables
 * sans dormir (ManualClock).
 */

use parking_lot::Mutex;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

pub type SharedClock = Arc<dyn Clock>;

/// Horloge murale UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Horloge pilotée à la main (tests, simulations).
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, at: OffsetDateTime) {
        *self.now.lock() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock()
    }
}

/// Secondes UNIX en flottant, format attendu par le dashboard.
pub fn unix_seconds(t: OffsetDateTime) -> f64 {
    t.unix_timestamp_nanos() as f64 / 1_000_000_000.0
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Sérialisation `OffsetDateTime` -> secondes UNIX (f64).
pub mod epoch_seconds {
    use serde::Serializer;
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(t: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(super::unix_seconds(*t))
    }
}
