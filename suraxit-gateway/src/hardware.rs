/**
 * HARDWARE FRESHNESS STORE - Dernière lecture poussée par le capteur
 *
 * RÔLE : Conserve UNE seule lecture (pas d'historique), son heure d'arrivée
 * et un compteur de push. Deux seuils de fraîcheur différents sont appliqués
 * sur la même lecture : 5s pour l'affichage dashboard, 10s pour "en ligne".
 *
 * CONCURRENCE : un seul Mutex, indépendant du MeshRegistry.
 */

use crate::models::{HardwareReading, SensorFields};
use parking_lot::Mutex;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

pub const DASHBOARD_MAX_AGE: Duration = Duration::seconds(5);
pub const ONLINE_MAX_AGE: Duration = Duration::seconds(10);

#[derive(Debug, Clone, PartialEq)]
pub enum Freshness {
    Fresh(HardwareReading),
    /// Une lecture existe mais elle est trop vieille pour ce seuil.
    Stale { push_count: u64 },
    NeverReceived,
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh(_))
    }

    pub fn into_reading(self) -> Option<HardwareReading> {
        match self {
            Freshness::Fresh(reading) => Some(reading),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Slot {
    latest: Option<(SensorFields, OffsetDateTime)>,
    push_count: u64,
}

#[derive(Debug, Default)]
pub struct HardwareFreshnessStore {
    slot: Mutex<Slot>,
}

pub type SharedHardwareStore = Arc<HardwareFreshnessStore>;

impl HardwareFreshnessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remplace la lecture et retourne le nouveau `push_count`.
    pub fn update(&self, fields: SensorFields, now: OffsetDateTime) -> u64 {
        let mut slot = self.slot.lock();
        slot.latest = Some((fields, now));
        slot.push_count += 1;
        slot.push_count
    }

    pub fn get(&self, max_age: Duration, now: OffsetDateTime) -> Freshness {
        let slot = self.slot.lock();
        match &slot.latest {
            None => Freshness::NeverReceived,
            Some((fields, received_at)) if now - *received_at < max_age => {
                Freshness::Fresh(HardwareReading {
                    fields: fields.clone(),
                    received_at: *received_at,
                    push_count: slot.push_count,
                })
            }
            Some(_) => Freshness::Stale { push_count: slot.push_count },
        }
    }

    pub fn is_online(&self, now: OffsetDateTime) -> bool {
        self.get(ONLINE_MAX_AGE, now).is_fresh()
    }

    pub fn push_count(&self) -> u64 {
        self.slot.lock().push_count
    }
}
