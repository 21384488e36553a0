//! Lectures synthétiques d'un porteur au repos (léger balancement + bruit),
//! utilisées par `GET /api/predict` quand on veut une prédiction sans matériel.

use crate::clock::{round_to, unix_seconds};
use crate::models::{Acceleration, AngularRate};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize)]
pub struct SimulatedReading {
    pub accelerometer: Acceleration,
    pub gyroscope: AngularRate,
    pub spo2: i64,
    pub heart_rate: i64,
    pub gas_ppm: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: f64,
}

pub struct SensorSimulator {
    start: OffsetDateTime,
    rng: Mutex<StdRng>,
}

impl SensorSimulator {
    pub fn new(start: OffsetDateTime) -> Self {
        Self { start, rng: Mutex::new(StdRng::from_entropy()) }
    }

    pub fn with_seed(start: OffsetDateTime, seed: u64) -> Self {
        Self { start, rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    pub fn reading(&self, now: OffsetDateTime) -> SimulatedReading {
        let t = (now - self.start).as_seconds_f64();
        let mut rng = self.rng.lock();
        let mut noise = |std_dev: f64| rng.sample::<f64, _>(StandardNormal) * std_dev;

        let accelerometer = Acceleration::new(
            round_to(0.02 * (t * 0.5).sin() + noise(0.005), 4),
            round_to(-0.01 * (t * 0.3).cos() + noise(0.005), 4),
            round_to(1.0 + 0.005 * (t * 0.7).sin() + noise(0.002), 4),
        );
        let gyroscope = AngularRate::new(
            round_to(noise(0.3), 2),
            round_to(noise(0.3), 2),
            round_to(noise(0.15), 2),
        );

        SimulatedReading {
            accelerometer,
            gyroscope,
            spo2: (97.0 + noise(0.8)).clamp(90.0, 100.0) as i64,
            heart_rate: (72.0 + noise(3.0)).clamp(55.0, 120.0) as i64,
            gas_ppm: round_to((12.0 + noise(2.0)).clamp(0.0, 100.0), 1),
            temperature: round_to((28.5 + noise(0.5)).clamp(20.0, 50.0), 1),
            humidity: round_to((55.0 + noise(3.0)).clamp(20.0, 100.0), 1),
            timestamp: unix_seconds(now),
        }
    }
}
