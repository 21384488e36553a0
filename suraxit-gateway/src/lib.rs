//! Passerelle Suraxit : ingestion des capteurs portés, état du réseau mesh,
//! simulation de blackout et journal des urgences relayées.

pub mod clock;
pub mod config;
pub mod error;
pub mod hardware;
pub mod health;
pub mod http;
pub mod ingest;
pub mod mesh;
pub mod models;
pub mod predictor;
pub mod simulator;

use std::sync::Arc;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use http::{build_router, AppState};
pub use ingest::IngestGateway;
pub use predictor::SharedPredictor;

/// Assemble l'état applicatif avec des stores vides.
pub fn build_app_state(predictor: SharedPredictor, clock: SharedClock, default_blackout_secs: f64) -> AppState {
    let ingest = IngestGateway::new(
        Arc::new(mesh::MeshRegistry::new()),
        Arc::new(hardware::HardwareFreshnessStore::new()),
        predictor,
    );
    AppState {
        ingest,
        health_tracker: health::HealthTracker::new(),
        simulator: Arc::new(simulator::SensorSimulator::new(clock.now())),
        clock,
        default_blackout_secs,
    }
}
