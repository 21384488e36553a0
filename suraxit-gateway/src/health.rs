use crate::clock::round_to;
use crate::mesh::MeshRegistry;
use crate::predictor::FallPredictor;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayHealth {
    pub status: String,
    pub model_loaded: bool,
    pub predictor: String,
    /// Secondes depuis le démarrage, arrondi à 0.1.
    pub uptime: f64,
    pub nodes_tracked: usize,
    pub emergencies_recorded: u64,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn get_health(&self, predictor: &dyn FallPredictor, mesh: &MeshRegistry) -> GatewayHealth {
        GatewayHealth {
            status: "ok".to_string(),
            model_loaded: predictor.model_loaded(),
            predictor: predictor.name().to_string(),
            uptime: round_to(self.start_time.elapsed().as_secs_f64(), 1),
            nodes_tracked: mesh.node_count(),
            emergencies_recorded: mesh.emergencies_recorded(),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return (kb as f32) / 1024.0;
            }
        }
    }

    // approximation hors Linux
    12.0
}
