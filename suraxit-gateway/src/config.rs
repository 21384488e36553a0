use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::{Path, PathBuf}};
use tokio::fs;
use tracing::{info, warn};

/// Borne haute d'une fenêtre de blackout (une journée).
pub const MAX_BLACKOUT_SECS: f64 = 86_400.0;
pub const DEFAULT_BLACKOUT_SECS: f64 = 30.0;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen: ListenConf,
    /// Modèle dense exporté en JSON ; absent = détection par seuils.
    pub model_path: Option<PathBuf>,
    pub default_blackout_secs: f64,
    pub log_filter: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ListenConf {
    pub host: String,
    pub port: u16,
}

impl Default for ListenConf {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 3000 }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: ListenConf::default(),
            model_path: Some(PathBuf::from("model.json")),
            default_blackout_secs: DEFAULT_BLACKOUT_SECS,
            log_filter: "info,tower_http=debug".into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address {0}")]
    InvalidAddress(String),
}

impl GatewayConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.listen.host, self.listen.port);
        raw.parse().map_err(|_| ConfigError::InvalidAddress(raw))
    }

    pub fn parse_yaml(txt: &str) -> Self {
        if txt.trim().is_empty() {
            return Self::default();
        }
        let cfg: Self = serde_yaml::from_str(txt).unwrap_or_else(|e| {
            warn!(error = %e, "[gateway] invalid config, using defaults");
            Self::default()
        });
        cfg.sanitized()
    }

    /// Durée de blackout par défaut hors de [0, MAX_BLACKOUT_SECS] : retour à 30 s.
    fn sanitized(mut self) -> Self {
        let secs = self.default_blackout_secs;
        if !(secs.is_finite() && (0.0..=MAX_BLACKOUT_SECS).contains(&secs)) {
            warn!(value = secs, "[gateway] invalid default_blackout_secs, using {DEFAULT_BLACKOUT_SECS}");
            self.default_blackout_secs = DEFAULT_BLACKOUT_SECS;
        }
        self
    }

    /// Surcharges par variables d'environnement (`SURAXIT_PORT`, `SURAXIT_MODEL_PATH`).
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(port) = std::env::var("SURAXIT_PORT") {
            match port.parse() {
                Ok(p) => self.listen.port = p,
                Err(_) => warn!(value = %port, "[gateway] ignoring invalid SURAXIT_PORT"),
            }
        }
        if let Ok(path) = std::env::var("SURAXIT_MODEL_PATH") {
            self.model_path = if path.trim().is_empty() { None } else { Some(PathBuf::from(path)) };
        }
        self
    }
}

pub async fn load_config() -> GatewayConfig {
    let path = std::env::var("SURAXIT_GATEWAY_CONFIG").unwrap_or_else(|_| "gateway.yaml".into());
    let cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        info!(path = %path, "[gateway] loaded config");
        GatewayConfig::parse_yaml(&txt)
    } else {
        info!(path = %path, "[gateway] no config file, using defaults");
        GatewayConfig::default()
    };
    cfg.apply_env_overrides()
}
