/*!
Client HTTP de développement pour la passerelle Suraxit

Utilisé par le simulateur de nœuds et par les tests d'intégration.
Chaque échange est enregistré pour pouvoir faire des assertions dessus.
*/

use crate::payloads::SuraxitPayloadBuilder;
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Exchange {
    pub method: &'static str,
    pub path: String,
    pub status: u16,
    pub body: Value,
}

/// Réponse décodée (corps non-JSON = `Value::Null`).
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReply {
    pub status: u16,
    pub body: Value,
}

impl GatewayReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_blackout(&self) -> bool {
        self.status == 503
    }
}

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    exchanges: Arc<Mutex<Vec<Exchange>>>,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            exchanges: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get_json(&self, path: &str) -> Result<GatewayReply> {
        let response = self.http.get(self.url(path)).send().await.with_context(|| format!("GET {path}"))?;
        self.record("GET", path, response).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Result<GatewayReply> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path}"))?;
        self.record("POST", path, response).await
    }

    /// POST d'un corps brut, sans Content-Type (comme le firmware).
    pub async fn post_raw(&self, path: &str, body: impl Into<String>) -> Result<GatewayReply> {
        let response = self
            .http
            .post(self.url(path))
            .body(body.into())
            .send()
            .await
            .with_context(|| format!("POST {path}"))?;
        self.record("POST", path, response).await
    }

    pub async fn push_reading(&self, reading: &Value) -> Result<GatewayReply> {
        self.post_json("/api/sensors/push", reading).await
    }

    pub async fn heartbeat(&self, heartbeat: &Value) -> Result<GatewayReply> {
        self.post_json("/api/mesh/heartbeat", heartbeat).await
    }

    pub async fn relay_emergency(&self, packet: &Value) -> Result<GatewayReply> {
        self.post_json("/api/emergency/relay", packet).await
    }

    pub async fn toggle_blackout(&self, duration_secs: f64) -> Result<GatewayReply> {
        self.post_json("/api/simulate/blackout", &SuraxitPayloadBuilder::blackout(duration_secs)).await
    }

    pub async fn simulate_fall(&self) -> Result<GatewayReply> {
        self.post_raw("/api/simulate/fall", "").await
    }

    pub async fn mesh_status(&self) -> Result<GatewayReply> {
        self.get_json("/api/mesh/status").await
    }

    pub async fn sensors(&self) -> Result<GatewayReply> {
        self.get_json("/api/sensors").await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn record(&self, method: &'static str, path: &str, response: reqwest::Response) -> Result<GatewayReply> {
        let status = response.status().as_u16();
        let bytes = response.bytes().await.with_context(|| format!("{method} {path}: reading body"))?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        log::debug!("[client] {method} {path} -> {status}");
        self.lock_exchanges().push(Exchange { method, path: path.to_string(), status, body: body.clone() });
        Ok(GatewayReply { status, body })
    }

    fn lock_exchanges(&self) -> std::sync::MutexGuard<'_, Vec<Exchange>> {
        self.exchanges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn exchanges(&self) -> Vec<Exchange> {
        self.lock_exchanges().clone()
    }

    pub fn find_exchanges_by_path(&self, path: &str) -> Vec<Exchange> {
        self.lock_exchanges().iter().filter(|e| e.path == path).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock_exchanges().clear();
    }
}
