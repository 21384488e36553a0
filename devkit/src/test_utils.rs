/*!
Test Harness pour la passerelle Suraxit

Facilite l'écriture de tests d'intégration avec:
- Démarrage d'un Router axum sur un port éphémère local
- Client HTTP qui enregistre les échanges
- Assertions sur les champs JSON imbriqués (`nodes.0.mac`)
*/

use crate::gateway_client::{GatewayClient, GatewayReply};
use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Harness de test : un serveur réel + un client
pub struct TestHarness {
    pub client: GatewayClient,
    pub addr: SocketAddr,
    server: JoinHandle<()>,
}

impl TestHarness {
    /// Sert `app` sur 127.0.0.1:0 jusqu'au drop du harness
    pub async fn spawn(app: axum::Router) -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("[harness] server stopped: {e}");
            }
        });

        log::info!("[harness] gateway under test on http://{addr}");
        Ok(Self { client: GatewayClient::new(format!("http://{addr}"))?, addr, server })
    }

    /// Interroge `path` jusqu'à ce que `predicate` accepte la réponse
    pub async fn wait_for<F>(&self, path: &str, timeout_ms: u64, predicate: F) -> Result<Option<GatewayReply>>
    where
        F: Fn(&GatewayReply) -> bool,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            let reply = self.client.get_json(path).await?;
            if predicate(&reply) {
                return Ok(Some(reply));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        log::warn!("[harness] timeout waiting on {path}");
        Ok(None)
    }

    /// Assert qu'un champ existe
    pub fn assert_field_exists(&self, value: &Value, field_path: &str) -> Result<()> {
        if self.get_nested_field(value, field_path).is_some() {
            return Ok(());
        }
        anyhow::bail!("Field '{}' not found in {}", field_path, value);
    }

    /// Assert qu'un champ a une valeur spécifique
    pub fn assert_field_equals(&self, value: &Value, field_path: &str, expected: &Value) -> Result<()> {
        match self.get_nested_field(value, field_path) {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => anyhow::bail!("Field '{}' mismatch: expected {}, got {}", field_path, expected, actual),
            None => anyhow::bail!("Field '{}' not found for comparison in {}", field_path, value),
        }
    }

    /// Chemin pointé ; un segment numérique indexe un tableau
    pub fn get_nested_field<'a>(&self, value: &'a Value, path: &str) -> Option<&'a Value> {
        let mut current = value;

        for part in path.split('.') {
            current = match current {
                Value::Object(obj) => obj.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }

    /// Stats sur les échanges collectés
    pub fn get_stats(&self) -> TestStats {
        let exchanges = self.client.exchanges();
        let mut path_counts = HashMap::new();
        let mut status_counts = HashMap::new();

        for exchange in &exchanges {
            *path_counts.entry(exchange.path.clone()).or_insert(0) += 1;
            *status_counts.entry(exchange.status).or_insert(0) += 1;
        }

        TestStats { total_requests: exchanges.len(), path_counts, status_counts }
    }

    /// Reset des échanges enregistrés (l'état serveur est conservé)
    pub fn reset(&self) {
        self.client.clear();
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.server.abort();
    }
}

#[derive(Debug)]
pub struct TestStats {
    pub total_requests: usize,
    pub path_counts: HashMap<String, usize>,
    pub status_counts: HashMap<u16, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::json;

    fn echo_app() -> Router {
        Router::new().route(
            "/api/mesh/status",
            get(|| async { Json(json!({"nodes": [{"mac": "BB:02", "online": true}], "mesh_active": true})) }),
        )
    }

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let harness = TestHarness::spawn(echo_app()).await.unwrap();
        let reply = harness.client.mesh_status().await.unwrap();
        assert_eq!(reply.status, 200);

        harness.assert_field_equals(&reply.body, "nodes.0.mac", &json!("BB:02")).unwrap();
        harness.assert_field_exists(&reply.body, "mesh_active").unwrap();
        assert!(harness.assert_field_exists(&reply.body, "nodes.3.mac").is_err());
        assert!(harness.assert_field_equals(&reply.body, "mesh_active", &json!(false)).is_err());

        let reply = harness.client.get_json("/missing").await.unwrap();
        assert_eq!(reply.status, 404);

        let stats = harness.get_stats();
        assert_eq!(stats.total_requests, 2);
        assert_eq!(stats.status_counts.get(&404), Some(&1));

        harness.reset();
        assert_eq!(harness.get_stats().total_requests, 0);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let harness = TestHarness::spawn(echo_app()).await.unwrap();
        let found = harness.wait_for("/api/mesh/status", 200, |r| r.body["mesh_active"] == true).await.unwrap();
        assert!(found.is_some());
        let never = harness.wait_for("/api/mesh/status", 150, |r| r.body["mesh_active"] == false).await.unwrap();
        assert!(never.is_none());
    }
}
