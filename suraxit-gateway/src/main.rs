/**
 * SURAXIT GATEWAY - Point d'entrée du serveur
 *
 * RÔLE : config, logs, choix du prédicteur, stores, puis serveur HTTP.
 * Tout l'état est en mémoire : un redémarrage repart de zéro.
 */

use anyhow::Context;
use std::sync::Arc;
use suraxit_gateway::{build_app_state, build_router, config::load_config, predictor::select_predictor, SystemClock};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    let cfg = load_config().await;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cfg.log_filter.as_str().into()),
        )
        .init();

    let predictor = select_predictor(cfg.model_path.as_deref());
    let app_state = build_app_state(predictor, Arc::new(SystemClock), cfg.default_blackout_secs);
    let app = build_router(app_state);

    let addr = cfg.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("[gateway] listening on http://{addr}");
    axum::serve(listener, app).await.context("http server")?;
    Ok(())
}
