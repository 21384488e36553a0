/**
 * SURAXIT NODE SIM - Nœud capteur + nœud relais simulés
 *
 * RÔLE : Reproduit le comportement des deux firmwares face à une passerelle
 * réelle : pushs capteur, heartbeats mesh, bascule blackout et relais
 * d'urgence ESP-NOW (ici un channel tokio en mémoire).
 */

mod args;
mod relay;
mod sensor;

use anyhow::Result;
use args::Args;
use clap::Parser as _;
use relay::RelayNode;
use sensor::SensorNode;
use std::time::Duration;
use suraxit_devkit::protocol::DEDUP_TABLE_SIZE;
use suraxit_devkit::GatewayClient;
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let client = GatewayClient::new(&args.gateway)?;
    info!(gateway = %client.base_url(), "[sim] starting sensor + relay nodes");

    let (espnow_tx, espnow_rx) = mpsc::channel(DEDUP_TABLE_SIZE);
    let sensor = SensorNode::new(&args.sensor_mac, args.fall_every);
    let relay = RelayNode::new(&args.relay_mac);

    tokio::select! {
        _ = sensor.run(client.clone(), espnow_tx) => {}
        _ = relay.run(client, espnow_rx) => {}
        _ = stop_signal(args.duration_secs) => info!("[sim] stopping"),
    }
    Ok(())
}

async fn stop_signal(duration_secs: u64) {
    if duration_secs == 0 {
        tokio::signal::ctrl_c().await.ok();
    } else {
        tokio::time::sleep(Duration::from_secs(duration_secs)).await;
    }
}
