//! Nœud relais : reçoit les urgences sur le lien ESP-NOW simulé et les
//! transmet à la passerelle par son propre Wi-Fi (chemin orphelin).

use std::collections::VecDeque;
use std::time::Duration;
use suraxit_devkit::protocol::{DEDUP_TABLE_SIZE, HEARTBEAT_INTERVAL_MS, MAX_HOP_COUNT};
use suraxit_devkit::{AlertType, EmergencyPacket, GatewayClient, SuraxitPayloadBuilder};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Derniers (origine, timestamp) vus, éviction FIFO.
#[derive(Debug)]
pub struct DedupTable {
    entries: VecDeque<(String, u32)>,
    capacity: usize,
}

impl DedupTable {
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::with_capacity(capacity), capacity }
    }

    /// Vrai si déjà vu ; sinon mémorise le paquet.
    pub fn check_and_insert(&mut self, packet: &EmergencyPacket) -> bool {
        let (origin, timestamp) = packet.dedup_key();
        if self.entries.iter().any(|(o, t)| o == origin && *t == timestamp) {
            return true;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((origin.to_string(), timestamp));
        false
    }
}

#[derive(Debug, PartialEq)]
pub enum RelayDecision {
    Forward(EmergencyPacket),
    Duplicate,
    HopLimit,
}

pub struct RelayNode {
    mac: String,
    dedup: DedupTable,
    total_relayed: u64,
    total_heartbeats: u64,
}

impl RelayNode {
    pub fn new(mac: impl Into<String>) -> Self {
        Self { mac: mac.into(), dedup: DedupTable::new(DEDUP_TABLE_SIZE), total_relayed: 0, total_heartbeats: 0 }
    }

    pub fn accept(&mut self, mut packet: EmergencyPacket) -> RelayDecision {
        if self.dedup.check_and_insert(&packet) {
            return RelayDecision::Duplicate;
        }
        if packet.hop_count >= MAX_HOP_COUNT {
            return RelayDecision::HopLimit;
        }
        packet.hop_count += 1;
        packet.relay_mac = self.mac.clone();
        packet.is_orphan = true;
        RelayDecision::Forward(packet)
    }

    async fn forward(&mut self, client: &GatewayClient, packet: EmergencyPacket) {
        match client.relay_emergency(&SuraxitPayloadBuilder::emergency(&packet)).await {
            Ok(reply) if reply.is_success() => {
                self.total_relayed += 1;
                warn!(
                    origin = %packet.origin_mac,
                    alert = ?AlertType::from_code(packet.alert_type),
                    hops = packet.hop_count,
                    emergency_id = %reply.body["emergency_id"],
                    "[relay] emergency forwarded to gateway"
                );
            }
            Ok(reply) => warn!(status = reply.status, "[relay] gateway refused emergency"),
            Err(e) => warn!(error = %e, "[relay] gateway unreachable, emergency dropped"),
        }
    }

    async fn heartbeat(&mut self, client: &GatewayClient) {
        self.total_heartbeats += 1;
        let hb = SuraxitPayloadBuilder::heartbeat("relay", &self.mac, -55, 100, self.total_relayed, self.total_heartbeats);
        if let Err(e) = client.heartbeat(&hb).await {
            debug!(error = %e, "[relay] heartbeat failed");
        }
    }

    pub async fn run(mut self, client: GatewayClient, mut espnow: mpsc::Receiver<EmergencyPacket>) {
        info!(mac = %self.mac, "[relay] listening on simulated ESP-NOW link");
        let mut ticker = tokio::time::interval(Duration::from_millis(HEARTBEAT_INTERVAL_MS));

        loop {
            tokio::select! {
                _ = ticker.tick() => self.heartbeat(&client).await,
                packet = espnow.recv() => {
                    let Some(packet) = packet else {
                        info!("[relay] ESP-NOW link closed");
                        return;
                    };
                    match self.accept(packet) {
                        RelayDecision::Forward(packet) => self.forward(&client, packet).await,
                        RelayDecision::Duplicate => debug!("[relay] duplicate packet dropped"),
                        RelayDecision::HopLimit => warn!("[relay] hop limit reached, packet dropped"),
                    }
                }
            }
        }
    }
}
