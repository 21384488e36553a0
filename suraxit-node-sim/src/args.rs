use clap::Parser;

/// Simule un nœud capteur porté et un nœud relais face à la passerelle.
#[derive(Debug, Parser)]
pub struct Args {
    #[arg(long, env = "SURAXIT_GATEWAY_URL", default_value = "http://127.0.0.1:3000")]
    pub gateway: String,

    #[arg(long, default_value = "AA:BB:CC:00:00:01")]
    pub sensor_mac: String,

    #[arg(long, default_value = "AA:BB:CC:00:00:02")]
    pub relay_mac: String,

    /// Une lecture de chute tous les N pushs (0 = jamais).
    #[arg(long, default_value_t = 0)]
    pub fall_every: u64,

    /// Durée de la simulation (0 = jusqu'à Ctrl-C).
    #[arg(long, default_value_t = 0)]
    pub duration_secs: u64,
}
