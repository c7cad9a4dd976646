use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "tessera-controller", about = "Cluster controller and inference router")]
pub struct Args {
    #[arg(long, env = "TESSERA_CONTROLLER_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// least_loaded | round_robin | capacity_based | latency_optimized
    #[arg(long, env = "TESSERA_STRATEGY", default_value = "least_loaded")]
    pub strategy: String,

    #[arg(long, env = "TESSERA_HEALTH_CHECK_INTERVAL_MS", default_value_t = 5_000)]
    pub health_check_interval_ms: u64,

    #[arg(long, env = "TESSERA_PROBE_TIMEOUT_MS", default_value_t = 3_000)]
    pub probe_timeout_ms: u64,

    /// A node that neither registers nor passes a probe for this long goes offline.
    #[arg(long, env = "TESSERA_LIVENESS_WINDOW_MS", default_value_t = 30_000)]
    pub liveness_window_ms: u64,

    #[arg(long, env = "TESSERA_REQUEST_TIMEOUT_MS", default_value_t = 60_000)]
    pub request_timeout_ms: u64,

    #[arg(long, env = "TESSERA_STREAM_TIMEOUT_MS", default_value_t = 120_000)]
    pub stream_timeout_ms: u64,

    /// Base per-piece delay of synthesized streams.
    #[arg(long, env = "TESSERA_SYNTH_DELAY_MS", default_value_t = 50)]
    pub synth_delay_ms: u64,

    #[arg(long, env = "TESSERA_SYNTH_JITTER_MS", default_value_t = 50)]
    pub synth_jitter_ms: u64,

    /// text | json
    #[arg(long, env = "TESSERA_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[arg(long, env = "TESSERA_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "TESSERA_OTLP_TOKEN")]
    pub otlp_token: Option<String>,
}
