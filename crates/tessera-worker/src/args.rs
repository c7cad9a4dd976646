use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "tessera-worker", about = "Demo inference worker")]
pub struct Args {
    #[arg(long, env = "TESSERA_WORKER_ADDR", default_value = "0.0.0.0:8081")]
    pub listen_addr: String,

    /// Host the controller should use to reach this worker.
    #[arg(long, env = "TESSERA_WORKER_HOST", default_value = "localhost")]
    pub advertise_host: String,

    #[arg(long, env = "TESSERA_CONTROLLER_URL", default_value = "http://localhost:8080")]
    pub controller_url: String,

    /// Defaults to `worker_<hostname>_<random>`.
    #[arg(long, env = "TESSERA_NODE_ID")]
    pub node_id: Option<String>,

    #[arg(long, env = "TESSERA_HEARTBEAT_INTERVAL_MS", default_value_t = 10_000)]
    pub heartbeat_interval_ms: u64,

    /// Defaults to the number of available CPUs.
    #[arg(long, env = "TESSERA_CPU_CORES")]
    pub cpu_cores: Option<u32>,

    /// Presence implies a GPU is available.
    #[arg(long, env = "TESSERA_GPU_MEMORY_BYTES")]
    pub gpu_memory_bytes: Option<u64>,

    #[arg(long, env = "TESSERA_CONTEXT_LENGTH", default_value_t = 2048)]
    pub max_context_length: u32,

    #[arg(
        long,
        env = "TESSERA_SUPPORTED_MODELS",
        value_delimiter = ',',
        default_value = "llama-2-7b,mistral-7b"
    )]
    pub supported_models: Vec<String>,

    /// Serve 404 on `/inference/stream` so the controller synthesizes streams.
    #[arg(long, env = "TESSERA_NO_STREAM", default_value_t = false)]
    pub no_stream: bool,

    #[arg(long, env = "TESSERA_STREAM_DELAY_MS", default_value_t = 50)]
    pub stream_delay_ms: u64,

    #[arg(long, env = "TESSERA_STREAM_JITTER_MS", default_value_t = 100)]
    pub stream_jitter_ms: u64,

    /// text | json
    #[arg(long, env = "TESSERA_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[arg(long, env = "TESSERA_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    #[arg(long, env = "TESSERA_OTLP_TOKEN")]
    pub otlp_token: Option<String>,
}
