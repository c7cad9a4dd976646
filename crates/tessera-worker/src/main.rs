mod args;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use tessera_common::sse::Jitter;
use tessera_common::{NodeAddress, NodeCapabilities};
use tessera_worker::{app, heartbeat_loop, AppState, DemoEngine, HostMonitor, NodeIdentity};

use crate::args::Args;

fn generate_node_id(fallback_host: &str) -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| fallback_host.to_string());
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("worker_{}_{}", host, suffix.to_lowercase())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let otel_provider = tessera_common::telemetry::init_tracing(
        "tessera-worker",
        args.otlp_endpoint.as_deref(),
        args.otlp_token.as_deref(),
        &args.log_format,
    );

    let listen: SocketAddr = args
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address '{}'", args.listen_addr))?;

    let node_id = args
        .node_id
        .clone()
        .unwrap_or_else(|| generate_node_id(&args.advertise_host));

    let host = Arc::new(HostMonitor::new());
    let cpu_cores = args.cpu_cores.unwrap_or_else(|| host.cpu_cores().max(1));
    let sample = host.sample();

    let identity = NodeIdentity {
        id: node_id.clone(),
        address: NodeAddress {
            host: args.advertise_host.clone(),
            port: listen.port(),
        },
        capabilities: NodeCapabilities {
            cpu_cores,
            ram_total_bytes: sample.ram_total_bytes,
            ram_available_bytes: sample.ram_available_bytes,
            gpu_available: args.gpu_memory_bytes.is_some(),
            gpu_memory_bytes: args.gpu_memory_bytes,
            max_context_length: args.max_context_length,
            supported_models: args.supported_models.iter().cloned().collect(),
        },
    };

    tracing::info!(
        node_id=%node_id,
        controller=%args.controller_url,
        cpu_cores,
        ram_total_bytes = sample.ram_total_bytes,
        streaming=!args.no_stream,
        "tessera worker starting"
    );

    let engine = Arc::new(DemoEngine::new());
    let st = AppState {
        node_id: node_id.clone(),
        engine: engine.clone(),
        host: host.clone(),
        jitter: Jitter::from_millis(args.stream_delay_ms, args.stream_jitter_ms),
        streaming: !args.no_stream,
    };

    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(addr=%listen, "worker listening");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("failed to build reqwest client")?;

    let shutdown = CancellationToken::new();
    let heartbeat = tokio::spawn(heartbeat_loop(
        http,
        args.controller_url.clone(),
        identity,
        engine,
        host,
        Duration::from_millis(args.heartbeat_interval_ms),
        shutdown.clone(),
    ));

    let signal = shutdown.clone();
    axum::serve(listener, app(st))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down gracefully");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = heartbeat.await;
    if let Some(provider) = otel_provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to shut down tracer provider: {e}");
        }
    }
    Ok(())
}
