mod args;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use tessera_common::sse::Jitter;
use tessera_controller::strategy::parse_strategy;
use tessera_controller::{
    app, AppState, HealthMonitor, HttpHealthProbe, LoadBalancer, NodeRegistry, RequestRouter,
    StreamingRelay, WorkerClient,
};

use crate::args::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let otel_provider = tessera_common::telemetry::init_tracing(
        "tessera-controller",
        args.otlp_endpoint.as_deref(),
        args.otlp_token.as_deref(),
        &args.log_format,
    );

    let strategy = parse_strategy(&args.strategy).map_err(|e| {
        tracing::error!(error=%e, "invalid selection strategy");
        anyhow::anyhow!(e)
    })?;

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| {
            tracing::error!(error=%e, "failed to build reqwest client");
            e
        })?;

    let registry = NodeRegistry::new(Duration::from_millis(args.liveness_window_ms));

    let workers = WorkerClient::new(
        http.clone(),
        Duration::from_millis(args.request_timeout_ms),
        Duration::from_millis(args.stream_timeout_ms),
    );
    let relay = StreamingRelay::new(
        workers.clone(),
        Jitter::from_millis(args.synth_delay_ms, args.synth_jitter_ms),
    );
    let balancer = LoadBalancer::new(registry.clone(), strategy);
    let router = Arc::new(RequestRouter::new(balancer, workers, relay));

    let shutdown = CancellationToken::new();
    let probe_timeout = Duration::from_millis(args.probe_timeout_ms);
    let monitor = HealthMonitor::new(
        registry.clone(),
        Arc::new(HttpHealthProbe::new(http)),
        Duration::from_millis(args.health_check_interval_ms),
        probe_timeout,
    );
    let monitor_handle = monitor.spawn(shutdown.clone());

    let st = AppState { registry, router };

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    tracing::info!(addr=%args.listen_addr, strategy=%args.strategy, "tessera controller listening");

    let signal = shutdown.clone();
    axum::serve(listener, app(st))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = monitor_handle.await {
        tracing::warn!(error=%e, "health monitor task ended abnormally");
    }
    if let Some(provider) = otel_provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to shut down tracer provider: {e}");
        }
    }
    Ok(())
}
