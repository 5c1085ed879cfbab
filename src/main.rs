//! Mutual-Topic Monitor — Binary Entrypoint
//! Loads configuration, wires the transport and oracle adapters, and runs
//! the monitoring loop until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mutual_topic_monitor::config;
use mutual_topic_monitor::monitor::{MonitorLoop, MonitorState};
use mutual_topic_monitor::oracle::{CorrelationClient, OpenAiOracle};
use mutual_topic_monitor::poll::Poller;
use mutual_topic_monitor::registry::SourceRegistry;
use mutual_topic_monitor::report::ConsoleReporter;
use mutual_topic_monitor::transport::HttpFetchAdapter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mutual_topic_monitor=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    dotenvy::dotenv().ok();
    init_tracing();

    // Configuration errors are fatal at startup; nothing starts half-wired.
    let cfg = config::load_default().context("loading monitor configuration")?;
    let creds = config::load_credentials().context("loading credentials from environment")?;
    let registry = SourceRegistry::new(cfg.sources.clone())?;

    tracing::info!(model = %cfg.oracle_model, "using correlation oracle");

    let adapter = Arc::new(HttpFetchAdapter::new(
        cfg.transport_base_url.clone(),
        creds.transport_token,
    ));
    let oracle = Arc::new(OpenAiOracle::new(
        creds.oracle_api_key,
        cfg.oracle_model.clone(),
    ));

    let poller = Poller::new(
        adapter,
        cfg.max_per_check,
        cfg.interval(),
        cfg.backoff_ceiling(),
    );
    let correlation = CorrelationClient::new(oracle, cfg.confidence_floor);
    let state = MonitorState::new(registry);
    let monitor = MonitorLoop::new(
        state,
        poller,
        correlation,
        Arc::new(ConsoleReporter),
        cfg.interval(),
    );

    // Cooperative shutdown on Ctrl-C.
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = stop_tx.send(true);
        }
    });

    monitor.run(stop_rx).await;
    Ok(())
}
