//! Prometheus exporter for BT Smart Hub statistics.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use smarthub_exporter_prometheus::{ExporterConfig, HttpServer, MetricCollector, RouterClient};

/// Prometheus exporter for BT Smart Hub statistics.
#[derive(Parser, Debug)]
#[command(name = "smarthub-exporter-prometheus")]
#[command(about = "Export BT Smart Hub WAN and LAN statistics as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// Router host name or address (overrides config).
    #[arg(long, env = "SMARTHUB_HOST")]
    host: Option<String>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error; overrides config).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::load_from_file(config_path)?
    } else {
        ExporterConfig::default()
    };

    if let Some(host) = args.host {
        config.router.host = host;
    }
    if let Some(listen) = args.listen {
        config.prometheus.listen = listen;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    config.validate()?;
    smarthub_common::init_tracing(&config.logging)?;

    info!(router = %config.router.host, "Starting Smart Hub Prometheus exporter");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let client = RouterClient::new(&config.router)?;
    let collector = Arc::new(MetricCollector::new(
        client,
        config.prometheus.clone(),
        &config.filters,
        config.router.scrape_lan,
    ));

    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let http_server = HttpServer::new(
        collector.clone(),
        listen_addr,
        config.prometheus.path.clone(),
    );

    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    shutdown_tx.send(true)?;

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    let stats = collector.stats();
    info!(
        scrapes = stats.scrapes,
        wan_failures = stats.wan_failures,
        lan_failures = stats.lan_failures,
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

/// Resolves on SIGTERM. Never resolves where SIGTERM doesn't exist or the
/// handler can't be installed.
async fn terminate() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                return;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    }

    std::future::pending::<()>().await;
}
