use anyhow::{Context, Result};
use fieldmesh::config;
use fieldmesh::metrics::{run_metrics_reporter, RelayMetrics};
use fieldmesh::relay::RelayServer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldmesh=info".into()),
        )
        .init();

    info!("Fieldmesh relay starting...");

    let mut config = config::load_from_env().context("Failed to load configuration")?;
    config
        .relay
        .apply_env()
        .context("Invalid relay environment override")?;

    info!(
        address_family = ?config.relay.address_family,
        port = config.relay.port,
        capacity_per_category = config.relay.capacity_per_category,
        echo_policy = ?config.relay.echo_policy,
        "Configuration loaded"
    );

    let metrics = RelayMetrics::new();
    let server = RelayServer::bind(&config.relay, metrics.clone()).await?;
    info!(address = %server.local_addr()?, "Relay bound");

    let reporter = tokio::spawn(run_metrics_reporter(
        metrics,
        server.registry(),
        config.metrics.report_interval_seconds,
    ));

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl_c signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    reporter.abort();
    info!("Relay stopped");

    Ok(())
}
