use anyhow::{Context, Result};
use fieldmesh::agent::AgentState;
use fieldmesh::config;
use sensor_agent::{run_agent, AgentSettings};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sensor_agent=info,fieldmesh=info".into()),
        )
        .init();

    let settings = AgentSettings::from_env().context("Invalid agent settings")?;
    let config = config::load_from_env().context("Failed to load configuration")?;

    let profile = *config.categories.get(settings.category);
    let state = AgentState::new(
        settings.category,
        settings.coordinate,
        profile.random_measurement(),
        profile,
        config.agent,
    );

    info!(
        relay = %settings.relay_addr,
        category = %settings.category,
        coordinate = %settings.coordinate,
        measurement = state.measurement(),
        min = profile.min,
        max = profile.max,
        interval_seconds = profile.interval_seconds,
        "Sensor agent starting..."
    );

    let stream = TcpStream::connect(&settings.relay_addr)
        .await
        .with_context(|| format!("Could not connect to relay at {}", settings.relay_addr))?;
    let (reader, writer) = stream.into_split();

    run_agent(reader, writer, Arc::new(Mutex::new(state)))
        .await
        .context("Sensor agent stopped")?;

    Ok(())
}
