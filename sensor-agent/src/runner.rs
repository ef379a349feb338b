use fieldmesh::agent::AgentState;
use fieldmesh::wire::{read_record, write_record, WireError};
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Agent state shared by the receive and send activities
pub type SharedState = Arc<Mutex<AgentState>>;

/// The agent lost its relay connection. Always fatal; there is no reconnect.
#[derive(Debug)]
pub enum ConnectionLost {
    /// Relay closed the stream
    Closed,
    Read(WireError),
    Write(io::Error),
}

impl fmt::Display for ConnectionLost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionLost::Closed => write!(f, "relay disconnected"),
            ConnectionLost::Read(e) => write!(f, "relay connection lost while reading: {}", e),
            ConnectionLost::Write(e) => write!(f, "relay connection lost while writing: {}", e),
        }
    }
}

impl std::error::Error for ConnectionLost {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConnectionLost::Closed => None,
            ConnectionLost::Read(e) => Some(e),
            ConnectionLost::Write(e) => Some(e),
        }
    }
}

fn lock(state: &SharedState) -> MutexGuard<'_, AgentState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Register with the relay, then receive and report until the connection drops.
///
/// Only returns on connection loss.
pub async fn run_agent<R, W>(reader: R, mut writer: W, state: SharedState) -> Result<(), ConnectionLost>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let registration = lock(&state).report();
    write_record(&mut writer, &registration)
        .await
        .map_err(ConnectionLost::Write)?;
    info!(
        category = %registration.category,
        coordinate = %registration.coordinate,
        measurement = registration.measurement,
        "Registered with relay"
    );

    tokio::select! {
        result = receive_loop(reader, Arc::clone(&state)) => result,
        result = send_loop(writer, Arc::clone(&state)) => result,
    }
}

/// Feed every broadcast into the correction engine
async fn receive_loop<R>(mut reader: R, state: SharedState) -> Result<(), ConnectionLost>
where
    R: AsyncRead + Unpin,
{
    loop {
        let reading = match read_record(&mut reader).await {
            Ok(Some(reading)) => reading,
            Ok(None) => return Err(ConnectionLost::Closed),
            Err(e) if !e.is_fatal() => {
                warn!(error = %e, "Skipping malformed record");
                continue;
            }
            Err(e) => return Err(ConnectionLost::Read(e)),
        };

        let (action, measurement) = {
            let mut agent = lock(&state);
            let action = agent.apply(&reading);
            (action, agent.measurement())
        };

        info!(
            category = %reading.category,
            x = reading.coordinate.x,
            y = reading.coordinate.y,
            measurement = reading.measurement,
            action = %action,
            own_measurement = measurement,
            "Reading received"
        );
    }
}

/// Publish the current measurement once per category interval
async fn send_loop<W>(mut writer: W, state: SharedState) -> Result<(), ConnectionLost>
where
    W: AsyncWrite + Unpin,
{
    let period = lock(&state).interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let report = lock(&state).report();
        write_record(&mut writer, &report)
            .await
            .map_err(ConnectionLost::Write)?;
        debug!(measurement = report.measurement, "Report sent");
    }
}
