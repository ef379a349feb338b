use super::{Broadcaster, RelayError};
use crate::registry::{ConnectionId, PeerConnection, Registry};
use crate::wire::{read_record, Category, Coordinate, SensorReading};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Lifecycle of one relay connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    AwaitingRegistration,
    Active,
    Closed,
}

/// What happened on a connection that registered successfully
#[derive(Debug)]
pub struct ConnectionSummary {
    pub id: ConnectionId,
    pub category: Category,
    pub coordinate: Coordinate,
    pub records_relayed: u64,
    pub disconnect: RelayError,
}

/// Registry entry held for the lifetime of the active connection.
///
/// Dropping it removes the entry, so the connection leaves the registry on
/// every exit path, including a panic or an aborted task.
struct Registration {
    registry: Arc<Registry>,
    peer: Arc<PeerConnection>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.deregister(self.peer.id, self.peer.category) {
            debug!(connection = %self.peer.id, "Deregistered");
        }
    }
}

/// Drives one accepted connection from registration to departure
pub struct ConnectionWorker {
    broadcaster: Broadcaster,
    state: WorkerState,
}

impl ConnectionWorker {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self {
            broadcaster,
            state: WorkerState::AwaitingRegistration,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run the connection to completion.
    ///
    /// Returns `Err(RegistrationFailed)` if the connection never became
    /// active; otherwise the departure notice has been broadcast exactly once
    /// and the registry entry is gone.
    pub async fn run<R, W>(&mut self, mut reader: R, writer: W) -> Result<ConnectionSummary, RelayError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let registration = match self.register(&mut reader, writer).await {
            Ok(registration) => registration,
            Err(e) => {
                self.state = WorkerState::Closed;
                self.broadcaster.metrics().record_rejected_registration();
                return Err(e);
            }
        };
        let peer = Arc::clone(&registration.peer);
        self.state = WorkerState::Active;

        info!(
            connection = %peer.id,
            category = %peer.category,
            coordinate = %peer.coordinate,
            "Sensor registered"
        );

        let mut records_relayed = 0u64;
        let disconnect = loop {
            match read_record(&mut reader).await {
                Ok(Some(reading)) => {
                    info!(
                        category = %reading.category,
                        x = reading.coordinate.x,
                        y = reading.coordinate.y,
                        measurement = reading.measurement,
                        "Relaying reading"
                    );
                    self.broadcaster.metrics().record_relayed(reading.category);
                    self.broadcaster.broadcast(&reading, Some(peer.id)).await;
                    records_relayed += 1;
                }
                Ok(None) => break RelayError::PeerDisconnected(None),
                Err(e) if !e.is_fatal() => {
                    warn!(connection = %peer.id, error = %e, "Skipping malformed record");
                }
                Err(e) => break RelayError::PeerDisconnected(Some(e)),
            }
        };
        self.state = WorkerState::Closed;

        // Deregister before announcing the departure
        drop(registration);

        let departure = SensorReading::departure(peer.category, peer.coordinate);
        info!(
            connection = %peer.id,
            category = %departure.category,
            x = departure.coordinate.x,
            y = departure.coordinate.y,
            measurement = departure.measurement,
            reason = %disconnect,
            "Sensor departed"
        );
        self.broadcaster.metrics().record_departure();
        self.broadcaster.broadcast(&departure, Some(peer.id)).await;
        peer.close().await;

        Ok(ConnectionSummary {
            id: peer.id,
            category: peer.category,
            coordinate: peer.coordinate,
            records_relayed,
            disconnect,
        })
    }

    /// Interpret the first record as the sensor's registration
    async fn register<R, W>(&self, reader: &mut R, writer: W) -> Result<Registration, RelayError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let first = match read_record(reader).await {
            Ok(Some(reading)) => reading,
            Ok(None) => {
                return Err(RelayError::RegistrationFailed(
                    "connection closed before registering".to_string(),
                ))
            }
            Err(e) => return Err(RelayError::RegistrationFailed(e.to_string())),
        };

        let peer = Arc::new(PeerConnection::new(
            first.category,
            first.coordinate,
            Box::new(writer),
        ));

        let registry = Arc::clone(self.broadcaster.registry());
        if let Err(e) = registry.register(Arc::clone(&peer)) {
            warn!(
                category = %peer.category,
                coordinate = %peer.coordinate,
                error = %e,
                "Rejecting sensor"
            );
            peer.close().await;
            return Err(RelayError::RegistrationFailed(e.to_string()));
        }

        Ok(Registration { registry, peer })
    }
}
