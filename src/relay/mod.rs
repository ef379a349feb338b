// Relay: registration, fan-out and connection lifecycle

mod broadcaster;
mod server;
mod worker;


pub use broadcaster::{BroadcastReport, Broadcaster, EchoPolicy};
pub use server::RelayServer;
pub use worker::{ConnectionSummary, ConnectionWorker, WorkerState};

use crate::registry::ConnectionId;
use crate::wire::WireError;
use std::fmt;
use std::io;

/// Errors local to one relay connection. None of them affect other connections.
#[derive(Debug)]
pub enum RelayError {
    /// First record unreadable, unknown category, or registry full
    RegistrationFailed(String),
    /// Peer closed the stream (`None`) or the stream failed
    PeerDisconnected(Option<WireError>),
    /// Writing a fanned-out record to one peer failed
    SendFailed { id: ConnectionId, source: io::Error },
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::RegistrationFailed(reason) => write!(f, "registration failed: {}", reason),
            RelayError::PeerDisconnected(None) => write!(f, "peer closed the connection"),
            RelayError::PeerDisconnected(Some(e)) => write!(f, "peer connection failed: {}", e),
            RelayError::SendFailed { id, source } => write!(f, "send to {} failed: {}", id, source),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RelayError::PeerDisconnected(Some(e)) => Some(e),
            RelayError::SendFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
