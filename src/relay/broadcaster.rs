use crate::metrics::RelayMetrics;
use crate::registry::{ConnectionId, PeerConnection, Registry};
use crate::relay::RelayError;
use crate::wire::SensorReading;
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

/// Whether the originating connection receives its own broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoPolicy {
    /// Every registered connection of the category gets a copy, sender included
    #[default]
    Include,
    /// The originating connection is skipped
    Exclude,
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Fans readings out to every connection registered under the reading's category
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
    metrics: RelayMetrics,
    echo_policy: EchoPolicy,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>, metrics: RelayMetrics, echo_policy: EchoPolicy) -> Self {
        Self {
            registry,
            metrics,
            echo_policy,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    pub fn echo_policy(&self) -> EchoPolicy {
        self.echo_policy
    }

    /// Deliver `reading` to its category's connections.
    ///
    /// The registry lock is released before any write. A peer whose write
    /// fails is deregistered and closed; the others still get their copy.
    pub async fn broadcast(
        &self,
        reading: &SensorReading,
        origin: Option<ConnectionId>,
    ) -> BroadcastReport {
        let targets: Vec<Arc<PeerConnection>> = self
            .registry
            .snapshot(reading.category)
            .into_iter()
            .filter(|peer| match (self.echo_policy, origin) {
                (EchoPolicy::Exclude, Some(origin)) => peer.id != origin,
                _ => true,
            })
            .collect();

        let results = join_all(targets.iter().map(|peer| peer.send(reading))).await;

        let mut report = BroadcastReport::default();
        for (peer, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(source) => {
                    report.failed += 1;
                    let err = RelayError::SendFailed {
                        id: peer.id,
                        source,
                    };
                    warn!(
                        category = %peer.category,
                        coordinate = %peer.coordinate,
                        error = %err,
                        "Dropping peer"
                    );
                    self.registry.deregister(peer.id, peer.category);
                    peer.close().await;
                }
            }
        }

        self.metrics.record_deliveries(report.delivered, report.failed);
        report
    }
}
