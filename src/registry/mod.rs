use crate::wire::{write_record, Category, Coordinate, SensorReading};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[cfg(test)]
mod tests;

/// Default per-category capacity
pub const DEFAULT_CAPACITY: usize = 64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a relay connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write side of a registered sensor connection.
///
/// The writer sits behind an async mutex so that records fanned out by
/// different workers never interleave on the same stream.
pub struct PeerConnection {
    pub id: ConnectionId,
    pub category: Category,
    pub coordinate: Coordinate,
    writer: tokio::sync::Mutex<BoxedWriter>,
}

impl PeerConnection {
    pub fn new(category: Category, coordinate: Coordinate, writer: BoxedWriter) -> Self {
        Self {
            id: ConnectionId::next(),
            category,
            coordinate,
            writer: tokio::sync::Mutex::new(writer),
        }
    }

    /// Send one record to this peer
    pub async fn send(&self, reading: &SensorReading) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        write_record(&mut *writer, reading).await
    }

    /// Shut down the write side. Errors are ignored; the peer may already be gone.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("category", &self.category)
            .field("coordinate", &self.coordinate)
            .finish()
    }
}

/// Registry errors
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    Full { category: Category, capacity: usize },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Full { category, capacity } => {
                write!(f, "{} registry is full ({} sensors)", category, capacity)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Registry of live sensor connections, one bounded collection per category.
///
/// All three collections share one lock. The lock is only held while a
/// collection is read or mutated, never across network I/O: broadcasts take
/// a `snapshot` and write to the cloned handles afterwards.
pub struct Registry {
    slots: Mutex<[Vec<Arc<PeerConnection>>; 3]>,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new([Vec::new(), Vec::new(), Vec::new()]),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, [Vec<Arc<PeerConnection>>; 3]> {
        // Entries stay consistent even if a holder panicked mid-scan
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a connection under its declared category
    pub fn register(&self, connection: Arc<PeerConnection>) -> Result<(), RegistryError> {
        let category = connection.category;
        let mut slots = self.lock();
        let list = &mut slots[category.index()];

        if list.len() >= self.capacity {
            return Err(RegistryError::Full {
                category,
                capacity: self.capacity,
            });
        }

        list.push(connection);
        Ok(())
    }

    /// Remove a connection. Returns false if it was not registered
    /// (already removed, or never added).
    pub fn deregister(&self, id: ConnectionId, category: Category) -> bool {
        let mut slots = self.lock();
        let list = &mut slots[category.index()];

        match list.iter().position(|c| c.id == id) {
            Some(pos) => {
                list.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    /// Current connections of a category. Order is not meaningful.
    pub fn snapshot(&self, category: Category) -> Vec<Arc<PeerConnection>> {
        self.lock()[category.index()].clone()
    }

    pub fn contains(&self, id: ConnectionId, category: Category) -> bool {
        self.lock()[category.index()].iter().any(|c| c.id == id)
    }

    pub fn len(&self, category: Category) -> usize {
        self.lock()[category.index()].len()
    }

    pub fn total(&self) -> usize {
        self.lock().iter().map(Vec::len).sum()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
