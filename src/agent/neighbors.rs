use crate::wire::Coordinate;

/// Last known measurement of a same-category peer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborEntry {
    pub coordinate: Coordinate,
    pub measurement: f32,
}

/// Bounded table of peer readings, keyed by coordinate.
///
/// At most one entry per coordinate. Once `capacity` coordinates are known,
/// readings from new coordinates are dropped; known coordinates keep updating.
#[derive(Debug, Clone)]
pub struct NeighborTable {
    entries: Vec<NeighborEntry>,
    capacity: usize,
}

impl NeighborTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Insert or update. Returns false only when a new coordinate was
    /// dropped because the table is full.
    pub fn upsert(&mut self, coordinate: Coordinate, measurement: f32) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.coordinate == coordinate) {
            entry.measurement = measurement;
            return true;
        }

        if self.entries.len() >= self.capacity {
            return false;
        }

        self.entries.push(NeighborEntry {
            coordinate,
            measurement,
        });
        true
    }

    /// Remove the entry for `coordinate`, if any (unordered)
    pub fn remove(&mut self, coordinate: Coordinate) -> Option<NeighborEntry> {
        let pos = self.entries.iter().position(|e| e.coordinate == coordinate)?;
        Some(self.entries.swap_remove(pos))
    }

    pub fn get(&self, coordinate: Coordinate) -> Option<f32> {
        self.entries
            .iter()
            .find(|e| e.coordinate == coordinate)
            .map(|e| e.measurement)
    }

    /// Number of known neighbors strictly closer to `origin` than `distance`
    pub fn count_closer_than(&self, origin: &Coordinate, distance: f32) -> usize {
        self.entries
            .iter()
            .filter(|e| origin.distance_to(&e.coordinate) < distance)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
