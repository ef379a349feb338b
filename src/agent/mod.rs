//! Sensor-side state: neighbor tracking and self-correction.
//!
//! Every reading broadcast to the agent's category passes through
//! [`AgentState::apply`]. Peers are remembered by coordinate; a peer that
//! ranks among the nearest few known neighbors pulls the agent's own
//! measurement toward its value, attenuated by distance:
//!
//! ```text
//! delta = (peer - own) * gain / (distance + 1)
//! own   = clamp(own + delta, min, max)
//! ```

mod neighbors;

pub use neighbors::{NeighborEntry, NeighborTable};

use crate::config::{AgentTuning, CategoryProfile};
use crate::wire::{Category, Coordinate, SensorReading};
use std::fmt;
use std::time::Duration;

/// What the agent did with one incoming reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorrectionAction {
    /// Reading carries the agent's own coordinate (own echo or co-located peer)
    SameLocation,
    /// Departure notice; the neighbor was forgotten
    Removed,
    /// Measurement moved by `delta` (before clamping)
    Correction(f32),
    /// Too many known neighbors are closer than the sender
    NotNeighbor,
    /// Reading belongs to a different category
    OtherCategory,
}

impl fmt::Display for CorrectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrectionAction::SameLocation => write!(f, "same location"),
            CorrectionAction::Removed => write!(f, "removed"),
            CorrectionAction::Correction(delta) => write!(f, "correction of {:.4}", delta),
            CorrectionAction::NotNeighbor => write!(f, "not neighbor"),
            CorrectionAction::OtherCategory => write!(f, "other category"),
        }
    }
}

/// Local state of one sensor agent
#[derive(Debug, Clone)]
pub struct AgentState {
    category: Category,
    coordinate: Coordinate,
    measurement: f32,
    profile: CategoryProfile,
    tuning: AgentTuning,
    neighbors: NeighborTable,
}

impl AgentState {
    /// `measurement` is clamped into the profile's range
    pub fn new(
        category: Category,
        coordinate: Coordinate,
        measurement: f32,
        profile: CategoryProfile,
        tuning: AgentTuning,
    ) -> Self {
        Self {
            category,
            coordinate,
            measurement: profile.clamp(measurement),
            profile,
            tuning,
            neighbors: NeighborTable::new(tuning.neighbor_capacity),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn measurement(&self) -> f32 {
        self.measurement
    }

    pub fn interval(&self) -> Duration {
        self.profile.interval()
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    /// Current reading, as published on every report tick
    pub fn report(&self) -> SensorReading {
        SensorReading::new(self.category, self.coordinate, self.measurement)
    }

    /// Update the neighbor table from one broadcast reading and correct the
    /// own measurement if the sender qualifies as a near neighbor.
    ///
    /// The table is updated before the closer-neighbor count is taken. The
    /// sender's own entry is never strictly closer than itself, so it does
    /// not change the count.
    pub fn apply(&mut self, reading: &SensorReading) -> CorrectionAction {
        if reading.category != self.category {
            return CorrectionAction::OtherCategory;
        }

        let remote = reading.coordinate;
        if remote == self.coordinate {
            return CorrectionAction::SameLocation;
        }

        if reading.is_departure() {
            self.neighbors.remove(remote);
            return CorrectionAction::Removed;
        }

        // Full table: the reading still counts for correction
        self.neighbors.upsert(remote, reading.measurement);

        let distance = self.coordinate.distance_to(&remote);
        let limit = self.tuning.max_closer_neighbors;
        let eligible = self.neighbors.len() <= limit
            || self.neighbors.count_closer_than(&self.coordinate, distance) <= limit;

        if !eligible {
            return CorrectionAction::NotNeighbor;
        }

        let delta = (reading.measurement - self.measurement)
            * (self.tuning.correction_gain / (distance + 1.0));
        self.measurement = self.profile.clamp(self.measurement + delta);
        CorrectionAction::Correction(delta)
    }
}
