//! Startup settings for one sensor agent, read from the environment.

use anyhow::{anyhow, bail, Context, Result};
use fieldmesh::wire::{Category, Coordinate, GRID_MAX, GRID_MIN};

pub const RELAY_ADDR_ENV: &str = "SENSOR_RELAY_ADDR";
pub const CATEGORY_ENV: &str = "SENSOR_CATEGORY";
pub const X_ENV: &str = "SENSOR_X";
pub const Y_ENV: &str = "SENSOR_Y";

/// Validated identity of an agent and where its relay lives
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    /// `host:port` of the relay
    pub relay_addr: String,
    pub category: Category,
    pub coordinate: Coordinate,
}

impl AgentSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, validating category and grid bounds
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| lookup(key).ok_or_else(|| anyhow!("{} is required", key));

        let relay_addr = require(RELAY_ADDR_ENV)?;
        let category: Category = require(CATEGORY_ENV)?
            .parse()
            .with_context(|| format!("{} must be temperature, humidity or air_quality", CATEGORY_ENV))?;

        let x = parse_axis(X_ENV, &require(X_ENV)?)?;
        let y = parse_axis(Y_ENV, &require(Y_ENV)?)?;
        let coordinate = Coordinate::new(x, y);
        if !coordinate.in_grid() {
            bail!(
                "Coordinates must be in the range {}-{}, got {}",
                GRID_MIN,
                GRID_MAX,
                coordinate
            );
        }

        Ok(Self {
            relay_addr,
            category,
            coordinate,
        })
    }
}

fn parse_axis(key: &str, value: &str) -> Result<i32> {
    value
        .trim()
        .parse()
        .with_context(|| format!("{} must be an integer, got '{}'", key, value))
}
