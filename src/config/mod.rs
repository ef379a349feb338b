use crate::relay::EchoPolicy;
use crate::wire::Category;
use anyhow::{bail, Context, Result};
use rand::Rng;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "FIELDMESH_CONFIG";

/// Complete fieldmesh configuration, shared by the relay and the agents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldmeshConfig {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub categories: CategoryProfiles,
    #[serde(default)]
    pub agent: AgentTuning,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// IP family the relay listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AddressFamily {
    #[serde(rename = "v4")]
    V4,
    #[serde(rename = "v6")]
    V6,
}

impl std::str::FromStr for AddressFamily {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "v4" => Ok(AddressFamily::V4),
            "v6" => Ok(AddressFamily::V6),
            other => bail!("address family must be 'v4' or 'v6', got '{}'", other),
        }
    }
}

/// Relay listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_address_family")]
    pub address_family: AddressFamily,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum live sensors per category
    #[serde(default = "default_capacity_per_category")]
    pub capacity_per_category: usize,
    /// Whether a sensor receives its own reports back
    #[serde(default)]
    pub echo_policy: EchoPolicy,
}

fn default_address_family() -> AddressFamily {
    AddressFamily::V4
}

fn default_port() -> u16 {
    51511
}

fn default_capacity_per_category() -> usize {
    crate::registry::DEFAULT_CAPACITY
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            address_family: default_address_family(),
            port: default_port(),
            capacity_per_category: default_capacity_per_category(),
            echo_policy: EchoPolicy::default(),
        }
    }
}

impl RelayConfig {
    /// Wildcard address for the configured family
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = match self.address_family {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        SocketAddr::new(ip, self.port)
    }

    /// Apply FIELDMESH_ADDRESS_FAMILY / FIELDMESH_PORT overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FIELDMESH_ADDRESS_FAMILY") {
            self.address_family = v.parse()?;
        }
        if let Some(v) = lookup("FIELDMESH_PORT") {
            self.port = v
                .parse()
                .with_context(|| format!("FIELDMESH_PORT must be a valid port number, got '{}'", v))?;
        }
        Ok(())
    }
}

/// Valid measurement range and reporting interval of one category
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CategoryProfile {
    pub min: f32,
    pub max: f32,
    pub interval_seconds: u64,
}

impl CategoryProfile {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Uniform random starting measurement within [min, max]
    pub fn random_measurement(&self) -> f32 {
        rand::thread_rng().gen_range(self.min..=self.max)
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

/// Per-category profiles
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryProfiles {
    #[serde(default = "default_temperature_profile")]
    pub temperature: CategoryProfile,
    #[serde(default = "default_humidity_profile")]
    pub humidity: CategoryProfile,
    #[serde(default = "default_air_quality_profile")]
    pub air_quality: CategoryProfile,
}

fn default_temperature_profile() -> CategoryProfile {
    CategoryProfile {
        min: 20.0,
        max: 40.0,
        interval_seconds: 5,
    }
}

fn default_humidity_profile() -> CategoryProfile {
    CategoryProfile {
        min: 10.0,
        max: 90.0,
        interval_seconds: 7,
    }
}

fn default_air_quality_profile() -> CategoryProfile {
    CategoryProfile {
        min: 15.0,
        max: 30.0,
        interval_seconds: 10,
    }
}

impl CategoryProfiles {
    pub fn get(&self, category: Category) -> &CategoryProfile {
        match category {
            Category::Temperature => &self.temperature,
            Category::Humidity => &self.humidity,
            Category::AirQuality => &self.air_quality,
        }
    }

    fn validate(&self) -> Result<()> {
        for category in Category::ALL {
            let p = self.get(category);
            if !(p.min >= 0.0 && p.min < p.max) {
                bail!(
                    "{} range must satisfy 0 <= min < max, got [{}, {}]",
                    category,
                    p.min,
                    p.max
                );
            }
            if p.interval_seconds == 0 {
                bail!("{} interval_seconds must be positive", category);
            }
        }
        Ok(())
    }
}

impl Default for CategoryProfiles {
    fn default() -> Self {
        Self {
            temperature: default_temperature_profile(),
            humidity: default_humidity_profile(),
            air_quality: default_air_quality_profile(),
        }
    }
}

/// Neighbor tracking and correction parameters
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AgentTuning {
    /// Maximum tracked neighbors; further coordinates are dropped
    #[serde(default = "default_neighbor_capacity")]
    pub neighbor_capacity: usize,
    /// Weight applied to the peer difference before distance attenuation
    #[serde(default = "default_correction_gain")]
    pub correction_gain: f32,
    /// A peer is only trusted if at most this many known neighbors are closer
    #[serde(default = "default_max_closer_neighbors")]
    pub max_closer_neighbors: usize,
}

fn default_neighbor_capacity() -> usize {
    128
}

fn default_correction_gain() -> f32 {
    0.1
}

fn default_max_closer_neighbors() -> usize {
    3
}

impl Default for AgentTuning {
    fn default() -> Self {
        Self {
            neighbor_capacity: default_neighbor_capacity(),
            correction_gain: default_correction_gain(),
            max_closer_neighbors: default_max_closer_neighbors(),
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// How often the relay logs its counters (seconds)
    #[serde(default = "default_report_interval")]
    pub report_interval_seconds: u64,
}

fn default_report_interval() -> u64 {
    30
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_seconds: default_report_interval(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<FieldmeshConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: FieldmeshConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    config.categories.validate()?;
    Ok(config)
}

/// Load from the file named by FIELDMESH_CONFIG, or defaults when unset
pub fn load_from_env() -> Result<FieldmeshConfig> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => load_config(&path),
        Err(_) => Ok(FieldmeshConfig::default()),
    }
}
