//! Sensor agent: registers with a fieldmesh relay, publishes its measurement
//! on a fixed interval and self-corrects from the readings of nearby peers.

pub mod runner;
pub mod settings;

pub use runner::{run_agent, ConnectionLost, SharedState};
pub use settings::AgentSettings;
