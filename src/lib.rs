// Wire record layout and stream codec
pub mod wire;

// Per-category connection registry
pub mod registry;

// Relay: fan-out, connection workers, accept loop
pub mod relay;

// Agent-side neighbor tracking and self-correction
pub mod agent;

// Relay activity counters
pub mod metrics;

// TOML / environment configuration
pub mod config;
