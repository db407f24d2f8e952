//! Consul sidecar server
//!
//! Loads configuration, resolves the registration for the co-located
//! application, registers it with the local Consul agent and serves the
//! sidecar HTTP endpoints until shutdown.

pub mod config;
pub mod controller;
pub mod health;
pub mod logging;
pub mod shutdown;
pub mod startup;

pub use config::{Cli, Configuration};
pub use health::{Health, HealthStatus, LocalApplicationHealthIndicator};
pub use startup::{Sidecar, run};
