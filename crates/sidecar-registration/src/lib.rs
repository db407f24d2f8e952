//! Consul registration for the sidecar
//!
//! ## Modules
//! - `properties`: Sidecar, discovery and heartbeat settings
//! - `naming`: App name, instance id, DNS normalization and tag rules
//! - `registration`: The registration handed to the registry, and its customizers
//! - `resolver`: Builds a registration from the layered settings
//! - `registry`: Registers and deregisters with the Consul agent
//! - `ttl`: TTL heartbeat scheduler

pub mod naming;
pub mod properties;
pub mod registration;
pub mod registry;
pub mod resolver;
pub mod ttl;

pub use properties::{DiscoveryProperties, HeartbeatProperties, SidecarProperties};
pub use registration::{ConsulRegistration, FnCustomizer, RegistrationCustomizer};
pub use registry::{ConsulServiceRegistry, RegistrationStatus, ServiceRegistry};
pub use resolver::{resolve_hostname, resolve_registration};
pub use ttl::TtlScheduler;
