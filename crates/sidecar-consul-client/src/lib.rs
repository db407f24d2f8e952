//! Consul agent client for the sidecar
//!
//! This crate provides:
//! - `model`: Agent and health API payloads
//! - `client`: HTTP client for the local Consul agent
//! - `error`: Client error types

pub mod client;
pub mod error;
pub mod model;

pub use client::{ConsulClient, ConsulClientConfig};
pub use error::{ConsulClientError, Result};
pub use model::{HealthCheck, NewService, ServiceCheck, ServiceHealth};
