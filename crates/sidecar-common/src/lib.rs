//! Common types and utilities for the Consul sidecar
//!
//! This crate provides:
//! - `error`: Error types shared by the sidecar crates
//! - `utils`: Local network helpers (host name, first IPv4 address)

pub mod error;
pub mod utils;

pub use error::{Result, SidecarError};
pub use utils::{has_text, local_hostname, local_ip};
