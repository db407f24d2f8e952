//! Utility functions for the sidecar
//!
//! Local network inspection used as the last fallback when no host name
//! has been configured.

use if_addrs::IfAddr;

/// Check that a string is present and contains a non-whitespace character
///
/// # Examples
///
/// ```
/// use sidecar_common::has_text;
///
/// assert!(has_text(Some("host-1")));
/// assert!(!has_text(Some("  ")));
/// assert!(!has_text(None));
/// ```
pub fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// Get the local IP address
///
/// Returns the first non-loopback IPv4 address found,
/// or "127.0.0.1" as fallback.
pub fn local_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .find(|iface| !iface.is_loopback() && matches!(iface.addr, IfAddr::V4(_)))
                .and_then(|iface| match iface.addr {
                    IfAddr::V4(addr) => Some(addr.ip.to_string()),
                    _ => None,
                })
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

/// Get the host name of this machine
///
/// Falls back to "localhost" when the name cannot be read or is not valid UTF-8.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
