//! Endpoint helpers
//!
//! Address the system under test uses to reach the sinks on this host.

use std::net::IpAddr;

use crate::config::HarnessSwitches;

/// Host the sinks are reachable on from inside the test environment
pub fn host_endpoint(switches: &HarnessSwitches) -> String {
    if let Some(endpoint) = &switches.host_endpoint {
        return endpoint.clone();
    }
    if cfg!(target_os = "macos") {
        "host.docker.internal".to_string()
    } else {
        "127.0.0.1".to_string()
    }
}

/// `host:port`, bracketing IPv6 literals
pub fn host_port(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(_)) => format!("[{host}]:{port}"),
        _ => format!("{host}:{port}"),
    }
}

pub fn host_port_http(host: &str, port: u16) -> String {
    format!("http://{}", host_port(host, port))
}
