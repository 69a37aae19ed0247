//! Harness Configuration Builder
//!
//! Provides a flexible builder pattern for constructing harness configurations

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use shared::Protocol;

use super::{HarnessConfig, HarnessSwitches, SinkConfig};
use crate::error::HarnessResult;
use crate::runtime::{LeaseConfig, WaitPolicy};

pub struct HarnessConfigBuilder {
    config: HarnessConfig,
}

impl HarnessConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: HarnessConfig::default(),
        }
    }

    /// Add a sink for `protocol` bound to `bind`
    pub fn sink(mut self, protocol: Protocol, bind: SocketAddr) -> Self {
        self.config.sinks.push(SinkConfig::new(protocol, bind));
        self
    }

    /// Add a sink on the protocol's well-known port
    pub fn default_sink(mut self, protocol: Protocol) -> Self {
        self.config.sinks.push(SinkConfig::default_for(protocol));
        self
    }

    /// Set batch-count wait timeout and poll cadence
    pub fn wait_policy(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.config.wait = WaitPolicy::new(timeout, poll_interval);
        self
    }

    /// Set selector timeout and poll cadence
    pub fn select_policy(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.config.select = WaitPolicy::new(timeout, poll_interval);
        self
    }

    /// Bound every wait of the run by `timeout` from context start
    pub fn overall_timeout(mut self, timeout: Duration) -> Self {
        self.config.overall_timeout = Some(timeout);
        self
    }

    /// Set the directory golden files are resolved against
    pub fn golden_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.config.golden_root = root.into();
        self
    }

    /// Guard the run with a lease
    pub fn lease(mut self, lease: LeaseConfig) -> Self {
        self.config.lease = Some(lease);
        self
    }

    /// Use the shared-directory lease backend
    pub fn lease_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.lease_dir = Some(dir.into());
        self
    }

    pub fn switches(mut self, switches: HarnessSwitches) -> Self {
        self.config.switches = switches;
        self
    }

    /// Set log level (trace, debug, info, warn, error)
    pub fn log_level<S: Into<String>>(mut self, level: S) -> Self {
        self.config.log_level = Some(level.into());
        self
    }

    /// Answer SignalFx API calls on `bind`
    pub fn signalfx_api_stub(mut self, bind: SocketAddr) -> Self {
        self.config.api_stub = Some(bind);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> HarnessResult<HarnessConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for HarnessConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
