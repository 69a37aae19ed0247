//! Harness Configuration
//!
//! Everything a run needs, assembled by the binary (or a test) and passed to
//! [`RunContext::start`](crate::runtime::RunContext::start).

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use shared::Protocol;

use super::switches::HarnessSwitches;
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::{LeaseConfig, WaitPolicy};

/// Conventional port of the SignalFx API the collector's exporter calls
pub const SIGNALFX_API_PORT: u16 = 8881;

/// One ingestion listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    pub protocol: Protocol,
    pub bind: SocketAddr,
}

impl SinkConfig {
    pub fn new(protocol: Protocol, bind: SocketAddr) -> Self {
        Self { protocol, bind }
    }

    /// Listen on all interfaces at the protocol's well-known port
    pub fn default_for(protocol: Protocol) -> Self {
        Self::new(
            protocol,
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, protocol.default_port())),
        )
    }
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub sinks: Vec<SinkConfig>,
    /// Cadence for batch-count waits
    pub wait: WaitPolicy,
    /// Cadence for selector re-polls
    pub select: WaitPolicy,
    /// Upper bound for every wait of the run
    pub overall_timeout: Option<Duration>,
    pub golden_root: PathBuf,
    /// Lease guarding the shared environment; `None` for read-only runs
    pub lease: Option<LeaseConfig>,
    /// Shared directory for the file lease backend; in-process backend when unset
    pub lease_dir: Option<PathBuf>,
    pub switches: HarnessSwitches,
    /// Stub answering the exporter's SignalFx API calls with 200
    pub api_stub: Option<SocketAddr>,
    /// Base log level; `None` leaves the choice to the verbose flag
    pub log_level: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sinks: Vec::new(),
            wait: WaitPolicy::default(),
            select: WaitPolicy::new(Duration::from_secs(180), Duration::from_secs(5)),
            overall_timeout: None,
            golden_root: PathBuf::from("testdata"),
            lease: None,
            lease_dir: None,
            switches: HarnessSwitches::default(),
            api_stub: None,
            log_level: None,
        }
    }
}

impl HarnessConfig {
    /// Create a new builder
    pub fn builder() -> crate::config::builder::HarnessConfigBuilder {
        crate::config::builder::HarnessConfigBuilder::new()
    }

    pub fn sink(&self, protocol: Protocol) -> Option<&SinkConfig> {
        self.sinks.iter().find(|sink| sink.protocol == protocol)
    }

    /// Reject configurations that cannot start
    pub fn validate(&self) -> HarnessResult<()> {
        let mut seen = BTreeSet::new();
        for sink in &self.sinks {
            if !seen.insert(sink.protocol) {
                return Err(HarnessError::Configuration {
                    field: "sinks".to_string(),
                    reason: format!("protocol {} configured twice", sink.protocol),
                });
            }
        }

        for (field, policy) in [("wait", &self.wait), ("select", &self.select)] {
            if policy.poll_interval.is_zero() {
                return Err(HarnessError::Configuration {
                    field: field.to_string(),
                    reason: "poll interval must be positive".to_string(),
                });
            }
        }

        if let Some(stub) = self.api_stub {
            let clash = self
                .sinks
                .iter()
                .find(|sink| stub.port() != 0 && sink.bind.port() == stub.port());
            if let Some(sink) = clash {
                return Err(HarnessError::Configuration {
                    field: "api_stub".to_string(),
                    reason: format!("port {} is already used by the {} sink", stub.port(), sink.protocol),
                });
            }
        }

        if let Some(lease) = &self.lease {
            lease.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.wait.timeout, Duration::from_secs(180));
        assert_eq!(config.wait.poll_interval, Duration::from_secs(1));
        assert_eq!(config.select.poll_interval, Duration::from_secs(5));
        assert!(config.lease.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_sink_uses_well_known_port() {
        let sink = SinkConfig::default_for(Protocol::SignalFx);
        assert_eq!(sink.bind.port(), 9943);
        assert!(sink.bind.ip().is_unspecified());
    }

    #[test]
    fn test_duplicate_protocol_rejected() {
        let config = HarnessConfig {
            sinks: vec![
                SinkConfig::default_for(Protocol::HecLogs),
                SinkConfig::default_for(Protocol::HecLogs),
            ],
            ..HarnessConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HarnessError::Configuration { field, .. }) if field == "sinks"
        ));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = HarnessConfig {
            wait: WaitPolicy::new(Duration::from_secs(1), Duration::ZERO),
            ..HarnessConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_stub_cannot_share_a_sink_port() {
        let config = HarnessConfig {
            sinks: vec![SinkConfig::default_for(Protocol::SignalFx)],
            api_stub: Some(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 9943))),
            ..HarnessConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(HarnessError::Configuration { field, .. }) if field == "api_stub"
        ));

        let config = HarnessConfig {
            api_stub: Some(SocketAddr::from((Ipv4Addr::UNSPECIFIED, SIGNALFX_API_PORT))),
            ..config
        };
        assert!(config.validate().is_ok());
    }
}
