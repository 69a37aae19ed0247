//! Ingestion protocols and the payload decoder seam
//!
//! Wire decoding for real protocols lives outside this workspace. Everything
//! here only needs to turn bytes into a [`TelemetryBatch`]; the bundled
//! [`JsonBatchDecoder`] accepts the canonical JSON form of the hierarchy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{SharedError, SharedResult};
use crate::types::{SignalKind, TelemetryBatch};

/// Ingestion protocol exposed by a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    OtlpTraces,
    HecLogs,
    HecMetrics,
    HecObjects,
    SignalFx,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::OtlpTraces,
        Protocol::HecLogs,
        Protocol::HecMetrics,
        Protocol::HecObjects,
        Protocol::SignalFx,
    ];

    /// Signal every batch received on this protocol must carry
    pub fn signal(&self) -> SignalKind {
        match self {
            Protocol::OtlpTraces => SignalKind::Traces,
            Protocol::HecLogs | Protocol::HecObjects => SignalKind::Logs,
            Protocol::HecMetrics | Protocol::SignalFx => SignalKind::Metrics,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::OtlpTraces => 4317,
            Protocol::HecLogs => 8090,
            Protocol::HecMetrics => 8091,
            Protocol::HecObjects => 8092,
            Protocol::SignalFx => 9943,
        }
    }

    /// HTTP route the protocol posts to
    pub fn route(&self) -> &'static str {
        match self {
            Protocol::OtlpTraces => "/v1/traces",
            Protocol::HecLogs | Protocol::HecMetrics | Protocol::HecObjects => "/services/collector",
            Protocol::SignalFx => "/v2/datapoint",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Protocol::OtlpTraces => "otlp-traces",
            Protocol::HecLogs => "hec-logs",
            Protocol::HecMetrics => "hec-metrics",
            Protocol::HecObjects => "hec-objects",
            Protocol::SignalFx => "signalfx",
        };
        write!(f, "{label}")
    }
}

impl FromStr for Protocol {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|protocol| protocol.to_string() == s)
            .ok_or_else(|| SharedError::InvalidConfig {
                field: "protocol".to_string(),
                value: s.to_string(),
            })
    }
}

/// Converts a raw payload into the canonical record hierarchy
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, protocol: Protocol, payload: &[u8]) -> SharedResult<TelemetryBatch>;
}

/// Decoder for the canonical JSON encoding of [`TelemetryBatch`]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBatchDecoder;

impl PayloadDecoder for JsonBatchDecoder {
    fn decode(&self, protocol: Protocol, payload: &[u8]) -> SharedResult<TelemetryBatch> {
        let batch: TelemetryBatch =
            serde_json::from_slice(payload).map_err(|e| SharedError::DecodeError {
                protocol: protocol.to_string(),
                message: e.to_string(),
            })?;

        if batch.signal != protocol.signal() {
            return Err(SharedError::SignalMismatch {
                protocol: protocol.to_string(),
                expected: protocol.signal().to_string(),
                actual: batch.signal.to_string(),
            });
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_round_trips_through_display() {
        for protocol in Protocol::ALL {
            assert_eq!(protocol.to_string().parse::<Protocol>().unwrap(), protocol);
        }
        assert!("carrier-pigeon".parse::<Protocol>().is_err());
    }

    #[test]
    fn test_json_decoder_accepts_matching_signal() {
        let payload = br#"{"signal": "traces", "resources": []}"#;
        let batch = JsonBatchDecoder.decode(Protocol::OtlpTraces, payload).unwrap();
        assert_eq!(batch.signal, SignalKind::Traces);
    }

    #[test]
    fn test_json_decoder_rejects_garbage() {
        let err = JsonBatchDecoder
            .decode(Protocol::HecLogs, b"not json at all")
            .unwrap_err();
        assert!(matches!(err, SharedError::DecodeError { .. }));
    }

    #[test]
    fn test_json_decoder_rejects_wrong_signal() {
        let payload = br#"{"signal": "metrics", "resources": []}"#;
        let err = JsonBatchDecoder.decode(Protocol::HecLogs, payload).unwrap_err();
        assert!(matches!(err, SharedError::SignalMismatch { .. }));
    }
}
