//! Telemetry fixtures
//!
//! Small batches shaped like what a cluster pipeline sends.

use shared::{DataPoint, Entry, EntryKind, ResourceGroup, ScopeGroup, SignalKind, TelemetryBatch};

pub struct TestFixtures;

impl TestFixtures {
    pub const MARKER: &'static str = "k8s.node.condition_ready";
    pub const FLAKY: &'static str = "k8s.container.restarts";
    pub const LEASE_KEY: &'static str = "shared-cluster";

    /// Node metrics carrying the marker entry; `pod_uid` varies between runs
    pub fn cluster_metrics(pod_uid: &str) -> TelemetryBatch {
        TelemetryBatch::new(SignalKind::Metrics).with_resource(
            ResourceGroup::new()
                .attr("k8s.node.name", "kind-control-plane")
                .attr("k8s.pod.uid", pod_uid)
                .attr("k8s.cluster.name", "ci")
                .with_scope(
                    ScopeGroup::new("k8sclusterreceiver")
                        .version("0.98.0")
                        .with_entry(Entry::new(Self::MARKER, EntryKind::Gauge).with_point(DataPoint::new(1i64).at(100)))
                        .with_entry(
                            Entry::new("k8s.node.allocatable_cpu", EntryKind::Gauge)
                                .unit("{cpu}")
                                .with_point(DataPoint::new(4i64).at(100)),
                        ),
                ),
        )
    }

    /// Same as [`Self::cluster_metrics`] with an extra entry that comes and goes
    pub fn cluster_metrics_with_flaky(pod_uid: &str, restarts: i64) -> TelemetryBatch {
        let mut batch = Self::cluster_metrics(pod_uid);
        batch.resources[0].scopes[0]
            .entries
            .push(Entry::new(Self::FLAKY, EntryKind::Sum).with_point(DataPoint::new(restarts).at(100)));
        batch
    }

    /// Metrics without the marker
    pub fn background_metrics() -> TelemetryBatch {
        TelemetryBatch::new(SignalKind::Metrics).with_resource(
            ResourceGroup::new().attr("host.name", "worker-1").with_scope(
                ScopeGroup::new("hostmetricsreceiver")
                    .with_entry(Entry::new("system.cpu.load_average.1m", EntryKind::Gauge).with_point(DataPoint::new(0.25))),
            ),
        )
    }

    pub fn log_line(body: &str) -> TelemetryBatch {
        TelemetryBatch::new(SignalKind::Logs).with_resource(
            ResourceGroup::new().attr("k8s.namespace.name", "default").with_scope(
                ScopeGroup::new("filelog").with_entry(Entry::new("container.log", EntryKind::Log).with_point(DataPoint::new(body))),
            ),
        )
    }
}
