//! Test helpers for driving sinks and scenarios

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use harness::runtime::WaitPolicy;
use harness::testing::GoldenSnapshot;
use harness::*;
use shared::{Protocol, TelemetryBatch};

pub struct TestHelpers;

impl TestHelpers {
    /// Config with ephemeral sinks, short waits and golden files under `root`
    pub fn config(protocols: &[Protocol], root: &Path) -> HarnessConfig {
        HarnessConfig {
            sinks: protocols
                .iter()
                .map(|protocol| SinkConfig::new(*protocol, "127.0.0.1:0".parse().unwrap()))
                .collect(),
            wait: WaitPolicy::new(Duration::from_secs(5), Duration::from_millis(20)),
            select: WaitPolicy::new(Duration::from_secs(5), Duration::from_millis(20)),
            golden_root: root.to_path_buf(),
            ..HarnessConfig::default()
        }
    }

    /// POST `batch` to the sink at `addr` the way an exporter would
    pub async fn post_batch(addr: SocketAddr, protocol: Protocol, batch: &TelemetryBatch) -> reqwest::StatusCode {
        Self::post_raw(addr, protocol, serde_json::to_vec(batch).unwrap()).await
    }

    pub async fn post_raw(addr: SocketAddr, protocol: Protocol, body: Vec<u8>) -> reqwest::StatusCode {
        let url = format!("http://{}{}", addr, protocol.route());
        reqwest::Client::new()
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("sink should accept connections")
            .status()
    }

    pub async fn write_golden(root: &Path, name: &str, batch: &TelemetryBatch, scrubber: &Scrubber) {
        let yaml = GoldenSnapshot::from_capture(batch, scrubber).to_yaml().unwrap();
        tokio::fs::write(root.join(name), yaml).await.unwrap();
    }
}

/// Scenario whose setup plays the pipeline under test by posting batches
/// to the run's own sink, then verifies through an inner scenario
pub struct PostingScenario {
    pub protocol: Protocol,
    pub batches: Vec<TelemetryBatch>,
    pub inner: GoldenScenario,
}

#[async_trait]
impl Scenario for PostingScenario {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn mutates_environment(&self) -> bool {
        self.inner.mutates_environment()
    }

    async fn setup(&self, ctx: &RunContext) -> HarnessResult<()> {
        let addr = ctx.sinks().sink(self.protocol)?.local_addr();
        for batch in &self.batches {
            let status = TestHelpers::post_batch(addr, self.protocol, batch).await;
            if !status.is_success() {
                return Err(HarnessError::AssertionFailed {
                    message: format!("sink answered {status}"),
                });
            }
        }
        self.inner.setup(ctx).await
    }

    async fn verify(&self, ctx: &RunContext) -> HarnessResult<()> {
        self.inner.verify(ctx).await
    }

    async fn teardown(&self, ctx: &RunContext) -> HarnessResult<()> {
        self.inner.teardown(ctx).await
    }
}
