//! Harness binary
//!
//! Runs one golden-file scenario: listens on a protocol sink, optionally
//! drives setup and teardown commands under a lease, selects the batch
//! carrying a marker and compares it with a golden snapshot.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use harness::runtime::{host_endpoint, host_port_http};
use harness::{
    ComparisonRuleSet, FieldScope, GoldenScenario, HarnessConfig, HarnessSwitches, LeaseConfig, Level, Marker,
    ScenarioRunner, Scrubber,
};
use shared::{EntryKind, Protocol};

/// Capture telemetry from a pipeline and verify it against a golden file
#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Captures telemetry and verifies it against reviewed golden snapshots")]
struct Args {
    /// Ingestion protocol to listen for (otlp-traces, hec-logs, hec-metrics, hec-objects, signalfx)
    #[arg(long)]
    protocol: Protocol,

    /// Sink port (defaults to the protocol's conventional port)
    #[arg(long)]
    port: Option<u16>,

    /// Golden file, relative to the golden root unless absolute
    #[arg(long)]
    golden: PathBuf,

    /// Golden root directory
    #[arg(long, default_value = "testdata")]
    golden_root: PathBuf,

    /// Entry name that identifies the batch to verify
    #[arg(long)]
    marker: String,

    /// Restrict the marker to one entry kind
    #[arg(long)]
    marker_kind: Option<EntryKind>,

    /// Batches to wait for before selecting
    #[arg(long, default_value = "1")]
    min_batches: usize,

    /// Select on the marker alone, without the resource and record count check
    #[arg(long)]
    ignore_shape: bool,

    /// Wait and selection timeout in seconds
    #[arg(long, default_value = "180")]
    timeout_secs: u64,

    /// Store poll interval in milliseconds
    #[arg(long, default_value = "1000")]
    poll_ms: u64,

    /// Shared directory holding lease files
    #[arg(long)]
    lease_dir: Option<PathBuf>,

    /// Lease key guarding the shared environment
    #[arg(long)]
    lease_key: Option<String>,

    /// Shell command run as scenario setup
    #[arg(long)]
    setup_cmd: Option<String>,

    /// Shell command run as scenario teardown
    #[arg(long)]
    teardown_cmd: Option<String>,

    /// Levels compared without regard to order (resource, scope, entry, point)
    #[arg(long)]
    ignore_order: Vec<Level>,

    /// Attribute keys removed before comparing
    #[arg(long)]
    ignore_field: Vec<String>,

    /// Attribute keys whose values are not compared
    #[arg(long)]
    ignore_value: Vec<String>,

    /// Entry names dropped from captures before comparing and snapshotting
    #[arg(long)]
    flaky: Vec<String>,

    /// Keep at most this many points per entry
    #[arg(long)]
    max_points: Option<usize>,

    /// Also answer the exporter's SignalFx API calls on this port (conventionally 8881)
    #[arg(long)]
    signalfx_api_port: Option<u16>,

    /// Log level (info by default, debug with --verbose)
    #[arg(long)]
    log_level: Option<String>,

    /// Enable verbose tracing output
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn rules(&self) -> ComparisonRuleSet {
        let mut rules = ComparisonRuleSet::new();
        for level in &self.ignore_order {
            rules = rules.ignore_order(*level);
        }
        for name in &self.ignore_field {
            rules = rules.ignore_field(name);
        }
        for name in &self.ignore_value {
            rules = rules.ignore_field_value(name, FieldScope::Any);
        }
        rules
    }

    fn scrubber(&self) -> Scrubber {
        let scrubber = Scrubber::new().flaky(self.flaky.iter().cloned());
        match self.max_points {
            Some(max) => scrubber.max_points(max),
            None => scrubber,
        }
    }

    fn marker(&self) -> Marker {
        let marker = Marker::new(&self.marker);
        match self.marker_kind {
            Some(kind) => marker.kind(kind),
            None => marker,
        }
    }

    fn config(&self, switches: HarnessSwitches) -> anyhow::Result<HarnessConfig> {
        let port = self.port.unwrap_or_else(|| self.protocol.default_port());
        let timeout = Duration::from_secs(self.timeout_secs);
        let poll = Duration::from_millis(self.poll_ms);

        let mut builder = HarnessConfig::builder()
            .sink(self.protocol, SocketAddr::from(([0, 0, 0, 0], port)))
            .wait_policy(timeout, poll)
            .select_policy(timeout, poll * 5)
            .golden_root(&self.golden_root)
            .switches(switches);

        if let Some(level) = &self.log_level {
            builder = builder.log_level(level);
        }
        if let Some(port) = self.signalfx_api_port {
            builder = builder.signalfx_api_stub(SocketAddr::from(([0, 0, 0, 0], port)));
        }

        if let Some(key) = &self.lease_key {
            builder = builder.lease(LeaseConfig::new(key));
        }
        if let Some(dir) = &self.lease_dir {
            builder = builder.lease_dir(dir);
        }

        builder.build().context("invalid harness configuration")
    }

    fn scenario(&self) -> GoldenScenario {
        let name = self.golden.display().to_string();
        let mut scenario = GoldenScenario::new(&name, self.protocol, &self.golden, self.marker())
            .rules(self.rules())
            .scrubber(self.scrubber())
            .min_batches(self.min_batches);

        if self.ignore_shape {
            scenario = scenario.ignore_shape();
        }
        if let Some(command) = &self.setup_cmd {
            scenario = scenario.setup_command(command);
        }
        if let Some(command) = &self.teardown_cmd {
            scenario = scenario.teardown_command(command);
        }
        scenario
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let switches = HarnessSwitches::from_env();
    let config = args.config(switches)?;
    shared::logging::init_tracing_with_level(config.log_level.as_deref(), args.verbose);

    let port = config
        .sink(args.protocol)
        .map(|sink| sink.bind.port())
        .context("no sink configured for the requested protocol")?;
    let endpoint = host_port_http(&host_endpoint(&config.switches), port);
    tracing::info!(
        "📡 Point the pipeline's {} exporter at {}{}",
        args.protocol,
        endpoint,
        args.protocol.route()
    );

    ScenarioRunner::new(config)
        .run(&args.scenario())
        .await
        .with_context(|| format!("scenario '{}' failed", args.golden.display()))
}
