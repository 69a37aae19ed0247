//! Golden-file scenario
//!
//! Optionally runs setup and teardown commands, waits for batches on one
//! protocol, selects the batch carrying a marker entry and verifies it
//! against a golden file.

use std::path::PathBuf;

use async_trait::async_trait;
use shared::{Protocol, TelemetryBatch};

use super::Scenario;
use super::command::run_shell;
use crate::error::{HarnessError, HarnessResult};
use crate::runtime::RunContext;
use crate::testing::{Comparator, ComparisonRuleSet, Marker, Scrubber, Selector};

pub struct GoldenScenario {
    name: String,
    protocol: Protocol,
    golden: PathBuf,
    selector: Selector,
    min_batches: usize,
    comparator: Comparator,
    scrubber: Scrubber,
    setup_command: Option<String>,
    teardown_command: Option<String>,
    mutates: bool,
}

impl GoldenScenario {
    pub fn new(name: &str, protocol: Protocol, golden: impl Into<PathBuf>, marker: Marker) -> Self {
        Self {
            name: name.to_string(),
            protocol,
            golden: golden.into(),
            selector: Selector::new(marker),
            min_batches: 1,
            comparator: Comparator::default(),
            scrubber: Scrubber::default(),
            setup_command: None,
            teardown_command: None,
            mutates: false,
        }
    }

    pub fn rules(mut self, rules: ComparisonRuleSet) -> Self {
        self.comparator = Comparator::new(rules);
        self
    }

    pub fn scrubber(mut self, scrubber: Scrubber) -> Self {
        self.scrubber = scrubber;
        self
    }

    pub fn min_batches(mut self, count: usize) -> Self {
        self.min_batches = count;
        self
    }

    /// Skip the resource and record count check when selecting
    pub fn ignore_shape(mut self) -> Self {
        self.selector = self.selector.match_shape(false);
        self
    }

    /// Commands change the shared environment, so setting one requires the lease
    pub fn setup_command(mut self, command: &str) -> Self {
        self.setup_command = Some(command.to_string());
        self.mutates = true;
        self
    }

    pub fn teardown_command(mut self, command: &str) -> Self {
        self.teardown_command = Some(command.to_string());
        self.mutates = true;
        self
    }

    pub fn golden_path(&self, ctx: &RunContext) -> PathBuf {
        ctx.golden().path(&self.golden)
    }

    /// Reference used for selection; absent golden files are tolerated while regenerating
    async fn reference(&self, ctx: &RunContext) -> HarnessResult<Option<TelemetryBatch>> {
        match ctx.golden().read(&self.golden_path(ctx)).await {
            Ok(snapshot) => Ok(Some(snapshot.into_batch())),
            Err(HarnessError::GoldenMissing { path }) if ctx.golden().regenerating() => {
                tracing::warn!("📝 No golden file at {} yet; selecting by marker only", path.display());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Scenario for GoldenScenario {
    fn name(&self) -> &str {
        &self.name
    }

    fn mutates_environment(&self) -> bool {
        self.mutates
    }

    async fn setup(&self, _ctx: &RunContext) -> HarnessResult<()> {
        if let Some(command) = &self.setup_command {
            run_shell(command).await?;
        }
        Ok(())
    }

    async fn verify(&self, ctx: &RunContext) -> HarnessResult<()> {
        ctx.wait_for_batches(self.protocol, self.min_batches).await?;

        let reference = self.reference(ctx).await?;
        let (selector, expected) = match reference {
            Some(expected) => (self.selector.clone(), expected),
            None => (
                self.selector.clone().match_shape(false),
                TelemetryBatch::new(self.protocol.signal()),
            ),
        };

        let store = ctx.store(self.protocol)?;
        let selected = selector
            .select_with_timeout(ctx.waiter(), store, &expected, ctx.config().select)
            .await?;

        let golden = ctx.golden().clone().with_scrubber(self.scrubber.clone());
        golden
            .verify(&self.golden_path(ctx), &selected.batch, &self.comparator)
            .await
    }

    async fn teardown(&self, _ctx: &RunContext) -> HarnessResult<()> {
        if let Some(command) = &self.teardown_command {
            run_shell(command).await?;
        }
        Ok(())
    }
}
