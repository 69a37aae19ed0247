//! Test Scenarios
//!
//! A [`Scenario`] is set up, verified and torn down inside one
//! [`RunContext`]. The [`ScenarioRunner`] owns that lifecycle and honors the
//! harness switches.

pub mod command;
pub mod golden;

pub use command::run_shell;
pub use golden::GoldenScenario;

use std::sync::Arc;

use async_trait::async_trait;
use shared::{JsonBatchDecoder, PayloadDecoder, log_error};

use crate::config::HarnessConfig;
use crate::error::HarnessResult;
use crate::runtime::RunContext;

#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the scenario changes the shared environment and needs the lease
    fn mutates_environment(&self) -> bool {
        true
    }

    async fn setup(&self, ctx: &RunContext) -> HarnessResult<()>;

    async fn verify(&self, ctx: &RunContext) -> HarnessResult<()>;

    async fn teardown(&self, ctx: &RunContext) -> HarnessResult<()>;
}

pub struct ScenarioRunner {
    config: HarnessConfig,
    decoder: Arc<dyn PayloadDecoder>,
}

impl ScenarioRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config,
            decoder: Arc::new(JsonBatchDecoder),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn PayloadDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Run `scenario` from context start to shutdown
    ///
    /// The first error wins. Shutdown (sinks stopped, lease released) happens
    /// on every path; its error is only returned when nothing failed before.
    pub async fn run(&self, scenario: &dyn Scenario) -> HarnessResult<()> {
        tracing::info!("🧪 Scenario '{}'", scenario.name());
        let mut ctx = RunContext::start(self.config.clone(), self.decoder.clone()).await?;

        let outcome = Self::drive(&ctx, scenario).await;
        let cleanup = ctx.shutdown().await;

        match (outcome, cleanup) {
            (Ok(()), Ok(())) => {
                tracing::info!("✅ Scenario '{}': PASSED", scenario.name());
                Ok(())
            }
            (Err(e), cleanup) => {
                if let Err(cleanup_error) = cleanup {
                    tracing::warn!("⚠️ Cleanup after failure also failed: {}", cleanup_error);
                }
                log_error("harness", &format!("scenario '{}'", scenario.name()), &e);
                Err(e)
            }
            (Ok(()), Err(e)) => {
                log_error("harness", &format!("cleanup of scenario '{}'", scenario.name()), &e);
                Err(e)
            }
        }
    }

    async fn drive(ctx: &RunContext, scenario: &dyn Scenario) -> HarnessResult<()> {
        let switches = ctx.switches().clone();
        let exclusive = scenario.mutates_environment();

        if exclusive {
            ctx.acquire_lease().await?;
        }

        if switches.teardown_before_setup {
            tracing::info!("🧹 Tearing down leftovers before setup");
            Self::gate(ctx, exclusive)?;
            scenario.teardown(ctx).await?;
        }

        let mut outcome = if switches.skip_setup {
            tracing::info!("⏭️ Skipping setup");
            Ok(())
        } else {
            match Self::gate(ctx, exclusive) {
                Ok(()) => scenario.setup(ctx).await,
                Err(e) => Err(e),
            }
        };

        if outcome.is_ok() {
            outcome = if switches.skip_tests {
                tracing::info!("⏭️ Skipping verification");
                Ok(())
            } else {
                scenario.verify(ctx).await
            };
        }

        if switches.skip_teardown {
            tracing::info!("⏭️ Skipping teardown");
            return outcome;
        }

        let teardown = match Self::gate(ctx, exclusive) {
            Ok(()) => scenario.teardown(ctx).await,
            Err(e) => Err(e),
        };
        match (outcome, teardown) {
            (Err(e), Err(teardown_error)) => {
                tracing::warn!("⚠️ Teardown failed after an earlier error: {}", teardown_error);
                Err(e)
            }
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Mutating steps require the lease to still be held
    fn gate(ctx: &RunContext, exclusive: bool) -> HarnessResult<()> {
        if exclusive { ctx.ensure_exclusive() } else { Ok(()) }
    }
}
