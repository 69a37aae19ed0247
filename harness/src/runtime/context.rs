//! Run Context
//!
//! Per-run owner of the sinks, the waiter, the golden store and the optional
//! lease. Built once at run start and handed by reference to every scenario
//! step; [`RunContext::shutdown`] is the single cleanup point.

use std::sync::Arc;

use shared::{PayloadDecoder, Protocol, log_shutdown, log_startup};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{HarnessConfig, HarnessSwitches};
use crate::error::HarnessResult;
use crate::runtime::lease::{LeaseCoordinator, holder_identity};
use crate::runtime::lease_backend::{FileLeaseBackend, InMemoryLeaseBackend, LeaseBackend};
use crate::runtime::sink::{ApiStubHandle, SinkSet};
use crate::runtime::store::BatchStore;
use crate::runtime::waiter::Waiter;
use crate::testing::GoldenStore;

pub struct RunContext {
    run_id: Uuid,
    config: HarnessConfig,
    sinks: SinkSet,
    api_stub: Option<ApiStubHandle>,
    waiter: Waiter,
    golden: GoldenStore,
    lease: Option<LeaseCoordinator>,
    shut_down: bool,
}

impl RunContext {
    /// Validate `config`, prepare the lease and start every configured sink
    pub async fn start(config: HarnessConfig, decoder: Arc<dyn PayloadDecoder>) -> HarnessResult<Self> {
        config.validate()?;
        let run_id = Uuid::new_v4();

        let waiter = match config.overall_timeout {
            Some(timeout) => Waiter::with_deadline(Instant::now() + timeout),
            None => Waiter::new(),
        };

        let lease = match &config.lease {
            Some(lease_config) => {
                let backend: Arc<dyn LeaseBackend> = match &config.lease_dir {
                    Some(dir) => Arc::new(FileLeaseBackend::new(dir.clone()).await?),
                    None => Arc::new(InMemoryLeaseBackend::new()),
                };
                let identity = holder_identity("harness", &run_id.to_string());
                Some(LeaseCoordinator::new(lease_config.clone(), identity, backend)?)
            }
            None => None,
        };

        let golden = GoldenStore::new(&config.golden_root, config.switches.update_expected_results);
        let api_stub = match config.api_stub {
            Some(bind) => Some(ApiStubHandle::start(bind).await?),
            None => None,
        };
        let sinks = match SinkSet::start(&config.sinks, decoder).await {
            Ok(sinks) => sinks,
            Err(e) => {
                if let Some(stub) = api_stub {
                    stub.stop().await;
                }
                return Err(e);
            }
        };

        log_startup(
            "harness",
            &format!(
                "run {} with {} sinks, golden root {}",
                run_id,
                config.sinks.len(),
                config.golden_root.display()
            ),
        );
        let active = config.switches.active();
        if !active.is_empty() {
            tracing::info!("🎛️ Active switches: {}", active.join(", "));
        }

        Ok(Self {
            run_id,
            config,
            sinks,
            api_stub,
            waiter,
            golden,
            lease,
            shut_down: false,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn switches(&self) -> &HarnessSwitches {
        &self.config.switches
    }

    pub fn sinks(&self) -> &SinkSet {
        &self.sinks
    }

    pub fn api_stub(&self) -> Option<&ApiStubHandle> {
        self.api_stub.as_ref()
    }

    pub fn store(&self, protocol: Protocol) -> HarnessResult<&BatchStore> {
        self.sinks.store(protocol)
    }

    pub fn waiter(&self) -> &Waiter {
        &self.waiter
    }

    pub fn golden(&self) -> &GoldenStore {
        &self.golden
    }

    pub fn lease(&self) -> Option<&LeaseCoordinator> {
        self.lease.as_ref()
    }

    /// Wait until the `protocol` sink has captured at least `wanted` batches
    pub async fn wait_for_batches(&self, protocol: Protocol, wanted: usize) -> HarnessResult<()> {
        let store = self.store(protocol)?;
        self.waiter.wait_for_batches(store, wanted, self.config.wait).await
    }

    /// Become leader of the configured lease; no-op without one
    pub async fn acquire_lease(&self) -> HarnessResult<()> {
        match &self.lease {
            Some(lease) => Ok(lease.acquire(lease.config().acquire_timeout).await?),
            None => {
                tracing::warn!("⚠️ No lease configured; running without exclusive access");
                Ok(())
            }
        }
    }

    /// Fail when a configured lease is not currently held
    pub fn ensure_exclusive(&self) -> HarnessResult<()> {
        match &self.lease {
            Some(lease) => Ok(lease.ensure_leading()?),
            None => Ok(()),
        }
    }

    /// Stop the sinks and release the lease; safe to call more than once
    ///
    /// Sinks are stopped even when the release fails.
    pub async fn shutdown(&mut self) -> HarnessResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        self.sinks.stop_all().await;
        if let Some(stub) = self.api_stub.take() {
            stub.stop().await;
        }
        let released = match &self.lease {
            Some(lease) => lease.release().await,
            None => Ok(()),
        };

        log_shutdown("harness", &format!("run {} finished", self.run_id));
        Ok(released?)
    }
}
