//! Lease Coordinator
//!
//! Mutual exclusion over the shared test environment. A coordinator moves
//! through `Idle → Acquiring → Leading → Releasing → Idle`; while leading, a
//! renewal task extends the lease every retry period and reports outcomes
//! over an event queue. A supervisor task drains that queue and drops the
//! coordinator straight back to `Idle` when leadership is lost.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{LeaseError, LeaseResult};
use crate::runtime::lease_backend::LeaseBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Idle,
    Acquiring,
    Leading,
    Releasing,
}

impl fmt::Display for LeaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LeaseState::Idle => "idle",
            LeaseState::Acquiring => "acquiring",
            LeaseState::Leading => "leading",
            LeaseState::Releasing => "releasing",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaseConfig {
    pub key: String,
    /// Lifetime of an unrenewed lease
    pub ttl: Duration,
    /// Leadership is given up when no renewal succeeded for this long
    pub renew_deadline: Duration,
    /// Cadence of acquire attempts and renewals
    pub retry_period: Duration,
    /// How long a run waits to become leader
    pub acquire_timeout: Duration,
}

impl LeaseConfig {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ttl: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
            acquire_timeout: Duration::from_secs(300),
        }
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_timings(mut self, ttl: Duration, renew_deadline: Duration, retry_period: Duration) -> Self {
        self.ttl = ttl;
        self.renew_deadline = renew_deadline;
        self.retry_period = retry_period;
        self
    }

    /// Require `0 < retry_period < renew_deadline < ttl`
    pub fn validate(&self) -> LeaseResult<()> {
        if self.key.is_empty() {
            return Err(LeaseError::InvalidConfig {
                reason: "lease key must not be empty".to_string(),
            });
        }
        if self.retry_period.is_zero() {
            return Err(LeaseError::InvalidConfig {
                reason: "retry period must be positive".to_string(),
            });
        }
        if self.retry_period >= self.renew_deadline || self.renew_deadline >= self.ttl {
            return Err(LeaseError::InvalidConfig {
                reason: format!(
                    "expected retry period ({:?}) < renew deadline ({:?}) < ttl ({:?})",
                    self.retry_period, self.renew_deadline, self.ttl
                ),
            });
        }
        Ok(())
    }
}

/// Holder identity of the form `host:scope:name:unix-nanos`
pub fn holder_identity(scope: &str, name: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{}:{}:{}:{}", hostname(), scope, name, nanos)
}

#[cfg(unix)]
fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(not(unix))]
fn hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Outcome reported by the renewal task
#[derive(Debug, Clone, PartialEq)]
pub enum LeaseEvent {
    Renewed,
    RenewFailed { reason: String },
    Lost { reason: String },
}

/// Puts an acquisition that was dropped mid-flight back to `Idle`
struct AcquireAttempt<'a> {
    state: &'a watch::Sender<LeaseState>,
}

impl Drop for AcquireAttempt<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|state| {
            if *state == LeaseState::Acquiring {
                *state = LeaseState::Idle;
                true
            } else {
                false
            }
        });
    }
}

struct Renewal {
    stop: oneshot::Sender<()>,
    renewer: JoinHandle<()>,
    supervisor: JoinHandle<()>,
}

pub struct LeaseCoordinator {
    config: LeaseConfig,
    identity: String,
    backend: Arc<dyn LeaseBackend>,
    state: Arc<watch::Sender<LeaseState>>,
    lost: Arc<Mutex<Option<String>>>,
    last_renewed: Arc<Mutex<Instant>>,
    renewal: Mutex<Option<Renewal>>,
}

impl LeaseCoordinator {
    pub fn new(config: LeaseConfig, identity: String, backend: Arc<dyn LeaseBackend>) -> LeaseResult<Self> {
        config.validate()?;
        let (state, _) = watch::channel(LeaseState::Idle);
        Ok(Self {
            config,
            identity,
            backend,
            state: Arc::new(state),
            lost: Arc::new(Mutex::new(None)),
            last_renewed: Arc::new(Mutex::new(Instant::now())),
            renewal: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> LeaseState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<LeaseState> {
        self.state.subscribe()
    }

    /// Block until this holder leads or `timeout` passes
    pub async fn acquire(&self, timeout: Duration) -> LeaseResult<()> {
        let entered = self.state.send_if_modified(|state| {
            if *state == LeaseState::Idle {
                *state = LeaseState::Acquiring;
                true
            } else {
                false
            }
        });
        if !entered {
            return Err(self.invalid_state("acquire"));
        }
        let _attempt = AcquireAttempt { state: &self.state };
        *self.lost.lock().unwrap_or_else(PoisonError::into_inner) = None;

        let key = &self.config.key;
        tracing::info!("🔒 Acquiring lease '{}' as {}", key, self.identity);
        let started = Instant::now();

        loop {
            match self.backend.try_acquire(key, &self.identity, self.config.ttl).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => tracing::warn!("⚠️ Lease '{}' acquire attempt failed: {}", key, e),
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                let holder = self
                    .backend
                    .current_holder(key)
                    .await
                    .ok()
                    .flatten()
                    .map(|record| record.holder);
                tracing::warn!("⏰ Gave up on lease '{}' after {:?} (holder: {:?})", key, elapsed, holder);
                return Err(LeaseError::AcquireTimeout {
                    key: key.clone(),
                    holder,
                    waited: elapsed,
                });
            }

            tokio::time::sleep(self.config.retry_period.min(timeout - elapsed)).await;
        }

        *self.last_renewed.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.state.send_replace(LeaseState::Leading);
        tracing::info!("👑 New leader for lease '{}': {}", key, self.identity);
        self.start_renewal();
        Ok(())
    }

    /// Fail unless this holder currently leads
    ///
    /// A lease whose last successful renewal is older than the renew deadline
    /// counts as lost even before the supervisor has reacted.
    pub fn ensure_leading(&self) -> LeaseResult<()> {
        if self.state() == LeaseState::Leading {
            let since = self.last_renewed.lock().unwrap_or_else(PoisonError::into_inner).elapsed();
            if since < self.config.renew_deadline {
                return Ok(());
            }
            return Err(LeaseError::LeadershipLost {
                key: self.config.key.clone(),
                reason: format!("no successful renewal for {:?}", since),
            });
        }
        match self.lost_reason() {
            Some(reason) => Err(LeaseError::LeadershipLost {
                key: self.config.key.clone(),
                reason,
            }),
            None => Err(self.invalid_state("exclusive access")),
        }
    }

    /// Why leadership was lost during the current tenure, if it was
    pub fn lost_reason(&self) -> Option<String> {
        self.lost.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Give up the lease and wait until the backend shows it free
    ///
    /// Releasing after leadership was lost reports the loss.
    pub async fn release(&self) -> LeaseResult<()> {
        let key = &self.config.key;
        let entered = self.state.send_if_modified(|state| {
            if *state == LeaseState::Leading {
                *state = LeaseState::Releasing;
                true
            } else {
                false
            }
        });

        if !entered {
            return match self.state() {
                LeaseState::Idle => {
                    self.stop_renewal().await;
                    match self.lost_reason() {
                        Some(reason) => Err(LeaseError::LeadershipLost {
                            key: key.clone(),
                            reason,
                        }),
                        None => Ok(()),
                    }
                }
                _ => Err(self.invalid_state("release")),
            };
        }

        tracing::info!("🔓 Releasing lease '{}'", key);
        self.stop_renewal().await;

        // Loss reported by the renewal task after we entered Releasing
        if let Some(reason) = self.lost_reason() {
            if let Err(e) = self.backend.release(key, &self.identity).await {
                tracing::warn!("⚠️ Lease '{}' cleanup after loss failed: {}", key, e);
            }
            self.state.send_replace(LeaseState::Idle);
            tracing::error!("❌ Lease '{}' was lost before release: {}", key, reason);
            return Err(LeaseError::LeadershipLost {
                key: key.clone(),
                reason,
            });
        }

        let result = self.release_and_confirm().await;
        self.state.send_replace(LeaseState::Idle);
        match &result {
            Ok(()) => tracing::info!("✅ Lease '{}' released", key),
            Err(e) => tracing::error!("❌ Lease '{}' release failed: {}", key, e),
        }
        result
    }

    async fn release_and_confirm(&self) -> LeaseResult<()> {
        let key = &self.config.key;
        self.backend.release(key, &self.identity).await?;

        let deadline = Instant::now() + self.config.ttl;
        loop {
            match self.backend.current_holder(key).await? {
                Some(record) if record.holder == self.identity => {
                    if Instant::now() >= deadline {
                        return Err(LeaseError::ReleaseUnconfirmed {
                            key: key.clone(),
                            holder: record.holder,
                        });
                    }
                    tokio::time::sleep(self.config.retry_period).await;
                }
                _ => return Ok(()),
            }
        }
    }

    fn start_renewal(&self) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let renewer = tokio::spawn(renew_loop(
            self.backend.clone(),
            self.config.clone(),
            self.identity.clone(),
            self.last_renewed.clone(),
            events_tx,
            stop_rx,
        ));
        let supervisor = tokio::spawn(supervise(
            self.config.key.clone(),
            events_rx,
            self.state.clone(),
            self.lost.clone(),
        ));

        let previous = self
            .renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Renewal {
                stop: stop_tx,
                renewer,
                supervisor,
            });
        if let Some(previous) = previous {
            previous.renewer.abort();
            previous.supervisor.abort();
        }
    }

    async fn stop_renewal(&self) {
        let renewal = self.renewal.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(renewal) = renewal {
            let _ = renewal.stop.send(());
            if let Err(e) = renewal.renewer.await {
                tracing::warn!("Lease renewal task ended abnormally: {}", e);
            }
            if let Err(e) = renewal.supervisor.await {
                tracing::warn!("Lease supervisor task ended abnormally: {}", e);
            }
        }
    }

    fn invalid_state(&self, operation: &str) -> LeaseError {
        LeaseError::InvalidState {
            key: self.config.key.clone(),
            operation: operation.to_string(),
            state: self.state().to_string(),
        }
    }
}

impl Drop for LeaseCoordinator {
    fn drop(&mut self) {
        let renewal = self.renewal.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(renewal) = renewal {
            renewal.renewer.abort();
            renewal.supervisor.abort();
        }
    }
}

async fn renew_loop(
    backend: Arc<dyn LeaseBackend>,
    config: LeaseConfig,
    identity: String,
    last_renewed: Arc<Mutex<Instant>>,
    events: mpsc::UnboundedSender<LeaseEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + config.retry_period, config.retry_period);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {}
        }

        let attempt = tokio::time::timeout(
            config.retry_period,
            backend.renew(&config.key, &identity, config.ttl),
        )
        .await;

        let event = match attempt {
            Ok(Ok(true)) => {
                *last_renewed.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
                LeaseEvent::Renewed
            }
            Ok(Ok(false)) => LeaseEvent::Lost {
                reason: "lease expired or taken over by another holder".to_string(),
            },
            Ok(Err(e)) => LeaseEvent::RenewFailed { reason: e.to_string() },
            Err(_) => LeaseEvent::RenewFailed {
                reason: format!("renewal did not finish within {:?}", config.retry_period),
            },
        };

        let lost = matches!(event, LeaseEvent::Lost { .. });
        let _ = events.send(event);
        if lost {
            break;
        }

        let since = last_renewed.lock().unwrap_or_else(PoisonError::into_inner).elapsed();
        if since >= config.renew_deadline {
            let _ = events.send(LeaseEvent::Lost {
                reason: format!("no successful renewal within {:?}", config.renew_deadline),
            });
            break;
        }
    }
}

async fn supervise(
    key: String,
    mut events: mpsc::UnboundedReceiver<LeaseEvent>,
    state: Arc<watch::Sender<LeaseState>>,
    lost: Arc<Mutex<Option<String>>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            LeaseEvent::Renewed => tracing::debug!("🔁 Lease '{}' renewed", key),
            LeaseEvent::RenewFailed { reason } => {
                tracing::warn!("⚠️ Lease '{}' renewal failed: {}", key, reason)
            }
            LeaseEvent::Lost { reason } => {
                tracing::error!("💥 Leadership of lease '{}' lost: {}", key, reason);
                *lost.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason);
                state.send_if_modified(|current| {
                    if *current == LeaseState::Leading {
                        *current = LeaseState::Idle;
                        true
                    } else {
                        false
                    }
                });
                break;
            }
        }
    }
}
