//! Lease coordination tests
//!
//! Two runs sharing one lease directory, as two CI jobs sharing a cluster
//! would.

use std::sync::Arc;
use std::time::Duration;

use harness::runtime::{FileLeaseBackend, LeaseBackend, holder_identity};
use harness::*;
use shared::Protocol;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

mod common;
use common::{TestFixtures, TestHelpers};

fn fast_lease() -> LeaseConfig {
    LeaseConfig::new(TestFixtures::LEASE_KEY)
        .with_timings(Duration::from_millis(800), Duration::from_millis(500), Duration::from_millis(50))
        .acquire_timeout(Duration::from_secs(5))
}

async fn coordinator(dir: &TempDir, name: &str) -> LeaseCoordinator {
    let backend: Arc<dyn LeaseBackend> = Arc::new(FileLeaseBackend::new(dir.path()).await.unwrap());
    LeaseCoordinator::new(fast_lease(), holder_identity("it", name), backend).unwrap()
}

#[tokio::test]
async fn test_second_holder_waits_for_release() {
    let dir = TempDir::new().unwrap();
    let first = coordinator(&dir, "first").await;
    let second = coordinator(&dir, "second").await;

    first.acquire(Duration::from_secs(1)).await.unwrap();
    assert_ok!(first.ensure_leading());

    let waiting = tokio::spawn(async move {
        second.acquire(Duration::from_secs(5)).await.map(|_| second)
    });

    // Renewals keep the lease with the first holder well past its TTL
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(!waiting.is_finished());
    first.ensure_leading().unwrap();

    first.release().await.unwrap();
    let second = waiting.await.unwrap().unwrap();
    second.ensure_leading().unwrap();
    assert_eq!(second.state(), LeaseState::Leading);
    second.release().await.unwrap();
}

#[tokio::test]
async fn test_acquire_times_out_while_held() {
    let dir = TempDir::new().unwrap();
    let first = coordinator(&dir, "first").await;
    let second = coordinator(&dir, "second").await;

    first.acquire(Duration::from_secs(1)).await.unwrap();
    let err = second.acquire(Duration::from_millis(300)).await.unwrap_err();
    assert!(matches!(err, LeaseError::AcquireTimeout { .. }));
    assert_err!(second.ensure_leading());

    first.release().await.unwrap();
}

/// Mutating scenarios run under the lease and free it afterwards
#[tokio::test]
async fn test_runner_holds_lease_only_during_the_run() {
    let dir = TempDir::new().unwrap();
    let lease_dir = TempDir::new().unwrap();

    let mut config = TestHelpers::config(&[Protocol::HecMetrics], dir.path());
    config.lease = Some(fast_lease());
    config.lease_dir = Some(lease_dir.path().to_path_buf());
    config.switches.skip_tests = true;

    let scenario = GoldenScenario::new("env", Protocol::HecMetrics, "unused.yaml", Marker::new(TestFixtures::MARKER))
        .setup_command(&format!("test -f {}/{}.lease", lease_dir.path().display(), TestFixtures::LEASE_KEY));
    ScenarioRunner::new(config).run(&scenario).await.unwrap();

    let other = coordinator(&lease_dir, "after").await;
    other.acquire(Duration::from_millis(500)).await.unwrap();
    other.release().await.unwrap();
}
