//! Golden Store
//!
//! Reference snapshots on disk as YAML. A snapshot is always the canonical
//! form of a capture: scrubbed, entries sorted by name within each scope and
//! timestamps cleared. Regeneration mode rewrites the file and fails the run
//! so the new baseline gets reviewed before it is committed.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shared::TelemetryBatch;

use crate::error::{HarnessError, HarnessResult};
use crate::testing::comparator::Comparator;
use crate::testing::scrubber::Scrubber;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GoldenSnapshot {
    batch: TelemetryBatch,
}

impl GoldenSnapshot {
    /// Canonical snapshot of a capture
    pub fn from_capture(batch: &TelemetryBatch, scrubber: &Scrubber) -> Self {
        Self {
            batch: canonical_form(batch, scrubber),
        }
    }

    pub fn batch(&self) -> &TelemetryBatch {
        &self.batch
    }

    pub fn into_batch(self) -> TelemetryBatch {
        self.batch
    }

    pub fn to_yaml(&self) -> HarnessResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(text: &str) -> HarnessResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Scrubbed copy with entries sorted by name and timestamps cleared
pub fn canonical_form(batch: &TelemetryBatch, scrubber: &Scrubber) -> TelemetryBatch {
    let mut canonical = scrubber.scrub(batch);
    for resource in &mut canonical.resources {
        for scope in &mut resource.scopes {
            scope.entries.sort_by(|a, b| a.name.cmp(&b.name));
        }
    }
    for entry in canonical.entries_mut() {
        for point in &mut entry.points {
            point.start_time_unix_nano = None;
            point.time_unix_nano = None;
        }
    }
    canonical
}

#[derive(Debug, Clone)]
pub struct GoldenStore {
    root: PathBuf,
    regenerate: bool,
    scrubber: Scrubber,
}

impl GoldenStore {
    pub fn new<P: Into<PathBuf>>(root: P, regenerate: bool) -> Self {
        Self {
            root: root.into(),
            regenerate,
            scrubber: Scrubber::default(),
        }
    }

    pub fn with_scrubber(mut self, scrubber: Scrubber) -> Self {
        self.scrubber = scrubber;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn regenerating(&self) -> bool {
        self.regenerate
    }

    pub fn scrubber(&self) -> &Scrubber {
        &self.scrubber
    }

    /// Resolve `name` against the golden root; absolute paths pass through
    pub fn path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.root.join(name)
    }

    pub async fn read(&self, path: &Path) -> HarnessResult<GoldenSnapshot> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(HarnessError::GoldenMissing {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        GoldenSnapshot::from_yaml(&text)
    }

    pub async fn write(&self, path: &Path, snapshot: &GoldenSnapshot) -> HarnessResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, snapshot.to_yaml()?).await?;
        tracing::info!("💾 Wrote golden file {}", path.display());
        Ok(())
    }

    /// Compare `actual` with the golden file at `path`
    ///
    /// In regeneration mode the file is rewritten from `actual` instead and
    /// the call fails with [`HarnessError::RegenerationForced`].
    pub async fn verify(&self, path: &Path, actual: &TelemetryBatch, comparator: &Comparator) -> HarnessResult<()> {
        let snapshot = GoldenSnapshot::from_capture(actual, &self.scrubber);

        if self.regenerate {
            self.write(path, &snapshot).await?;
            tracing::warn!("📝 Golden file {} regenerated; failing until reviewed", path.display());
            return Err(HarnessError::RegenerationForced {
                path: path.to_path_buf(),
            });
        }

        let expected = self.read(path).await?;
        comparator.ensure_equal(snapshot.batch(), expected.batch())?;
        tracing::info!("✅ Capture matches {}", path.display());
        Ok(())
    }
}
