//! Ephemeral artifact registry.
//!
//! Tracks every generated spreadsheet together with its expiration deadline,
//! reclaims expired files on a fixed cadence and removes everything that is
//! still outstanding when the service stops.
//!
//! All mutation of the id -> deadline map goes through one `RwLock`. Sweeps
//! and shutdown hold the write lock for their whole pass, so a file is never
//! deleted while another path still believes it is tracked.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{deadline_passed, Artifact, ARTIFACT_EXTENSION, ARTIFACT_PREFIX};

/// Storage faults raised by the registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid registry configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to create artifact directory {}: {source}", .path.display())]
    CreateRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to persist artifact {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove artifact directory {}: {source}", .path.display())]
    RemoveRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Artifact deadline out of range: {validity_seconds}s from {now}")]
    DeadlineOutOfRange {
        now: DateTime<Utc>,
        validity_seconds: i64,
    },

    #[error("Artifact registry is shut down")]
    Closed,
}

/// Construction inputs; all three are required
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory that holds the artifact files
    pub root: PathBuf,

    /// How long an artifact stays downloadable
    pub validity: Duration,

    /// Pause between two eviction sweeps
    pub sweep_interval: Duration,
}

/// Why a tracked artifact left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimReason {
    /// Deadline passed and the file was deleted
    Expired,

    /// Deadline passed but the file was already gone
    Missing,

    /// Removed during shutdown
    Shutdown,
}

/// A removal that failed and was left for a later pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimFailure {
    pub id: String,
    pub error: String,
}

/// Outcome of one eviction sweep or of shutdown
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Entries tracked when the pass started
    pub scanned: usize,

    /// Files deleted by this pass
    pub removed: Vec<String>,

    /// Entries dropped because their file no longer existed
    pub missing: Vec<String>,

    /// Removals that failed
    pub failed: Vec<ReclaimFailure>,

    /// Entries still tracked after the pass
    pub retained: usize,
}

impl SweepReport {
    /// Number of entries that left the registry in this pass
    pub fn reclaimed(&self) -> usize {
        self.removed.len() + self.missing.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Receives reclamation events.
///
/// Injected at construction so the registry does not depend on a global
/// logger and tests can observe what happened.
pub trait ReclaimObserver: Send + Sync {
    fn registered(&self, _id: &str, _expires_at: DateTime<Utc>) {}

    fn reclaimed(&self, _id: &str, _reason: ReclaimReason) {}

    fn reclaim_failed(&self, _id: &str, _error: &std::io::Error) {}

    fn sweep_finished(&self, _report: &SweepReport) {}
}

/// Observer that forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ReclaimObserver for TracingObserver {
    fn registered(&self, id: &str, expires_at: DateTime<Utc>) {
        tracing::debug!("Tracking artifact {} until {}", id, expires_at.to_rfc3339());
    }

    fn reclaimed(&self, id: &str, reason: ReclaimReason) {
        match reason {
            ReclaimReason::Expired => tracing::info!("Removed expired artifact: {}", id),
            ReclaimReason::Missing => {
                tracing::warn!("Expired artifact already absent, dropping entry: {}", id)
            }
            ReclaimReason::Shutdown => tracing::debug!("Removed artifact on shutdown: {}", id),
        }
    }

    fn reclaim_failed(&self, id: &str, error: &std::io::Error) {
        tracing::warn!("Failed to remove artifact {}: {}", id, error);
    }

    fn sweep_finished(&self, report: &SweepReport) {
        if report.reclaimed() > 0 || !report.is_clean() {
            tracing::info!(
                scanned = report.scanned,
                removed = report.removed.len(),
                missing = report.missing.len(),
                failed = report.failed.len(),
                retained = report.retained,
                "Artifact sweep finished"
            );
        } else {
            tracing::trace!(scanned = report.scanned, "Artifact sweep found nothing to do");
        }
    }
}

/// Concurrency-safe owner of artifact lifetimes
pub struct ArtifactRegistry {
    root: PathBuf,
    validity: TimeDelta,
    sweep_interval: Duration,

    /// id -> deadline
    entries: RwLock<HashMap<String, DateTime<Utc>>>,

    /// Set under the write lock by `shutdown`
    closed: AtomicBool,

    /// Set once `shutdown` has removed the storage directory
    root_removed: AtomicBool,

    /// Stops the background sweeper
    cancel: CancellationToken,

    observer: Arc<dyn ReclaimObserver>,
}

impl ArtifactRegistry {
    /// Create the registry and its storage directory
    pub async fn open(
        config: RegistryConfig,
        observer: Arc<dyn ReclaimObserver>,
    ) -> Result<Arc<Self>, RegistryError> {
        if config.sweep_interval.is_zero() {
            return Err(RegistryError::InvalidConfig(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        let validity = TimeDelta::from_std(config.validity).map_err(|e| {
            RegistryError::InvalidConfig(format!("validity duration out of range: {}", e))
        })?;
        if Utc::now().checked_add_signed(validity).is_none() {
            return Err(RegistryError::InvalidConfig(format!(
                "validity of {}s puts deadlines past the last representable date",
                config.validity.as_secs()
            )));
        }

        fs::create_dir_all(&config.root)
            .await
            .map_err(|source| RegistryError::CreateRoot {
                path: config.root.clone(),
                source,
            })?;

        tracing::info!(
            "Artifact registry at {} (validity {}s, sweep every {}s)",
            config.root.display(),
            config.validity.as_secs(),
            config.sweep_interval.as_secs()
        );

        Ok(Arc::new(Self {
            root: config.root,
            validity,
            sweep_interval: config.sweep_interval,
            entries: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            root_removed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            observer,
        }))
    }

    /// Storage directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-artifact validity window
    pub fn validity(&self) -> TimeDelta {
        self.validity
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Location of an artifact id inside the storage directory
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Number of tracked artifacts
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn is_tracked(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    /// Deadline of a tracked artifact
    pub async fn expires_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(id).copied()
    }

    /// Track `id` until `expires_at`, replacing any earlier deadline.
    ///
    /// Never fails. After shutdown the call is ignored.
    pub async fn register(&self, id: &str, expires_at: DateTime<Utc>) {
        if !self.track(id, expires_at).await {
            tracing::warn!("Registry is shut down, not tracking artifact {}", id);
        }
    }

    /// Insert under the write lock; false once the registry is closed
    async fn track(&self, id: &str, expires_at: DateTime<Utc>) -> bool {
        let mut entries = self.entries.write().await;
        if self.is_closed() {
            return false;
        }
        entries.insert(id.to_string(), expires_at);
        drop(entries);

        self.observer.registered(id, expires_at);
        true
    }

    /// Write `bytes` to a new artifact file and track it.
    ///
    /// The artifact is registered before any byte is written, so a returned
    /// id is always tracked. A failed write discards the artifact again.
    pub async fn persist(&self, bytes: &[u8]) -> Result<Artifact, RegistryError> {
        if self.is_closed() {
            return Err(RegistryError::Closed);
        }

        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| RegistryError::CreateRoot {
                path: self.root.clone(),
                source,
            })?;

        let expires_at = self.deadline_from(Utc::now())?;

        let id = format!(
            "{}{}.{}",
            ARTIFACT_PREFIX,
            Uuid::new_v4().simple(),
            ARTIFACT_EXTENSION
        );
        let path = self.path_for(&id);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| RegistryError::Persist {
                path: path.clone(),
                source,
            })?;

        if !self.track(&id, expires_at).await {
            drop(file);
            let _ = fs::remove_file(&path).await;
            // Shutdown may have removed the root before we recreated it
            let _ = fs::remove_dir(&self.root).await;
            return Err(RegistryError::Closed);
        }

        if let Err(source) = write_bytes(&mut file, bytes).await {
            drop(file);
            self.discard(&id).await;
            return Err(RegistryError::Persist { path, source });
        }

        Ok(Artifact::new(id, path, expires_at))
    }

    /// Deadline of an artifact created at `now`
    fn deadline_from(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, RegistryError> {
        now.checked_add_signed(self.validity)
            .ok_or(RegistryError::DeadlineOutOfRange {
                now,
                validity_seconds: self.validity.num_seconds(),
            })
    }

    /// Stop tracking `id` and delete its file
    pub async fn discard(&self, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        if entries.remove(id).is_none() {
            return false;
        }
        if let Err(e) = fs::remove_file(self.path_for(id)).await {
            if e.kind() != ErrorKind::NotFound {
                self.observer.reclaim_failed(id, &e);
            }
        }
        true
    }

    /// Remove every artifact whose deadline is strictly before `now`.
    ///
    /// A removal that fails for any reason other than the file being absent
    /// keeps the entry for the next sweep. One failure never stops the pass.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let mut entries = self.entries.write().await;

        let mut report = SweepReport {
            scanned: entries.len(),
            ..Default::default()
        };

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, expires_at)| deadline_passed(**expires_at, now))
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            match fs::remove_file(self.path_for(&id)).await {
                Ok(()) => {
                    entries.remove(&id);
                    self.observer.reclaimed(&id, ReclaimReason::Expired);
                    report.removed.push(id);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    entries.remove(&id);
                    self.observer.reclaimed(&id, ReclaimReason::Missing);
                    report.missing.push(id);
                }
                Err(e) => {
                    self.observer.reclaim_failed(&id, &e);
                    report.failed.push(ReclaimFailure {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.retained = entries.len();
        self.observer.sweep_finished(&report);
        report
    }

    /// Remove every tracked artifact and the storage directory.
    ///
    /// Individual removal failures are reported, not returned. Only failing
    /// to remove the directory itself is an error, and a later call retries
    /// it. Once everything is gone, calling this again is a no-op.
    pub async fn shutdown(&self) -> Result<SweepReport, RegistryError> {
        self.cancel.cancel();

        let mut entries = self.entries.write().await;
        let already_closed = self.closed.swap(true, Ordering::SeqCst);

        let mut report = SweepReport {
            scanned: entries.len(),
            ..Default::default()
        };

        for (id, _) in entries.drain() {
            match fs::remove_file(self.path_for(&id)).await {
                Ok(()) => {
                    self.observer.reclaimed(&id, ReclaimReason::Shutdown);
                    report.removed.push(id);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    report.missing.push(id);
                }
                Err(e) => {
                    self.observer.reclaim_failed(&id, &e);
                    report.failed.push(ReclaimFailure {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if already_closed && report.scanned == 0 && self.root_removed.load(Ordering::SeqCst) {
            return Ok(report);
        }

        match fs::remove_dir_all(&self.root).await {
            Ok(()) => self.root_removed.store(true, Ordering::SeqCst),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.root_removed.store(true, Ordering::SeqCst)
            }
            Err(source) => {
                return Err(RegistryError::RemoveRoot {
                    path: self.root.clone(),
                    source,
                })
            }
        }

        self.observer.sweep_finished(&report);
        tracing::info!(
            "Artifact registry shut down, removed {} artifact(s)",
            report.removed.len()
        );
        Ok(report)
    }

    /// Start the background eviction loop.
    ///
    /// The first sweep runs one interval after spawning. The loop ends when
    /// `shutdown` is called.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweepHandle {
        let registry = Arc::clone(self);
        let token = self.cancel.clone();

        let task = tokio::spawn(async move {
            let period = registry.sweep_interval;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.evict_expired(Utc::now()).await;
                    }
                }
            }

            tracing::debug!("Artifact sweeper stopped");
        });

        SweepHandle { task }
    }
}

async fn write_bytes(file: &mut File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Handle to the background sweeper task
pub struct SweepHandle {
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Wait for the sweeper to exit (after `shutdown`)
    pub async fn join(self) -> Result<(), tokio::task::JoinError> {
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_in(temp: &TempDir) -> Arc<ArtifactRegistry> {
        ArtifactRegistry::open(
            RegistryConfig {
                root: temp.path().join("downloads"),
                validity: Duration::from_secs(120),
                sweep_interval: Duration::from_secs(30),
            },
            Arc::new(TracingObserver),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_root() {
        let temp = TempDir::new().unwrap();
        let registry = open_in(&temp).await;

        assert!(registry.root().is_dir());
        assert!(registry.is_empty().await);
        assert!(!registry.is_closed());
    }

    #[tokio::test]
    async fn test_zero_sweep_interval_rejected() {
        let temp = TempDir::new().unwrap();
        let result = ArtifactRegistry::open(
            RegistryConfig {
                root: temp.path().to_path_buf(),
                validity: Duration::from_secs(1),
                sweep_interval: Duration::ZERO,
            },
            Arc::new(TracingObserver),
        )
        .await;

        assert!(matches!(result, Err(RegistryError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_unrepresentable_validity_rejected() {
        let temp = TempDir::new().unwrap();
        let result = ArtifactRegistry::open(
            RegistryConfig {
                root: temp.path().join("downloads"),
                validity: Duration::from_secs(10_000_000_000_000),
                sweep_interval: Duration::from_secs(30),
            },
            Arc::new(TracingObserver),
        )
        .await;

        assert!(matches!(result, Err(RegistryError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_deadline_overflow_is_an_error() {
        let temp = TempDir::new().unwrap();
        let registry = open_in(&temp).await;

        let result = registry.deadline_from(DateTime::<Utc>::MAX_UTC);

        assert!(matches!(
            result,
            Err(RegistryError::DeadlineOutOfRange { validity_seconds: 120, .. })
        ));
        assert!(registry.deadline_from(Utc::now()).is_ok());
    }

    #[tokio::test]
    async fn test_persist_registers_before_returning() {
        let temp = TempDir::new().unwrap();
        let registry = open_in(&temp).await;

        let artifact = registry.persist(b"payload").await.unwrap();

        assert!(artifact.id.starts_with(ARTIFACT_PREFIX));
        assert!(artifact.id.ends_with(".xlsx"));
        assert_eq!(artifact.path, registry.path_for(&artifact.id));
        assert_eq!(std::fs::read(&artifact.path).unwrap(), b"payload");
        assert_eq!(
            registry.expires_at(&artifact.id).await,
            Some(artifact.expires_at)
        );
    }

    #[tokio::test]
    async fn test_discard_removes_entry_and_file() {
        let temp = TempDir::new().unwrap();
        let registry = open_in(&temp).await;
        let artifact = registry.persist(b"x").await.unwrap();

        assert!(registry.discard(&artifact.id).await);
        assert!(!registry.is_tracked(&artifact.id).await);
        assert!(!artifact.path.exists());
        assert!(!registry.discard(&artifact.id).await);
    }

    #[tokio::test]
    async fn test_persist_after_shutdown_fails() {
        let temp = TempDir::new().unwrap();
        let registry = open_in(&temp).await;
        registry.shutdown().await.unwrap();

        let result = registry.persist(b"late").await;

        assert!(matches!(result, Err(RegistryError::Closed)));
        assert!(!registry.root().exists());
    }

    #[tokio::test]
    async fn test_register_after_shutdown_is_ignored() {
        let temp = TempDir::new().unwrap();
        let registry = open_in(&temp).await;
        registry.shutdown().await.unwrap();

        registry.register("result-late.xlsx", Utc::now()).await;

        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_shutdown_retries_root_removal() {
        let temp = TempDir::new().unwrap();
        let registry = open_in(&temp).await;

        // A plain file where the directory should be cannot be removed as a directory
        std::fs::remove_dir(registry.root()).unwrap();
        std::fs::write(registry.root(), b"not a dir").unwrap();

        let first = registry.shutdown().await;
        assert!(matches!(first, Err(RegistryError::RemoveRoot { .. })));

        std::fs::remove_file(registry.root()).unwrap();
        std::fs::create_dir(registry.root()).unwrap();

        registry.shutdown().await.unwrap();
        assert!(!registry.root().exists());

        // Nothing left to do now
        assert_eq!(registry.shutdown().await.unwrap(), SweepReport::default());
    }
}
