//! # Validation Pipeline
//!
//! Post-transfer integrity checks on a fixed pool of workers.
//!
//! ## Overview
//!
//! Transferred paths are submitted to a bounded queue. Workers pull from the
//! shared receiver, verify the image on the blocking pool, and move files that
//! fail into `<local-root>/corrupted/`. Submission waits only when the queue
//! is full. [`ValidationPipeline::drain`] closes the queue and waits until
//! every submitted path has an outcome.
//!
//! Files are moved, never deleted. The quarantine name is derived from the
//! path relative to the local root (see [`quarantine_name`]) and never
//! replaces an existing file.

use crate::error::{Result, SyncError};
use crate::layout::{quarantine_name, QUARANTINE_DIR};
use core_runtime::config::{ValidationConfig, VerifyMode};
use image::ImageReader;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Check that `path` holds a readable image
///
/// `Headers` detects the format and reads the dimensions. `Decode` also
/// decodes the full pixel data, which catches truncated scans.
pub fn verify_image(path: &Path, mode: VerifyMode) -> Result<()> {
    let integrity = |reason: String| SyncError::Integrity {
        path: path.to_path_buf(),
        reason,
    };

    let reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(|e| integrity(e.to_string()))?;

    if reader.format().is_none() {
        return Err(integrity("unrecognized image format".to_string()));
    }

    match mode {
        VerifyMode::Headers => {
            let (width, height) = reader
                .into_dimensions()
                .map_err(|e| integrity(e.to_string()))?;
            if width == 0 || height == 0 {
                return Err(integrity(format!("empty image {}x{}", width, height)));
            }
        }
        VerifyMode::Decode => {
            reader.decode().map_err(|e| integrity(e.to_string()))?;
        }
    }

    Ok(())
}

/// Move `path` into the quarantine directory under `local_root`
///
/// Returns the destination. An existing destination gets a numeric suffix
/// (`name.1`, `name.2`, ...) instead of being replaced.
pub async fn quarantine_file(local_root: &Path, path: &Path) -> Result<PathBuf> {
    let quarantine_err = |source: std::io::Error| SyncError::Quarantine {
        path: path.to_path_buf(),
        source,
    };

    let relative = match path.strip_prefix(local_root) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => PathBuf::from(path.file_name().unwrap_or(path.as_os_str())),
    };

    let dir = local_root.join(QUARANTINE_DIR);
    fs::create_dir_all(&dir).await.map_err(quarantine_err)?;

    let name = quarantine_name(&relative);
    let mut destination = dir.join(&name);
    let mut suffix = 0u32;
    while fs::try_exists(&destination).await.map_err(quarantine_err)? {
        suffix += 1;
        destination = dir.join(format!("{}.{}", name, suffix));
    }

    if let Err(rename_err) = fs::rename(path, &destination).await {
        debug!(error = %rename_err, "Rename failed, copying instead");
        move_by_copy(path, &destination)
            .await
            .map_err(quarantine_err)?;
    }

    Ok(destination)
}

/// Copy `path` to `destination`, then remove the source
///
/// Used when `rename` cannot cross filesystems. The source is kept if the
/// copy fails.
async fn move_by_copy(path: &Path, destination: &Path) -> std::io::Result<()> {
    fs::copy(path, destination).await?;
    fs::remove_file(path).await
}

/// Outcome for one submitted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Valid,
    Quarantined { destination: PathBuf, reason: String },
    QuarantineFailed { reason: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationRecord {
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: ValidationOutcome,
}

/// Aggregated outcomes of a drained pipeline
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid: usize,
    pub quarantined: usize,
    pub quarantine_failures: usize,
    /// Every file that was not valid
    pub failures: Vec<ValidationRecord>,
}

impl ValidationReport {
    pub fn total(&self) -> usize {
        self.valid + self.quarantined + self.quarantine_failures
    }

    fn record(&mut self, record: ValidationRecord) {
        match record.outcome {
            ValidationOutcome::Valid => self.valid += 1,
            ValidationOutcome::Quarantined { .. } => {
                self.quarantined += 1;
                self.failures.push(record);
            }
            ValidationOutcome::QuarantineFailed { .. } => {
                self.quarantine_failures += 1;
                self.failures.push(record);
            }
        }
    }
}

/// Bounded pool of validation workers
pub struct ValidationPipeline {
    sender: Option<mpsc::Sender<PathBuf>>,
    workers: Vec<JoinHandle<()>>,
    report: Arc<Mutex<ValidationReport>>,
}

impl ValidationPipeline {
    /// Spawn `config.workers` workers on the current runtime
    pub fn start(local_root: impl Into<PathBuf>, config: ValidationConfig) -> Self {
        let local_root = Arc::new(local_root.into());
        let (sender, receiver) = mpsc::channel::<PathBuf>(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let report = Arc::new(Mutex::new(ValidationReport::default()));

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                let report = report.clone();
                let local_root = local_root.clone();
                let mode = config.verify_mode;

                tokio::spawn(async move {
                    loop {
                        let next = {
                            let mut rx = receiver.lock().await;
                            rx.recv().await
                        };
                        let Some(path) = next else {
                            break;
                        };

                        let outcome = validate_one(&local_root, &path, mode).await;
                        report.lock().await.record(ValidationRecord { path, outcome });
                    }
                    debug!(worker_id, "Validation worker finished");
                })
            })
            .collect();

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            mode = ?config.verify_mode,
            "Validation pipeline started"
        );

        Self {
            sender: Some(sender),
            workers,
            report,
        }
    }

    /// Queue a transferred file, waiting while the queue is full
    pub async fn submit(&self, path: PathBuf) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(SyncError::PipelineClosed)?;
        sender
            .send(path)
            .await
            .map_err(|_| SyncError::PipelineClosed)
    }

    /// Close the queue and wait for all submitted files
    pub async fn drain(mut self) -> ValidationReport {
        self.sender.take();

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                error!(error = %e, "Validation worker aborted");
            }
        }

        let report = std::mem::take(&mut *self.report.lock().await);
        info!(
            valid = report.valid,
            quarantined = report.quarantined,
            quarantine_failures = report.quarantine_failures,
            "Validation drained"
        );
        report
    }
}

async fn validate_one(local_root: &Path, path: &Path, mode: VerifyMode) -> ValidationOutcome {
    let target = path.to_path_buf();
    let verified = tokio::task::spawn_blocking(move || verify_image(&target, mode)).await;

    let reason = match verified {
        Ok(Ok(())) => {
            debug!(path = ?path, "Image verified");
            return ValidationOutcome::Valid;
        }
        Ok(Err(e)) => e.to_string(),
        Err(join_err) => format!("decoder aborted: {}", join_err),
    };

    warn!(path = ?path, reason = %reason, "Corrupt image");

    match quarantine_file(local_root, path).await {
        Ok(destination) => {
            info!(path = ?path, destination = ?destination, "Quarantined");
            ValidationOutcome::Quarantined {
                destination,
                reason,
            }
        }
        Err(e) => {
            error!(path = ?path, error = %e, "Failed to quarantine");
            ValidationOutcome::QuarantineFailed {
                reason,
                error: e.to_string(),
            }
        }
    }
}
