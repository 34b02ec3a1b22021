//! # Sync Planner
//!
//! Decides per slot whether a transfer is needed and performs it.
//!
//! ## Overview
//!
//! For each [`DaySlot`] below an [`ArchiveLocation`]:
//!
//! 1. If the local slot directory already holds any
//!    `{day_key}-HH_MM-{zoom}.jpeg`, the slot is satisfied and nothing
//!    remote is touched.
//! 2. Otherwise the month listing is loaded (once per location, on first
//!    need) and handed to the [`CandidateSelector`].
//! 3. A selected file is fetched into a `.part` sibling of its canonical
//!    path and renamed into place, then submitted to the
//!    [`ValidationPipeline`] without waiting for the outcome.
//!
//! A failed transfer removes the partial file, so the slot stays
//! unsatisfied and is retried by the next run.

use crate::error::{Result, SyncError};
use crate::layout::{slot_relative_dir, DaySlot, LocalFileName, LocalImageRecord};
use crate::selector::{CandidateSelector, NoMatchReason, SelectionResult};
use crate::validation::ValidationPipeline;
use crate::walker::ArchiveLocation;
use bridge_traits::remote::{join_remote, RemoteConnection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Month listing of one location, fetched on first use
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MonthListing {
    #[default]
    Pending,
    Loaded(Vec<String>),
    Failed(String),
}

impl MonthListing {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// What happened to one slot
#[derive(Debug)]
pub enum SlotOutcome {
    /// A local file already covers the slot
    AlreadySatisfied,
    NoMatch(NoMatchReason),
    /// The canonical path existed when the transfer was about to start
    AlreadyPresent(PathBuf),
    Downloaded {
        local_path: PathBuf,
        remote_path: String,
        exact: bool,
    },
    TransferFailed {
        remote_path: String,
        error: SyncError,
    },
    /// The month listing could not be loaded
    ListingUnavailable,
    LocalIoFailed {
        path: PathBuf,
        error: SyncError,
    },
}

pub struct SyncPlanner {
    connection: Arc<dyn RemoteConnection>,
    selector: CandidateSelector,
    local_root: PathBuf,
    remote_root: String,
}

impl SyncPlanner {
    pub fn new(
        connection: Arc<dyn RemoteConnection>,
        selector: CandidateSelector,
        local_root: impl Into<PathBuf>,
        remote_root: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            selector,
            local_root: local_root.into(),
            remote_root: remote_root.into(),
        }
    }

    pub fn local_root(&self) -> &Path {
        &self.local_root
    }

    /// `<local-root>/<station>/<year>/<camera>/<ZOOM>`
    pub fn slot_dir(&self, location: &ArchiveLocation, slot: &DaySlot) -> PathBuf {
        self.local_root.join(slot_relative_dir(
            &location.station,
            location.year,
            &location.camera,
            &slot.zoom,
        ))
    }

    /// Whether `dir` already holds a file for `slot`
    pub async fn is_satisfied(dir: &Path, slot: &DaySlot) -> Result<bool> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let satisfied = name
                .to_str()
                .and_then(LocalFileName::parse)
                .is_some_and(|parsed| parsed.satisfies(slot));
            if satisfied {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Bring `slot` up to date
    ///
    /// `listing` belongs to `location` and is shared by all of its slots.
    pub async fn process_slot(
        &self,
        location: &ArchiveLocation,
        listing: &mut MonthListing,
        slot: &DaySlot,
        pipeline: &ValidationPipeline,
    ) -> SlotOutcome {
        let dir = self.slot_dir(location, slot);

        match Self::is_satisfied(&dir, slot).await {
            Ok(true) => {
                debug!(slot = %slot, "Slot already satisfied");
                return SlotOutcome::AlreadySatisfied;
            }
            Ok(false) => {}
            Err(error) => {
                error!(path = ?dir, error = %error, "Cannot inspect local directory");
                return SlotOutcome::LocalIoFailed { path: dir, error };
            }
        }

        let month_path = location.month_path(&self.remote_root);
        let files = match self.load_listing(&month_path, listing).await {
            Some(files) => files,
            None => return SlotOutcome::ListingUnavailable,
        };

        let selection = self.selector.select_for_slot(files, slot);
        let (entry, exact) = match &selection {
            SelectionResult::Exact(entry) => (entry, true),
            SelectionResult::Nearest {
                entry,
                diff_seconds,
            } => {
                debug!(slot = %slot, file = %entry.filename, diff_seconds, "Nearest candidate");
                (entry, false)
            }
            SelectionResult::NoMatch(reason) => {
                info!(slot = %slot, reason = %reason, "No suitable file");
                return SlotOutcome::NoMatch(reason.clone());
            }
        };

        let record = LocalImageRecord {
            station: location.station.clone(),
            year: location.year,
            camera: location.camera.clone(),
            zoom: slot.zoom.clone(),
            day_key: slot.day_key(),
            time_part: entry.time_part(),
        };
        let local_path = record.path_in(&self.local_root);
        let remote_path = join_remote(&month_path, &entry.filename);

        if let Err(e) = fs::create_dir_all(&dir).await {
            error!(path = ?dir, error = %e, "Cannot create slot directory");
            return SlotOutcome::LocalIoFailed {
                path: dir,
                error: e.into(),
            };
        }

        match fs::try_exists(&local_path).await {
            Ok(true) => {
                debug!(path = ?local_path, "Canonical file already present");
                return SlotOutcome::AlreadyPresent(local_path);
            }
            Ok(false) => {}
            Err(e) => {
                return SlotOutcome::LocalIoFailed {
                    path: local_path,
                    error: e.into(),
                }
            }
        }

        if let Err(error) = self.transfer(&remote_path, &local_path).await {
            error!(remote = %remote_path, error = %error, "Download failed");
            return SlotOutcome::TransferFailed { remote_path, error };
        }

        info!(remote = %remote_path, local = ?local_path, exact, "Downloaded");

        if let Err(e) = pipeline.submit(local_path.clone()).await {
            error!(path = ?local_path, error = %e, "Could not queue validation");
        }

        SlotOutcome::Downloaded {
            local_path,
            remote_path,
            exact,
        }
    }

    async fn load_listing<'a>(
        &self,
        month_path: &str,
        listing: &'a mut MonthListing,
    ) -> Option<&'a [String]> {
        if listing.is_pending() {
            *listing = match self.connection.list(month_path).await {
                Ok(mut files) => {
                    files.sort();
                    debug!(path = %month_path, files = files.len(), "Listed month");
                    MonthListing::Loaded(files)
                }
                Err(source) => {
                    let error = SyncError::Listing {
                        path: month_path.to_string(),
                        source,
                    };
                    warn!(error = %error, "Month listing failed, skipping location");
                    MonthListing::Failed(error.to_string())
                }
            };
        }

        match listing {
            MonthListing::Loaded(files) => Some(files.as_slice()),
            _ => None,
        }
    }

    /// Fetch into `<local>.part`, then rename into place
    async fn transfer(&self, remote_path: &str, local_path: &Path) -> Result<u64> {
        let part_path = part_path(local_path);

        let fetched = self.connection.fetch(remote_path, &part_path).await;
        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(source) => {
                remove_partial(&part_path).await;
                return Err(SyncError::Transfer {
                    remote_path: remote_path.to_string(),
                    local_path: local_path.to_path_buf(),
                    source,
                });
            }
        };

        if let Err(e) = fs::rename(&part_path, local_path).await {
            remove_partial(&part_path).await;
            return Err(e.into());
        }

        Ok(bytes)
    }
}

fn part_path(local_path: &Path) -> PathBuf {
    let mut name = local_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    local_path.with_file_name(name)
}

async fn remove_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = ?path, "Removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?path, error = %e, "Could not remove partial file"),
    }
}
