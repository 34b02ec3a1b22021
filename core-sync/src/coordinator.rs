//! # Mirror Coordinator
//!
//! Runs one complete mirror pass over the archive.
//!
//! ## Overview
//!
//! The `MirrorCoordinator` owns the collaborators of a pass and drives them
//! in a single sequential task:
//! - `TreeWalker` enumerates month locations
//! - `SyncPlanner` brings each (day, zoom) slot up to date
//! - `ValidationPipeline` checks transferred files in parallel
//!
//! ## Workflow
//!
//! 1. Start the validation pool
//! 2. For every location: days 1 to 31, then zoom options in configured
//!    order; impossible dates (e.g. 30 February) are skipped
//! 3. When the walker is exhausted, drain the pool
//! 4. Close the connection and return the [`SyncReport`]
//!
//! Everything below the pass is recovered locally and counted; the pass
//! itself fails only when the local root cannot be created.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::MirrorCoordinator;
//! use std::sync::Arc;
//!
//! # async fn example(connection: Arc<dyn bridge_traits::RemoteConnection>,
//! #                  config: core_runtime::MirrorConfig) -> core_sync::Result<()> {
//! let report = MirrorCoordinator::new(connection, config).run().await?;
//! println!("downloaded {}", report.slots.downloaded);
//! # Ok(())
//! # }
//! ```

use crate::{
    layout::DaySlot,
    planner::{MonthListing, SlotOutcome, SyncPlanner},
    selector::{CandidateSelector, TimeWindow},
    validation::{ValidationPipeline, ValidationReport},
    walker::{ArchiveLocation, TraversalRules, TreeWalker, WalkEvent, WalkStats},
    Result,
};
use bridge_traits::remote::RemoteConnection;
use chrono::{DateTime, NaiveDate, Utc};
use core_runtime::config::MirrorConfig;
use serde::Serialize;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, instrument};

/// Highest day number tried in every month
const LAST_DAY: u32 = 31;

/// Per-slot counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub satisfied: usize,
    pub no_match: usize,
    pub already_present: usize,
    pub downloaded: usize,
    pub exact: usize,
    pub nearest: usize,
    pub transfer_failures: usize,
    /// Slots whose month listing could not be loaded
    pub listing_unavailable: usize,
    pub local_io_failures: usize,
    /// Day numbers that do not form a calendar date
    pub invalid_dates: usize,
}

impl SlotStats {
    pub fn record(&mut self, outcome: &SlotOutcome) {
        match outcome {
            SlotOutcome::AlreadySatisfied => self.satisfied += 1,
            SlotOutcome::NoMatch(_) => self.no_match += 1,
            SlotOutcome::AlreadyPresent(_) => self.already_present += 1,
            SlotOutcome::Downloaded { exact, .. } => {
                self.downloaded += 1;
                if *exact {
                    self.exact += 1;
                } else {
                    self.nearest += 1;
                }
            }
            SlotOutcome::TransferFailed { .. } => self.transfer_failures += 1,
            SlotOutcome::ListingUnavailable => self.listing_unavailable += 1,
            SlotOutcome::LocalIoFailed { .. } => self.local_io_failures += 1,
        }
    }
}

/// Result of one mirror pass
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub walk: WalkStats,
    pub slots: SlotStats,
    pub validation: ValidationReport,
}

/// Drives walker, planner and validation for one pass
pub struct MirrorCoordinator {
    connection: Arc<dyn RemoteConnection>,
    config: MirrorConfig,
}

impl MirrorCoordinator {
    pub fn new(connection: Arc<dyn RemoteConnection>, config: MirrorConfig) -> Self {
        Self { connection, config }
    }

    /// Run the pass to completion
    ///
    /// The connection is closed before returning, also when the pass ends
    /// early.
    pub async fn run(self) -> Result<SyncReport> {
        let result = self.run_pass().await;

        if let Err(e) = self.connection.close().await {
            error!(error = %e, "Failed to close connection");
        }

        result
    }

    async fn run_pass(&self) -> Result<SyncReport> {
        let started_at = Utc::now();
        let local_root = self.config.local_root.clone();
        fs::create_dir_all(&local_root).await?;

        info!(
            remote_root = %self.config.traversal.remote_root,
            local_root = ?local_root,
            min_year = self.config.traversal.min_year,
            "Starting mirror pass"
        );

        let selector = CandidateSelector::new(TimeWindow::from(&self.config.selection));
        let planner = SyncPlanner::new(
            self.connection.clone(),
            selector,
            local_root.clone(),
            self.config.traversal.remote_root.clone(),
        );
        let pipeline = ValidationPipeline::start(local_root, self.config.validation);
        let mut walker = TreeWalker::new(
            self.connection.clone(),
            TraversalRules::new(self.config.traversal.clone()),
        );

        let mut slots = SlotStats::default();
        while let Some(event) = walker.next().await {
            if let WalkEvent::Location(location) = event {
                self.sync_location(&planner, &pipeline, &location, &mut slots)
                    .await;
            }
        }

        let walk = walker.stats().clone();
        let validation = pipeline.drain().await;
        let finished_at = Utc::now();

        info!(
            locations = walk.locations,
            downloaded = slots.downloaded,
            satisfied = slots.satisfied,
            no_match = slots.no_match,
            transfer_failures = slots.transfer_failures,
            quarantined = validation.quarantined,
            elapsed_secs = (finished_at - started_at).num_seconds(),
            "[DONE] Mirror pass complete"
        );

        Ok(SyncReport {
            started_at,
            finished_at,
            walk,
            slots,
            validation,
        })
    }

    #[instrument(
        skip_all,
        fields(
            disk = %location.disk,
            year = location.year,
            station = %location.station,
            camera = %location.camera,
            month = location.month
        )
    )]
    async fn sync_location(
        &self,
        planner: &SyncPlanner,
        pipeline: &ValidationPipeline,
        location: &ArchiveLocation,
        slots: &mut SlotStats,
    ) {
        let mut listing = MonthListing::Pending;

        for day in 1..=LAST_DAY {
            let Some(date) = NaiveDate::from_ymd_opt(location.year, location.month, day) else {
                slots.invalid_dates += 1;
                continue;
            };

            for zoom in &self.config.selection.zoom_options {
                let slot = DaySlot::new(date, zoom.as_str());
                let outcome = planner
                    .process_slot(location, &mut listing, &slot, pipeline)
                    .await;
                slots.record(&outcome);
            }
        }

        debug!(listed = !listing.is_pending(), "Location done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{jpeg_bytes, InMemoryArchive};

    const MONTH: &str = "/share/TARBIL/TARLA-DISK 1/2014/01.02/K1/2014/02";

    fn config(local_root: &std::path::Path) -> MirrorConfig {
        MirrorConfig::builder()
            .local_root(local_root)
            .workers(2)
            .build()
            .unwrap()
    }

    #[test]
    fn test_slot_stats_split_exact_and_nearest() {
        let mut stats = SlotStats::default();
        stats.record(&SlotOutcome::Downloaded {
            local_path: "a".into(),
            remote_path: "a".into(),
            exact: true,
        });
        stats.record(&SlotOutcome::Downloaded {
            local_path: "b".into(),
            remote_path: "b".into(),
            exact: false,
        });
        stats.record(&SlotOutcome::AlreadySatisfied);

        assert_eq!(stats.downloaded, 2);
        assert_eq!(stats.exact, 1);
        assert_eq!(stats.nearest, 1);
        assert_eq!(stats.satisfied, 1);
    }

    #[tokio::test]
    async fn test_february_skips_impossible_days() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(InMemoryArchive::new());
        archive.add_file(&format!("{}/2014-02-10-10_00-10X.jpg", MONTH), &jpeg_bytes(4, 4));

        let report = MirrorCoordinator::new(archive.clone(), config(dir.path()))
            .run()
            .await
            .unwrap();

        // 2014 is not a leap year: 29, 30, 31
        assert_eq!(report.slots.invalid_dates, 3);
        assert_eq!(report.slots.downloaded, 1);
        assert_eq!(report.slots.no_match, 28 * 2 - 1);
        assert_eq!(report.walk.locations, 1);
        assert!(archive.is_closed());
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(InMemoryArchive::new());
        archive.add_file(&format!("{}/2014-02-10-10_00-10X.jpg", MONTH), &jpeg_bytes(4, 4));

        let report = MirrorCoordinator::new(archive, config(dir.path()))
            .run()
            .await
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["slots"]["downloaded"], 1);
        assert_eq!(json["validation"]["valid"], 1);
        assert_eq!(json["walk"]["locations"], 1);
    }
}
