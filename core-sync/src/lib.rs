//! # Archive Mirror Engine
//!
//! Keeps a local mirror of a station image archive up to date.
//!
//! ## Overview
//!
//! One pass walks the remote tree, picks the single file closest to the
//! target time of day for every (station, camera, day, zoom) slot, copies it
//! under a canonical name unless the slot is already mirrored, and checks
//! every copied image in the background. Images that fail the check are moved
//! to a quarantine directory, never deleted.
//!
//! ## Components
//!
//! - **Tree Walker** (`walker`): lazy, filtered enumeration of month directories
//! - **Candidate Selector** (`selector`): exact-or-nearest choice inside a time window
//! - **Sync Planner** (`planner`): idempotent per-slot transfer
//! - **Validation Pipeline** (`validation`): bounded worker pool with quarantine
//! - **Mirror Coordinator** (`coordinator`): drives a full pass and reports on it
//! - **Layout** (`layout`): local names shared with downstream tools

pub mod coordinator;
pub mod error;
pub mod layout;
pub mod planner;
pub mod selector;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod validation;
pub mod walker;

pub use coordinator::{MirrorCoordinator, SlotStats, SyncReport};
pub use error::{Result, SyncError};
pub use layout::{quarantine_name, DaySlot, LocalFileName, LocalImageRecord, QUARANTINE_DIR};
pub use planner::{MonthListing, SlotOutcome, SyncPlanner};
pub use selector::{
    CandidateSelector, NoMatchReason, RemoteFileEntry, SelectionResult, TimeWindow,
};
pub use validation::{
    quarantine_file, verify_image, ValidationOutcome, ValidationPipeline, ValidationRecord,
    ValidationReport,
};
pub use walker::{
    ArchiveLocation, ExclusionRule, SkipReason, TraversalRules, TreeLevel, TreeWalker, WalkEvent,
    WalkStats,
};
