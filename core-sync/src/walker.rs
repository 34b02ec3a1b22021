//! # Archive Tree Walker
//!
//! Lazily enumerates the month directories of the remote archive.
//!
//! ## Overview
//!
//! ```text
//! <root>/<disk>/<year>/<station>/<camera>/<year>/<month>
//! ```
//!
//! Every level is listed once, sorted, and filtered before anything below it
//! is listed, so an excluded disk or year never costs a listing. Each call to
//! [`TreeWalker::next`] yields either a [`WalkEvent::Location`] or a
//! [`WalkEvent::Skipped`] with the reason; a failed listing skips only its own
//! subtree.
//!
//! ## Filters
//!
//! - disks start with the disk prefix
//! - on the boundary disk only the boundary years are walked; elsewhere any
//!   four-digit year at or above the minimum year
//! - stations look like `NN.NN`
//! - cameras start with the camera prefix
//! - months are exactly two ASCII digits

use bridge_traits::remote::{join_remote, RemoteConnection};
use core_runtime::config::TraversalConfig;
use futures::stream::{self, Stream};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

static YEAR_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}$").expect("year pattern should compile"));
static STATION_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}\.\d{2}$").expect("station pattern should compile"));
static MONTH_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{2}$").expect("month pattern should compile"));

/// One remote month directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArchiveLocation {
    pub disk: String,
    pub year: i32,
    pub station: String,
    pub camera: String,
    pub month: u32,
}

impl ArchiveLocation {
    /// `<root>/<disk>/<year>/<station>/<camera>/<year>/<month>`
    pub fn month_path(&self, remote_root: &str) -> String {
        let year = format!("{:04}", self.year);
        [
            self.disk.as_str(),
            year.as_str(),
            self.station.as_str(),
            self.camera.as_str(),
            year.as_str(),
            format!("{:02}", self.month).as_str(),
        ]
        .iter()
        .fold(remote_root.to_string(), |path, segment| join_remote(&path, segment))
    }
}

impl std::fmt::Display for ArchiveLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{:04}/{}/{}/{:02}",
            self.disk, self.year, self.station, self.camera, self.month
        )
    }
}

/// Directory level in the remote tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeLevel {
    Root,
    Disk,
    Year,
    Station,
    Camera,
    Month,
}

impl TreeLevel {
    fn child(self) -> Self {
        match self {
            Self::Root => Self::Disk,
            Self::Disk => Self::Year,
            Self::Year => Self::Station,
            Self::Station => Self::Camera,
            Self::Camera | Self::Month => Self::Month,
        }
    }
}

/// Filter that excluded an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionRule {
    DiskPrefix,
    BoundaryYears,
    YearFormat,
    BelowMinYear,
    StationPattern,
    CameraPrefix,
    MonthFormat,
}

impl ExclusionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiskPrefix => "disk_prefix",
            Self::BoundaryYears => "boundary_years",
            Self::YearFormat => "year_format",
            Self::BelowMinYear => "below_min_year",
            Self::StationPattern => "station_pattern",
            Self::CameraPrefix => "camera_prefix",
            Self::MonthFormat => "month_format",
        }
    }
}

/// Why part of the tree was not walked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Listing the directory failed; its subtree is skipped
    ListingFailed {
        level: TreeLevel,
        path: String,
        error: String,
    },
    /// The entry did not pass the filter for its level
    Excluded {
        level: TreeLevel,
        name: String,
        rule: ExclusionRule,
    },
}

/// Item produced by the walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    Location(ArchiveLocation),
    Skipped(SkipReason),
}

impl WalkEvent {
    pub fn location(&self) -> Option<&ArchiveLocation> {
        match self {
            Self::Location(location) => Some(location),
            Self::Skipped(_) => None,
        }
    }
}

/// Counters for one walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    pub listings: usize,
    pub locations: usize,
    pub listing_failures: usize,
    pub excluded: BTreeMap<String, usize>,
}

impl WalkStats {
    fn record(&mut self, event: &WalkEvent) {
        match event {
            WalkEvent::Location(_) => self.locations += 1,
            WalkEvent::Skipped(SkipReason::ListingFailed { .. }) => self.listing_failures += 1,
            WalkEvent::Skipped(SkipReason::Excluded { rule, .. }) => {
                *self.excluded.entry(rule.as_str().to_string()).or_default() += 1;
            }
        }
    }
}

/// Inclusion rules per level
#[derive(Debug, Clone)]
pub struct TraversalRules {
    config: TraversalConfig,
}

impl TraversalRules {
    pub fn new(config: TraversalConfig) -> Self {
        Self { config }
    }

    pub fn remote_root(&self) -> &str {
        &self.config.remote_root
    }

    pub fn check_disk(&self, name: &str) -> Result<(), ExclusionRule> {
        if name.starts_with(&self.config.disk_prefix) {
            Ok(())
        } else {
            Err(ExclusionRule::DiskPrefix)
        }
    }

    pub fn check_year(&self, disk: &str, name: &str) -> Result<i32, ExclusionRule> {
        if !YEAR_DIR.is_match(name) {
            return Err(if disk == self.config.boundary_disk {
                ExclusionRule::BoundaryYears
            } else {
                ExclusionRule::YearFormat
            });
        }
        let year: i32 = name.parse().map_err(|_| ExclusionRule::YearFormat)?;

        if disk == self.config.boundary_disk {
            if self.config.boundary_years.contains(&year) {
                Ok(year)
            } else {
                Err(ExclusionRule::BoundaryYears)
            }
        } else if year >= self.config.min_year {
            Ok(year)
        } else {
            Err(ExclusionRule::BelowMinYear)
        }
    }

    pub fn check_station(&self, name: &str) -> Result<(), ExclusionRule> {
        if STATION_DIR.is_match(name) {
            Ok(())
        } else {
            Err(ExclusionRule::StationPattern)
        }
    }

    pub fn check_camera(&self, name: &str) -> Result<(), ExclusionRule> {
        if name.starts_with(&self.config.camera_prefix) {
            Ok(())
        } else {
            Err(ExclusionRule::CameraPrefix)
        }
    }

    pub fn check_month(&self, name: &str) -> Result<u32, ExclusionRule> {
        if !MONTH_DIR.is_match(name) {
            return Err(ExclusionRule::MonthFormat);
        }
        name.parse().map_err(|_| ExclusionRule::MonthFormat)
    }
}

impl From<TraversalConfig> for TraversalRules {
    fn from(config: TraversalConfig) -> Self {
        Self::new(config)
    }
}

#[derive(Debug, Clone, Default)]
struct Scope {
    disk: String,
    year: i32,
    station: String,
    camera: String,
}

/// Sorted, not yet visited entries of one listed directory
#[derive(Debug)]
struct Frame {
    /// Level of the entries
    level: TreeLevel,
    path: String,
    scope: Scope,
    entries: std::vec::IntoIter<String>,
}

enum State {
    NotStarted,
    Walking,
    Finished,
}

/// Lazy, restartable walk over the archive tree
///
/// A fresh walker re-derives the same sequence from the remote listing.
pub struct TreeWalker {
    connection: Arc<dyn RemoteConnection>,
    rules: TraversalRules,
    stack: Vec<Frame>,
    state: State,
    stats: WalkStats,
}

impl TreeWalker {
    pub fn new(connection: Arc<dyn RemoteConnection>, rules: TraversalRules) -> Self {
        Self {
            connection,
            rules,
            stack: Vec::new(),
            state: State::NotStarted,
            stats: WalkStats::default(),
        }
    }

    pub fn stats(&self) -> &WalkStats {
        &self.stats
    }

    /// Next location or skip, `None` once the tree is exhausted
    pub async fn next(&mut self) -> Option<WalkEvent> {
        let event = self.advance().await?;
        self.stats.record(&event);
        Some(event)
    }

    /// Consume the walker as a stream of events
    pub fn into_stream(self) -> impl Stream<Item = WalkEvent> {
        stream::unfold(self, |mut walker| async move {
            walker.next().await.map(|event| (event, walker))
        })
    }

    async fn advance(&mut self) -> Option<WalkEvent> {
        match self.state {
            State::Finished => return None,
            State::NotStarted => {
                self.state = State::Walking;
                let root = self.rules.remote_root().to_string();
                if let Err(skip) = self
                    .descend(TreeLevel::Root, root, Scope::default())
                    .await
                {
                    self.state = State::Finished;
                    return Some(WalkEvent::Skipped(skip));
                }
            }
            State::Walking => {}
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                self.state = State::Finished;
                return None;
            };

            let Some(name) = frame.entries.next() else {
                self.stack.pop();
                continue;
            };

            let level = frame.level;
            let mut scope = frame.scope.clone();
            let parent_path = frame.path.clone();

            let included = match level {
                TreeLevel::Disk => self.rules.check_disk(&name).map(|_| {
                    scope.disk = name.clone();
                }),
                TreeLevel::Year => self.rules.check_year(&scope.disk, &name).map(|year| {
                    scope.year = year;
                }),
                TreeLevel::Station => self.rules.check_station(&name).map(|_| {
                    scope.station = name.clone();
                }),
                TreeLevel::Camera => self.rules.check_camera(&name).map(|_| {
                    scope.camera = name.clone();
                }),
                TreeLevel::Month => match self.rules.check_month(&name) {
                    Ok(month) => {
                        return Some(WalkEvent::Location(ArchiveLocation {
                            disk: scope.disk,
                            year: scope.year,
                            station: scope.station,
                            camera: scope.camera,
                            month,
                        }));
                    }
                    Err(rule) => Err(rule),
                },
                TreeLevel::Root => Ok(()),
            };

            if let Err(rule) = included {
                debug!(level = ?level, name = %name, rule = rule.as_str(), "Excluded entry");
                return Some(WalkEvent::Skipped(SkipReason::Excluded { level, name, rule }));
            }

            // Cameras list their months under a nested year directory
            let path = match level {
                TreeLevel::Camera => {
                    join_remote(&join_remote(&parent_path, &name), &format!("{:04}", scope.year))
                }
                _ => join_remote(&parent_path, &name),
            };

            if let Err(skip) = self.descend(level, path, scope).await {
                return Some(WalkEvent::Skipped(skip));
            }
        }
    }

    /// List `path` and push its sorted entries as the next frame
    async fn descend(
        &mut self,
        level: TreeLevel,
        path: String,
        scope: Scope,
    ) -> Result<(), SkipReason> {
        self.stats.listings += 1;

        match self.connection.list(&path).await {
            Ok(mut entries) => {
                entries.sort();
                if level == TreeLevel::Disk {
                    info!(disk = %scope.disk, entries = entries.len(), "Walking disk");
                } else {
                    debug!(level = ?level, path = %path, entries = entries.len(), "Listed directory");
                }
                self.stack.push(Frame {
                    level: level.child(),
                    path,
                    scope,
                    entries: entries.into_iter(),
                });
                Ok(())
            }
            Err(e) => {
                warn!(level = ?level, path = %path, error = %e, "Listing failed, skipping subtree");
                Err(SkipReason::ListingFailed {
                    level,
                    path,
                    error: e.to_string(),
                })
            }
        }
    }
}
