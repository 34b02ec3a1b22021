//! # Candidate Selection
//!
//! Picks the one remote file that best represents a day for a zoom option.
//!
//! ## Policy
//!
//! 1. Keep names that carry the zoom marker (case-insensitive; the marker may
//!    not follow a digit, so `1X` does not match inside `11X`).
//! 2. Parse the `YYYY?MM?DD-HH_MM` timestamp; names without one are dropped.
//! 3. A timestamp equal to the target returns immediately. First one wins.
//! 4. Otherwise the smallest absolute difference wins, earlier listing
//!    position breaking ties.
//! 5. A non-exact winner outside the inclusive window is rejected.

use crate::error::{Result, SyncError};
use crate::layout::DaySlot;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use core_runtime::config::SelectionConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})[-_](\d{2})[-_](\d{2})-(\d{2})_(\d{2})")
        .expect("timestamp pattern should compile")
});

/// A remote file name with its embedded capture time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFileEntry {
    pub filename: String,
    pub timestamp: NaiveDateTime,
}

impl RemoteFileEntry {
    /// Parse the first `YYYY?MM?DD-HH_MM` date-time found in `filename`
    pub fn parse(filename: &str) -> Result<Self> {
        let caps = TIMESTAMP
            .captures(filename)
            .ok_or_else(|| SyncError::FilenameParse(filename.to_string()))?;

        let field = |i: usize| -> Result<u32> {
            caps[i]
                .parse()
                .map_err(|_| SyncError::FilenameParse(filename.to_string()))
        };

        let year = caps[1]
            .parse::<i32>()
            .map_err(|_| SyncError::FilenameParse(filename.to_string()))?;
        let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?);
        let time = NaiveTime::from_hms_opt(field(4)?, field(5)?, 0);

        match (date, time) {
            (Some(date), Some(time)) => Ok(Self {
                filename: filename.to_string(),
                timestamp: date.and_time(time),
            }),
            _ => Err(SyncError::FilenameParse(filename.to_string())),
        }
    }

    /// `HH_MM` of the capture time, used in the canonical local name
    pub fn time_part(&self) -> String {
        self.timestamp.format("%H_%M").to_string()
    }
}

/// Whether `filename` carries `marker` as a zoom marker
pub fn contains_zoom_marker(filename: &str, marker: &str) -> bool {
    if marker.is_empty() {
        return false;
    }

    let haystack = filename.to_ascii_lowercase();
    let needle = marker.to_ascii_lowercase();
    let bytes = haystack.as_bytes();

    haystack
        .match_indices(&needle)
        .any(|(start, _)| start == 0 || !bytes[start - 1].is_ascii_digit())
}

/// Target time of day and the acceptance window around it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub target: NaiveTime,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(target: NaiveTime, start: NaiveTime, end: NaiveTime) -> Self {
        Self { target, start, end }
    }

    /// Inclusive check on the target day
    pub fn contains(&self, date: NaiveDate, moment: NaiveDateTime) -> bool {
        date.and_time(self.start) <= moment && moment <= date.and_time(self.end)
    }
}

impl From<&SelectionConfig> for TimeWindow {
    fn from(config: &SelectionConfig) -> Self {
        Self::new(config.target_time, config.window_start, config.window_end)
    }
}

/// Why a day produced no file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoMatchReason {
    /// No name in the listing carries the zoom marker
    NoCandidates,
    /// Candidates exist but none has a parseable timestamp
    Unparseable { candidates: usize },
    /// The nearest candidate lies outside the window
    OutsideWindow { filename: String, diff_seconds: i64 },
}

impl std::fmt::Display for NoMatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCandidates => write!(f, "no candidates"),
            Self::Unparseable { candidates } => {
                write!(f, "{} candidates without a timestamp", candidates)
            }
            Self::OutsideWindow {
                filename,
                diff_seconds,
            } => write!(f, "nearest {} is {}s away, outside window", filename, diff_seconds),
        }
    }
}

/// Outcome of selecting a file for one day and zoom option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionResult {
    Exact(RemoteFileEntry),
    Nearest {
        entry: RemoteFileEntry,
        diff_seconds: i64,
    },
    NoMatch(NoMatchReason),
}

impl SelectionResult {
    /// The selected entry, if any
    pub fn entry(&self) -> Option<&RemoteFileEntry> {
        match self {
            Self::Exact(entry) | Self::Nearest { entry, .. } => Some(entry),
            Self::NoMatch(_) => None,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }
}

/// Stateless selector applying the window policy
#[derive(Debug, Clone)]
pub struct CandidateSelector {
    window: TimeWindow,
}

impl CandidateSelector {
    pub fn new(window: TimeWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Select a file for `slot` from a month listing
    pub fn select_for_slot(&self, listing: &[String], slot: &DaySlot) -> SelectionResult {
        self.select(listing, slot.date, &slot.zoom)
    }

    /// Select a file for `date` and `zoom` from a month listing
    pub fn select(&self, listing: &[String], date: NaiveDate, zoom: &str) -> SelectionResult {
        let target = date.and_time(self.window.target);

        let candidates: Vec<&String> = listing
            .iter()
            .filter(|name| contains_zoom_marker(name, zoom))
            .collect();

        if candidates.is_empty() {
            return SelectionResult::NoMatch(NoMatchReason::NoCandidates);
        }

        let mut best: Option<(RemoteFileEntry, i64)> = None;

        for name in &candidates {
            let entry = match RemoteFileEntry::parse(name) {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(error = %e, "Discarding candidate");
                    continue;
                }
            };

            if entry.timestamp == target {
                return SelectionResult::Exact(entry);
            }

            let diff = (entry.timestamp - target).num_seconds().abs();
            if best.as_ref().map_or(true, |(_, best_diff)| diff < *best_diff) {
                best = Some((entry, diff));
            }
        }

        match best {
            None => SelectionResult::NoMatch(NoMatchReason::Unparseable {
                candidates: candidates.len(),
            }),
            Some((entry, diff_seconds)) if self.window.contains(date, entry.timestamp) => {
                SelectionResult::Nearest {
                    entry,
                    diff_seconds,
                }
            }
            Some((entry, diff_seconds)) => SelectionResult::NoMatch(NoMatchReason::OutsideWindow {
                filename: entry.filename,
                diff_seconds,
            }),
        }
    }
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self::new(TimeWindow::from(&SelectionConfig::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2014, 5, 23).unwrap()
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_both_separators() {
        let dashed = RemoteFileEntry::parse("K1_2014-05-23-10_00-10X.jpg").unwrap();
        let underscored = RemoteFileEntry::parse("2014_05_23-10_00-10x.jpeg").unwrap();
        assert_eq!(dashed.timestamp, day().and_time(hm(10, 0)));
        assert_eq!(dashed.timestamp, underscored.timestamp);
        assert_eq!(dashed.time_part(), "10_00");
    }

    #[test]
    fn test_parse_rejects_missing_or_impossible_timestamps() {
        assert!(RemoteFileEntry::parse("thumbs.db").is_err());
        assert!(RemoteFileEntry::parse("2014-02-30-10_00-10X.jpg").is_err());
        assert!(RemoteFileEntry::parse("2014-05-23-25_00-10X.jpg").is_err());
    }

    #[test]
    fn test_zoom_marker_boundaries() {
        assert!(contains_zoom_marker("2014-05-23-10_00-1X.jpg", "1X"));
        assert!(contains_zoom_marker("2014-05-23-10_00-1x.jpg", "1X"));
        assert!(contains_zoom_marker("2014-05-23-10_00-10X.jpg", "10X"));
        assert!(!contains_zoom_marker("2014-05-23-10_00-10X.jpg", "1X"));
        assert!(!contains_zoom_marker("2014-05-23-10_00-11X.jpg", "1X"));
        assert!(contains_zoom_marker("1X_2014-05-23-10_00.jpg", "1X"));
        assert!(!contains_zoom_marker("anything", ""));
    }

    #[test]
    fn test_exact_match_wins_over_everything() {
        let selector = CandidateSelector::default();
        let listing = names(&[
            "2014-05-23-09_58-10X.jpg",
            "2014-05-23-10_00-10X.jpg",
            "2014-05-23-11_40-10X.jpg",
        ]);

        let result = selector.select(&listing, day(), "10X");
        assert!(result.is_exact());
        assert_eq!(result.entry().unwrap().filename, "2014-05-23-10_00-10X.jpg");
    }

    #[test]
    fn test_first_exact_match_wins() {
        let selector = CandidateSelector::default();
        let listing = names(&["a_2014-05-23-10_00-10X.jpg", "b_2014-05-23-10_00-10X.jpg"]);

        let result = selector.select(&listing, day(), "10X");
        assert_eq!(
            result,
            SelectionResult::Exact(RemoteFileEntry::parse("a_2014-05-23-10_00-10X.jpg").unwrap())
        );
    }

    #[test]
    fn test_nearest_prefers_smaller_difference() {
        let selector = CandidateSelector::default();
        let listing = names(&["2014-05-23-11_40-10X.jpg", "2014-05-23-09_58-10X.jpg"]);

        match selector.select(&listing, day(), "10X") {
            SelectionResult::Nearest {
                entry,
                diff_seconds,
            } => {
                assert_eq!(entry.filename, "2014-05-23-09_58-10X.jpg");
                assert_eq!(diff_seconds, 120);
            }
            other => panic!("expected nearest, got {:?}", other),
        }
    }

    #[test]
    fn test_tie_keeps_earlier_listing_entry() {
        let selector = CandidateSelector::default();
        let listing = names(&["2014-05-23-10_30-10X.jpg", "2014-05-23-09_30-10X.jpg"]);

        let result = selector.select(&listing, day(), "10X");
        assert_eq!(result.entry().unwrap().filename, "2014-05-23-10_30-10X.jpg");
    }

    #[test]
    fn test_out_of_window_is_no_match() {
        let selector = CandidateSelector::default();
        let listing = names(&["2014-05-23-07_59-10X.jpg", "2014-05-23-12_01-10X.jpg"]);

        match selector.select(&listing, day(), "10X") {
            SelectionResult::NoMatch(NoMatchReason::OutsideWindow {
                filename,
                diff_seconds,
            }) => {
                assert_eq!(filename, "2014-05-23-07_59-10X.jpg");
                assert_eq!(diff_seconds, 2 * 3600 + 60);
            }
            other => panic!("expected outside window, got {:?}", other),
        }
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let selector = CandidateSelector::default();
        let listing = names(&["2014-05-23-08_00-10X.jpg"]);
        assert!(selector.select(&listing, day(), "10X").entry().is_some());

        let listing = names(&["2014-05-23-12_00-10X.jpg"]);
        assert!(selector.select(&listing, day(), "10X").entry().is_some());
    }

    #[test]
    fn test_other_day_is_outside_window() {
        let selector = CandidateSelector::default();
        let listing = names(&["2014-05-22-10_00-10X.jpg"]);
        assert!(matches!(
            selector.select(&listing, day(), "10X"),
            SelectionResult::NoMatch(NoMatchReason::OutsideWindow { .. })
        ));
    }

    #[test]
    fn test_no_candidates_and_unparseable() {
        let selector = CandidateSelector::default();

        let listing = names(&["2014-05-23-10_00-1X.jpg"]);
        assert_eq!(
            selector.select(&listing, day(), "10X"),
            SelectionResult::NoMatch(NoMatchReason::NoCandidates)
        );

        let listing = names(&["preview-10X.jpg", "10X-notes.txt"]);
        assert_eq!(
            selector.select(&listing, day(), "10X"),
            SelectionResult::NoMatch(NoMatchReason::Unparseable { candidates: 2 })
        );
    }
}
