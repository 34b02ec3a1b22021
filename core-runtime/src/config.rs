//! # Mirror Configuration Module
//!
//! Provides configuration management for the archive mirror.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`MirrorConfig`]. The builder fills in archive defaults and validates
//! fail-fast, so a misconfigured window or an empty zoom list is reported
//! before the first remote listing is issued.
//!
//! ## Usage
//!
//! ### Builder
//!
//! ```
//! use core_runtime::config::MirrorConfig;
//!
//! let config = MirrorConfig::builder()
//!     .local_root("/data/mirror")
//!     .min_year(2015)
//!     .workers(8)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.validation.workers, 8);
//! ```
//!
//! ### Environment
//!
//! [`MirrorConfig::from_env`] loads an optional `.env` file and then reads the
//! `MIRROR_*` variables. Unset variables keep their defaults; only
//! `MIRROR_LOCAL_ROOT` is required.
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::MirrorConfig;
//!
//! // No local root
//! let config = MirrorConfig::builder()
//!     .build()
//!     .expect("Should fail - missing local root");
//! ```

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LogLevel, LoggingConfig};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

pub const ENV_REMOTE_ROOT: &str = "MIRROR_REMOTE_ROOT";
pub const ENV_MOUNT_POINT: &str = "MIRROR_MOUNT_POINT";
pub const ENV_LOCAL_ROOT: &str = "MIRROR_LOCAL_ROOT";
pub const ENV_MIN_YEAR: &str = "MIRROR_MIN_YEAR";
pub const ENV_DISK_PREFIX: &str = "MIRROR_DISK_PREFIX";
pub const ENV_BOUNDARY_DISK: &str = "MIRROR_BOUNDARY_DISK";
pub const ENV_BOUNDARY_YEARS: &str = "MIRROR_BOUNDARY_YEARS";
pub const ENV_CAMERA_PREFIX: &str = "MIRROR_CAMERA_PREFIX";
pub const ENV_TARGET_TIME: &str = "MIRROR_TARGET_TIME";
pub const ENV_WINDOW_START: &str = "MIRROR_WINDOW_START";
pub const ENV_WINDOW_END: &str = "MIRROR_WINDOW_END";
pub const ENV_ZOOM_OPTIONS: &str = "MIRROR_ZOOM_OPTIONS";
pub const ENV_WORKERS: &str = "MIRROR_WORKERS";
pub const ENV_QUEUE_CAPACITY: &str = "MIRROR_QUEUE_CAPACITY";
pub const ENV_VERIFY_MODE: &str = "MIRROR_VERIFY_MODE";
pub const ENV_LOG_FORMAT: &str = "MIRROR_LOG_FORMAT";
pub const ENV_LOG_LEVEL: &str = "MIRROR_LOG_LEVEL";
pub const ENV_LOG_FILTER: &str = "MIRROR_LOG_FILTER";
pub const ENV_REPORT_PATH: &str = "MIRROR_REPORT_PATH";

const DEFAULT_REMOTE_ROOT: &str = "/share/TARBIL";
const DEFAULT_MIN_YEAR: i32 = 2013;
const DEFAULT_DISK_PREFIX: &str = "TARLA-DISK";
const DEFAULT_BOUNDARY_DISK: &str = "TARLA-DISK 2014";
const DEFAULT_BOUNDARY_YEARS: [i32; 2] = [2013, 2014];
const DEFAULT_CAMERA_PREFIX: &str = "K";
const DEFAULT_ZOOM_OPTIONS: [&str; 2] = ["1X", "10X"];
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_TARGET_TIME: NaiveTime = time_of_day(10, 0);
const DEFAULT_WINDOW_START: NaiveTime = time_of_day(8, 0);
const DEFAULT_WINDOW_END: NaiveTime = time_of_day(12, 0);

const fn time_of_day(hour: u32, minute: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, minute, 0) {
        Some(time) => time,
        None => panic!("invalid time of day"),
    }
}

/// Parse an `HH_MM` time of day as used in archive filenames
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H_%M").map_err(|e| {
        Error::Config(format!("Invalid time of day '{}' (expected HH_MM): {}", value, e))
    })
}

/// How thoroughly a transferred image is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VerifyMode {
    /// Detect the format and read the header dimensions
    Headers,
    /// Header check followed by a full decode
    #[default]
    Decode,
}

impl FromStr for VerifyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headers" | "header" => Ok(Self::Headers),
            "decode" | "full" => Ok(Self::Decode),
            other => Err(Error::Config(format!("Unknown verify mode: {}", other))),
        }
    }
}

/// Which parts of the remote tree are walked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalConfig {
    /// Archive root in the remote namespace
    pub remote_root: String,
    /// Lowest year walked on ordinary disks
    pub min_year: i32,
    /// Disk directories must start with this prefix
    pub disk_prefix: String,
    /// Disk whose years are restricted to `boundary_years` instead of `min_year`
    pub boundary_disk: String,
    /// Years walked on the boundary disk
    pub boundary_years: BTreeSet<i32>,
    /// Camera directories must start with this prefix
    pub camera_prefix: String,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            remote_root: DEFAULT_REMOTE_ROOT.to_string(),
            min_year: DEFAULT_MIN_YEAR,
            disk_prefix: DEFAULT_DISK_PREFIX.to_string(),
            boundary_disk: DEFAULT_BOUNDARY_DISK.to_string(),
            boundary_years: DEFAULT_BOUNDARY_YEARS.into_iter().collect(),
            camera_prefix: DEFAULT_CAMERA_PREFIX.to_string(),
        }
    }
}

/// Which remote file represents a day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionConfig {
    /// Preferred time of day
    pub target_time: NaiveTime,
    /// Earliest acceptable time for a non-exact match
    pub window_start: NaiveTime,
    /// Latest acceptable time for a non-exact match
    pub window_end: NaiveTime,
    /// Zoom options in processing order, upper-cased (`1X`, `10X`)
    pub zoom_options: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            target_time: DEFAULT_TARGET_TIME,
            window_start: DEFAULT_WINDOW_START,
            window_end: DEFAULT_WINDOW_END,
            zoom_options: DEFAULT_ZOOM_OPTIONS.iter().map(|z| z.to_string()).collect(),
        }
    }
}

/// Post-transfer validation pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Number of concurrent validation workers
    pub workers: usize,
    /// Paths that may wait in the queue before submission blocks
    pub queue_capacity: usize,
    /// Verification depth
    pub verify_mode: VerifyMode,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            verify_mode: VerifyMode::default(),
        }
    }
}

/// Complete configuration for one mirror pass.
///
/// Use [`MirrorConfigBuilder`] (via [`MirrorConfig::builder`]) or
/// [`MirrorConfig::from_env`] to construct instances.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Where the archive namespace root is mounted locally
    pub mount_point: PathBuf,
    /// Root of the local mirror
    pub local_root: PathBuf,
    pub traversal: TraversalConfig,
    pub selection: SelectionConfig,
    pub validation: ValidationConfig,
    pub logging: LoggingConfig,
    /// Write the run report as JSON here when set
    pub report_path: Option<PathBuf>,
}

impl MirrorConfig {
    /// Creates a new builder with archive defaults
    pub fn builder() -> MirrorConfigBuilder {
        MirrorConfigBuilder::default()
    }

    /// Load configuration from the process environment
    ///
    /// A `.env` file in the working directory (or a parent) is loaded first
    /// when present; variables already set in the environment win.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().map(|_| ()).or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(()),
            other => Err(Error::Config(format!("Failed to load .env file: {}", other))),
        })?;

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = Self::builder();

        if let Some(v) = get(ENV_REMOTE_ROOT) {
            builder = builder.remote_root(v);
        }
        if let Some(v) = get(ENV_MOUNT_POINT) {
            builder = builder.mount_point(v);
        }
        if let Some(v) = get(ENV_LOCAL_ROOT) {
            builder = builder.local_root(v);
        }
        if let Some(v) = get(ENV_MIN_YEAR) {
            builder = builder.min_year(parse_setting(ENV_MIN_YEAR, &v)?);
        }
        if let Some(v) = get(ENV_DISK_PREFIX) {
            builder = builder.disk_prefix(v);
        }
        if let Some(v) = get(ENV_BOUNDARY_DISK) {
            builder = builder.boundary_disk(v);
        }
        if let Some(v) = get(ENV_BOUNDARY_YEARS) {
            let years = split_list(&v)
                .map(|y| parse_setting(ENV_BOUNDARY_YEARS, y))
                .collect::<Result<Vec<i32>>>()?;
            builder = builder.boundary_years(years);
        }
        if let Some(v) = get(ENV_CAMERA_PREFIX) {
            builder = builder.camera_prefix(v);
        }
        if let Some(v) = get(ENV_TARGET_TIME) {
            builder = builder.target_time(parse_time_setting(ENV_TARGET_TIME, &v)?);
        }
        if let Some(v) = get(ENV_WINDOW_START) {
            builder = builder.window_start(parse_time_setting(ENV_WINDOW_START, &v)?);
        }
        if let Some(v) = get(ENV_WINDOW_END) {
            builder = builder.window_end(parse_time_setting(ENV_WINDOW_END, &v)?);
        }
        if let Some(v) = get(ENV_ZOOM_OPTIONS) {
            builder = builder.zoom_options(split_list(&v).map(str::to_string).collect());
        }
        if let Some(v) = get(ENV_WORKERS) {
            builder = builder.workers(parse_setting(ENV_WORKERS, &v)?);
        }
        if let Some(v) = get(ENV_QUEUE_CAPACITY) {
            builder = builder.queue_capacity(parse_setting(ENV_QUEUE_CAPACITY, &v)?);
        }
        if let Some(v) = get(ENV_VERIFY_MODE) {
            builder = builder.verify_mode(parse_setting(ENV_VERIFY_MODE, &v)?);
        }

        let mut logging = LoggingConfig::default();
        if let Some(v) = get(ENV_LOG_FORMAT) {
            logging = logging.with_format(parse_setting::<LogFormat>(ENV_LOG_FORMAT, &v)?);
        }
        if let Some(v) = get(ENV_LOG_LEVEL) {
            logging = logging.with_level(parse_setting::<LogLevel>(ENV_LOG_LEVEL, &v)?);
        }
        if let Some(v) = get(ENV_LOG_FILTER) {
            logging = logging.with_filter(v);
        }
        builder = builder.logging(logging);

        if let Some(v) = get(ENV_REPORT_PATH) {
            builder = builder.report_path(v);
        }

        builder.build()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Local root and remote root are not empty
    /// - The window contains the target time
    /// - At least one zoom option is configured, none empty or duplicated
    /// - Worker count and queue capacity are at least 1
    pub fn validate(&self) -> Result<()> {
        if self.local_root.as_os_str().is_empty() {
            return Err(Error::Config("Local root cannot be empty".to_string()));
        }

        if self.traversal.remote_root.trim().is_empty() {
            return Err(Error::Config("Remote root cannot be empty".to_string()));
        }

        if self.traversal.disk_prefix.is_empty() {
            return Err(Error::Config("Disk prefix cannot be empty".to_string()));
        }

        let selection = &self.selection;
        if !(selection.window_start <= selection.target_time
            && selection.target_time <= selection.window_end)
        {
            return Err(Error::Config(format!(
                "Window {}..{} must contain the target time {}",
                selection.window_start.format("%H_%M"),
                selection.window_end.format("%H_%M"),
                selection.target_time.format("%H_%M"),
            )));
        }

        if selection.zoom_options.is_empty() {
            return Err(Error::Config(
                "At least one zoom option is required".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for zoom in &selection.zoom_options {
            if zoom.is_empty() || !zoom.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(Error::InvalidSetting {
                    key: ENV_ZOOM_OPTIONS.to_string(),
                    message: format!("'{}' is not an alphanumeric zoom marker", zoom),
                });
            }
            if !seen.insert(zoom.as_str()) {
                return Err(Error::InvalidSetting {
                    key: ENV_ZOOM_OPTIONS.to_string(),
                    message: format!("'{}' is listed twice", zoom),
                });
            }
        }

        if self.validation.workers == 0 {
            return Err(Error::Config(
                "Validation worker count must be at least 1".to_string(),
            ));
        }

        if self.validation.queue_capacity == 0 {
            return Err(Error::Config(
                "Validation queue capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`MirrorConfig`]
#[derive(Debug, Default)]
pub struct MirrorConfigBuilder {
    mount_point: Option<PathBuf>,
    local_root: Option<PathBuf>,
    traversal: TraversalConfig,
    selection: SelectionConfig,
    validation: ValidationConfig,
    logging: Option<LoggingConfig>,
    report_path: Option<PathBuf>,
}

impl MirrorConfigBuilder {
    /// Sets the archive root in the remote namespace
    pub fn remote_root(mut self, root: impl Into<String>) -> Self {
        self.traversal.remote_root = root.into();
        self
    }

    /// Sets where the archive namespace is mounted locally (default `/`)
    pub fn mount_point<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.mount_point = Some(path.into());
        self
    }

    /// Sets the local mirror root (required)
    pub fn local_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.local_root = Some(path.into());
        self
    }

    pub fn min_year(mut self, year: i32) -> Self {
        self.traversal.min_year = year;
        self
    }

    pub fn disk_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.traversal.disk_prefix = prefix.into();
        self
    }

    pub fn boundary_disk(mut self, disk: impl Into<String>) -> Self {
        self.traversal.boundary_disk = disk.into();
        self
    }

    pub fn boundary_years(mut self, years: impl IntoIterator<Item = i32>) -> Self {
        self.traversal.boundary_years = years.into_iter().collect();
        self
    }

    pub fn camera_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.traversal.camera_prefix = prefix.into();
        self
    }

    pub fn target_time(mut self, time: NaiveTime) -> Self {
        self.selection.target_time = time;
        self
    }

    pub fn window_start(mut self, time: NaiveTime) -> Self {
        self.selection.window_start = time;
        self
    }

    pub fn window_end(mut self, time: NaiveTime) -> Self {
        self.selection.window_end = time;
        self
    }

    /// Sets the zoom options in processing order; markers are upper-cased
    pub fn zoom_options(mut self, options: Vec<String>) -> Self {
        self.selection.zoom_options = options
            .into_iter()
            .map(|z| z.trim().to_ascii_uppercase())
            .collect();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.validation.workers = workers;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.validation.queue_capacity = capacity;
        self
    }

    pub fn verify_mode(mut self, mode: VerifyMode) -> Self {
        self.validation.verify_mode = mode;
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn report_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Builds the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the local root is missing or [`MirrorConfig::validate`]
    /// rejects the combination of settings.
    pub fn build(self) -> Result<MirrorConfig> {
        let local_root = self.local_root.ok_or_else(|| {
            Error::Config("Local root is required. Use .local_root() to set it.".to_string())
        })?;

        let config = MirrorConfig {
            mount_point: self.mount_point.unwrap_or_else(|| PathBuf::from("/")),
            local_root,
            traversal: self.traversal,
            selection: self.selection,
            validation: self.validation,
            logging: self.logging.unwrap_or_default(),
            report_path: self.report_path,
        };

        config.validate()?;
        Ok(config)
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_setting<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    value.trim().parse::<T>().map_err(|e| Error::InvalidSetting {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn parse_time_setting(key: &str, value: &str) -> Result<NaiveTime> {
    parse_time_of_day(value).map_err(|e| Error::InvalidSetting {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_builder_defaults() {
        let config = MirrorConfig::builder().local_root("/data/mirror").build().unwrap();

        assert_eq!(config.mount_point, PathBuf::from("/"));
        assert_eq!(config.traversal.remote_root, "/share/TARBIL");
        assert_eq!(config.traversal.min_year, 2013);
        assert_eq!(config.traversal.boundary_disk, "TARLA-DISK 2014");
        assert_eq!(
            config.traversal.boundary_years.iter().copied().collect::<Vec<_>>(),
            vec![2013, 2014]
        );
        assert_eq!(config.selection.target_time, time(10, 0));
        assert_eq!(config.selection.window_start, time(8, 0));
        assert_eq!(config.selection.window_end, time(12, 0));
        assert_eq!(config.selection.zoom_options, vec!["1X", "10X"]);
        assert_eq!(config.validation.workers, 4);
        assert_eq!(config.validation.verify_mode, VerifyMode::Decode);
        assert!(config.report_path.is_none());
    }

    #[test]
    fn test_builder_requires_local_root() {
        let err = MirrorConfig::builder().build().unwrap_err();
        assert!(err.to_string().contains("Local root is required"));
    }

    #[test]
    fn test_window_must_contain_target() {
        let err = MirrorConfig::builder()
            .local_root("/data")
            .target_time(time(13, 0))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("must contain the target time"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(MirrorConfig::builder()
            .local_root("/data")
            .workers(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_zoom_options_normalized_and_checked() {
        let config = MirrorConfig::builder()
            .local_root("/data")
            .zoom_options(vec!["10x".to_string(), " 1x ".to_string()])
            .build()
            .unwrap();
        assert_eq!(config.selection.zoom_options, vec!["10X", "1X"]);

        let err = MirrorConfig::builder()
            .local_root("/data")
            .zoom_options(vec!["1X".to_string(), "1x".to_string()])
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSetting { .. }));

        assert!(MirrorConfig::builder()
            .local_root("/data")
            .zoom_options(Vec::new())
            .build()
            .is_err());
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(parse_time_of_day("09_58").unwrap(), time(9, 58));
        assert!(parse_time_of_day("9:58").is_err());
        assert!(parse_time_of_day("25_00").is_err());
    }

    #[test]
    fn test_from_lookup_reads_all_settings() {
        let config = MirrorConfig::from_lookup(lookup(&[
            (ENV_LOCAL_ROOT, "/mirror"),
            (ENV_REMOTE_ROOT, "/archive"),
            (ENV_MOUNT_POINT, "/mnt/nas"),
            (ENV_MIN_YEAR, "2016"),
            (ENV_BOUNDARY_DISK, "DISK 2016"),
            (ENV_BOUNDARY_YEARS, "2015, 2016"),
            (ENV_CAMERA_PREFIX, "C"),
            (ENV_TARGET_TIME, "11_30"),
            (ENV_WINDOW_START, "10_00"),
            (ENV_WINDOW_END, "13_00"),
            (ENV_ZOOM_OPTIONS, "10x"),
            (ENV_WORKERS, "2"),
            (ENV_QUEUE_CAPACITY, "8"),
            (ENV_VERIFY_MODE, "headers"),
            (ENV_LOG_FORMAT, "json"),
            (ENV_LOG_LEVEL, "debug"),
            (ENV_REPORT_PATH, "/tmp/report.json"),
        ]))
        .unwrap();

        assert_eq!(config.local_root, PathBuf::from("/mirror"));
        assert_eq!(config.mount_point, PathBuf::from("/mnt/nas"));
        assert_eq!(config.traversal.remote_root, "/archive");
        assert_eq!(config.traversal.min_year, 2016);
        assert_eq!(config.traversal.boundary_disk, "DISK 2016");
        assert!(config.traversal.boundary_years.contains(&2015));
        assert_eq!(config.traversal.camera_prefix, "C");
        assert_eq!(config.selection.target_time, time(11, 30));
        assert_eq!(config.selection.zoom_options, vec!["10X"]);
        assert_eq!(config.validation.workers, 2);
        assert_eq!(config.validation.queue_capacity, 8);
        assert_eq!(config.validation.verify_mode, VerifyMode::Headers);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.report_path, Some(PathBuf::from("/tmp/report.json")));
    }

    #[test]
    fn test_from_lookup_reports_bad_key() {
        let err = MirrorConfig::from_lookup(lookup(&[
            (ENV_LOCAL_ROOT, "/mirror"),
            (ENV_WORKERS, "many"),
        ]))
        .unwrap_err();

        match err {
            Error::InvalidSetting { key, .. } => assert_eq!(key, ENV_WORKERS),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_from_lookup_ignores_blank_values() {
        let config = MirrorConfig::from_lookup(lookup(&[
            (ENV_LOCAL_ROOT, "/mirror"),
            (ENV_MIN_YEAR, "  "),
        ]))
        .unwrap();
        assert_eq!(config.traversal.min_year, 2013);
    }
}
