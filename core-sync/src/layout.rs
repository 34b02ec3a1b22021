//! # Local Mirror Layout
//!
//! The names written here are the contract with downstream tools (image
//! lookup, zoom classification, quality checks). They must stay stable.
//!
//! ```text
//! <local-root>/<station>/<year>/<camera>/<ZOOM>/<YYYY_MM_DD>-<HH_MM>-<zoom>.jpeg
//! <local-root>/corrupted/<escaped relative path>
//! ```
//!
//! The zoom directory is upper-case (`10X`), the zoom suffix of the file
//! name lower-case (`10x`).

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Component, Path, PathBuf};

/// Directory under the local root that receives corrupt files
pub const QUARANTINE_DIR: &str = "corrupted";

/// Extension of every mirrored image
pub const IMAGE_EXTENSION: &str = "jpeg";

const QUARANTINE_JOINER: char = '#';

static LOCAL_FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}_\d{2}_\d{2})-(\d{2}_\d{2})-([0-9a-z]+)\.jpeg$")
        .expect("local file name pattern is valid")
});

/// One unit of synchronization work below an archive location
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DaySlot {
    pub date: NaiveDate,
    /// Upper-case zoom option (`1X`, `10X`)
    pub zoom: String,
}

impl DaySlot {
    pub fn new(date: NaiveDate, zoom: impl Into<String>) -> Self {
        Self {
            date,
            zoom: zoom.into().to_ascii_uppercase(),
        }
    }

    /// `YYYY_MM_DD`
    pub fn day_key(&self) -> String {
        self.date.format("%Y_%m_%d").to_string()
    }

    pub fn zoom_lower(&self) -> String {
        self.zoom.to_ascii_lowercase()
    }
}

impl std::fmt::Display for DaySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.day_key(), self.zoom)
    }
}

/// A mirrored image and where it lives under the local root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalImageRecord {
    pub station: String,
    pub year: i32,
    pub camera: String,
    /// Upper-case zoom option
    pub zoom: String,
    /// `YYYY_MM_DD`
    pub day_key: String,
    /// `HH_MM` of the remote file that was selected
    pub time_part: String,
}

impl LocalImageRecord {
    /// Canonical file name: `{day_key}-{time_part}-{zoom_lower}.jpeg`
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.{}",
            self.day_key,
            self.time_part,
            self.zoom.to_ascii_lowercase(),
            IMAGE_EXTENSION
        )
    }

    /// Directory relative to the local root
    pub fn relative_dir(&self) -> PathBuf {
        slot_relative_dir(&self.station, self.year, &self.camera, &self.zoom)
    }

    pub fn relative_path(&self) -> PathBuf {
        self.relative_dir().join(self.file_name())
    }

    pub fn path_in(&self, local_root: &Path) -> PathBuf {
        local_root.join(self.relative_path())
    }

    /// Recover a record from a path relative to the local root
    ///
    /// Returns `None` for anything that is not a canonical mirror file,
    /// including quarantined files.
    pub fn from_relative_path(relative: &Path) -> Option<Self> {
        let parts: Vec<&str> = relative
            .components()
            .map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        let [station, year, camera, zoom, file_name] = parts.as_slice() else {
            return None;
        };

        let parsed = LocalFileName::parse(file_name)?;
        if parsed.zoom_lower != zoom.to_ascii_lowercase() || !parsed.day_key.starts_with(*year) {
            return None;
        }

        Some(Self {
            station: station.to_string(),
            year: year.parse().ok()?,
            camera: camera.to_string(),
            zoom: zoom.to_string(),
            day_key: parsed.day_key,
            time_part: parsed.time_part,
        })
    }
}

/// Parsed parts of a canonical local file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileName {
    pub day_key: String,
    pub time_part: String,
    pub zoom_lower: String,
}

impl LocalFileName {
    pub fn parse(name: &str) -> Option<Self> {
        let caps = LOCAL_FILE_NAME.captures(name)?;
        Some(Self {
            day_key: caps[1].to_string(),
            time_part: caps[2].to_string(),
            zoom_lower: caps[3].to_string(),
        })
    }

    /// Whether this file satisfies the slot `{day_key}-HH_MM-{zoom}.jpeg`
    pub fn satisfies(&self, slot: &DaySlot) -> bool {
        self.day_key == slot.day_key() && self.zoom_lower == slot.zoom_lower()
    }
}

/// `<station>/<year>/<camera>/<ZOOM>`
pub fn slot_relative_dir(station: &str, year: i32, camera: &str, zoom: &str) -> PathBuf {
    PathBuf::from(station)
        .join(format!("{:04}", year))
        .join(camera)
        .join(zoom.to_ascii_uppercase())
}

/// Collision-free file name for a quarantined file
///
/// The path components (relative to the local root) are joined with `#`;
/// `%` and `#` inside a component are percent-escaped first, so two distinct
/// relative paths always produce two distinct names.
pub fn quarantine_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(escape_component(&part.to_string_lossy())),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(&QUARANTINE_JOINER.to_string())
}

fn escape_component(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for ch in part.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            QUARANTINE_JOINER => escaped.push_str("%23"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LocalImageRecord {
        LocalImageRecord {
            station: "01.02".to_string(),
            year: 2014,
            camera: "K1".to_string(),
            zoom: "10X".to_string(),
            day_key: "2014_05_23".to_string(),
            time_part: "10_00".to_string(),
        }
    }

    #[test]
    fn test_canonical_path() {
        let record = record();
        assert_eq!(record.file_name(), "2014_05_23-10_00-10x.jpeg");
        assert_eq!(
            record.path_in(Path::new("/mirror")),
            PathBuf::from("/mirror/01.02/2014/K1/10X/2014_05_23-10_00-10x.jpeg")
        );
    }

    #[test]
    fn test_record_round_trips_through_relative_path() {
        let record = record();
        assert_eq!(
            LocalImageRecord::from_relative_path(&record.relative_path()),
            Some(record)
        );
        assert_eq!(
            LocalImageRecord::from_relative_path(Path::new("corrupted/01.02#2014#K1")),
            None
        );
    }

    #[test]
    fn test_day_slot_keys() {
        let slot = DaySlot::new(NaiveDate::from_ymd_opt(2014, 5, 3).unwrap(), "10x");
        assert_eq!(slot.zoom, "10X");
        assert_eq!(slot.day_key(), "2014_05_03");
        assert_eq!(slot.zoom_lower(), "10x");
        assert_eq!(slot.to_string(), "2014_05_03/10X");
    }

    #[test]
    fn test_local_file_name_satisfies_slot() {
        let slot = DaySlot::new(NaiveDate::from_ymd_opt(2014, 5, 23).unwrap(), "10X");

        let any_time = LocalFileName::parse("2014_05_23-09_58-10x.jpeg").unwrap();
        assert!(any_time.satisfies(&slot));

        let other_zoom = LocalFileName::parse("2014_05_23-09_58-1x.jpeg").unwrap();
        assert!(!other_zoom.satisfies(&slot));

        assert!(LocalFileName::parse("2014_05_23-09_58-10x.jpeg.part").is_none());
        assert!(LocalFileName::parse("2014_05_23-09_58-10X.jpeg").is_none());
        assert!(LocalFileName::parse("2014_05_23-9_58-10x.jpeg").is_none());
    }

    #[test]
    fn test_quarantine_name_uses_full_relative_path() {
        let name = quarantine_name(Path::new("01.02/2014/K1/10X/2014_05_23-10_00-10x.jpeg"));
        assert_eq!(name, "01.02#2014#K1#10X#2014_05_23-10_00-10x.jpeg");
    }

    #[test]
    fn test_quarantine_names_never_collide() {
        let a = quarantine_name(Path::new("a#b/c"));
        let b = quarantine_name(Path::new("a/b#c"));
        let c = quarantine_name(Path::new("a/b/c"));
        let d = quarantine_name(Path::new("a%23b/c"));

        assert_eq!(a, "a%23b#c");
        assert_eq!(b, "a#b%23c");
        assert_eq!(c, "a#b#c");
        assert_eq!(d, "a%2523b#c");
        let names = [&a, &b, &c, &d];
        for (i, x) in names.iter().enumerate() {
            for y in names.iter().skip(i + 1) {
                assert_ne!(x, y);
            }
        }
    }
}
