/// Core data types for the FloodLink alert service.
///
/// This module defines the shared domain model imported by all other modules:
/// risk levels, site identity, site records, snapshots, and the error types
/// raised at the I/O edges. It contains no I/O of its own.
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Risk levels
// ---------------------------------------------------------------------------

/// Discrete flood risk level, in ascending order of severity.
///
/// Upgrade/downgrade comparisons rely on the derived `Ord`, which follows
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    None,
    Low,
    Medium,
    High,
    Extreme,
}

impl Level {
    /// Every level, lowest first.
    pub const ALL: [Level; 5] = [
        Level::None,
        Level::Low,
        Level::Medium,
        Level::High,
        Level::Extreme,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::None => "None",
            Level::Low => "Low",
            Level::Medium => "Medium",
            Level::High => "High",
            Level::Extreme => "Extreme",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown risk level '{}'", s))
    }
}

/// A subset of levels, e.g. the levels that are worth notifying about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelSet {
    bits: u8,
}

impl LevelSet {
    pub fn contains(&self, level: Level) -> bool {
        self.bits & level.bit() != 0
    }

    pub fn insert(&mut self, level: Level) {
        self.bits |= level.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Level> + '_ {
        Level::ALL.into_iter().filter(|l| self.contains(*l))
    }
}

impl FromIterator<Level> for LevelSet {
    fn from_iter<I: IntoIterator<Item = Level>>(iter: I) -> Self {
        let mut set = LevelSet::default();
        for level in iter {
            set.insert(level);
        }
        set
    }
}

// ---------------------------------------------------------------------------
// Site identity
// ---------------------------------------------------------------------------

/// Decimal places used for site keys unless configured otherwise (~11 m).
pub const DEFAULT_KEY_PRECISION: u32 = 4;

const MAX_KEY_PRECISION: u32 = 9;

/// Stable identity of a monitored location across runs.
///
/// Coordinates are rounded to `precision` decimal places and kept as scaled
/// integers, so float jitter from upstream sources below the rounding
/// granularity maps to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteKey {
    lat_scaled: i64,
    lon_scaled: i64,
    precision: u32,
}

impl SiteKey {
    pub fn from_coords(latitude: f64, longitude: f64, precision: u32) -> Self {
        let precision = precision.min(MAX_KEY_PRECISION);
        let factor = 10f64.powi(precision as i32);
        SiteKey {
            lat_scaled: (latitude * factor).round() as i64,
            lon_scaled: (longitude * factor).round() as i64,
            precision,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.lat_scaled as f64 / 10f64.powi(self.precision as i32)
    }

    pub fn longitude(&self) -> f64 {
        self.lon_scaled as f64 / 10f64.powi(self.precision as i32)
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }
}

/// Formats as `"lat,lon"` with `precision` decimals, the ledger key format.
impl fmt::Display for SiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = self.precision as usize;
        write!(f, "{:.*},{:.*}", p, self.latitude(), p, self.longitude())
    }
}

// ---------------------------------------------------------------------------
// Site records and snapshots
// ---------------------------------------------------------------------------

/// One evaluated site for one run.
///
/// `details` holds evaluator-specific descriptive fields (river name,
/// rainfall totals, nearest towns...) which are carried through untouched
/// and flattened into the record's JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "raw_dynamic_score", default)]
    pub raw_score: f64,
    #[serde(rename = "dynamic_level")]
    pub level: Level,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl SiteRecord {
    pub fn key(&self, precision: u32) -> SiteKey {
        SiteKey::from_coords(self.latitude, self.longitude, precision)
    }

    /// Returns a descriptive field as a string, if present and scalar.
    pub fn detail_str(&self, field: &str) -> Option<String> {
        match self.details.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Full-state capture of one run, persisted as the next run's baseline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub timestamp: String,
    #[serde(alias = "source_label")]
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_window_hours: Option<u32>,
    pub features_evaluated: usize,
    pub alerts: Vec<SiteRecord>,
}

impl Snapshot {
    pub fn new(source: &str, alerts: Vec<SiteRecord>, now: DateTime<Utc>) -> Self {
        Snapshot {
            timestamp: format_timestamp(now),
            source: source.to_string(),
            forecast_window_hours: None,
            features_evaluated: alerts.len(),
            alerts,
        }
    }
}

/// RFC 3339 UTC timestamp with a `Z` suffix, as used in all persisted files.
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Records keyed by site identity, remembering first-insertion order.
///
/// A later record with the same key replaces the earlier one but keeps its
/// position, so iteration order is stable for a given input.
#[derive(Debug, Default)]
pub struct SiteMap<'a> {
    order: Vec<SiteKey>,
    by_key: HashMap<SiteKey, &'a SiteRecord>,
}

impl<'a> SiteMap<'a> {
    pub fn from_records(records: &'a [SiteRecord], precision: u32) -> Self {
        let mut map = SiteMap::default();
        for record in records {
            let key = record.key(precision);
            if map.by_key.insert(key, record).is_none() {
                map.order.push(key);
            }
        }
        map
    }

    pub fn get(&self, key: &SiteKey) -> Option<&'a SiteRecord> {
        self.by_key.get(key).copied()
    }

    pub fn contains(&self, key: &SiteKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (SiteKey, &'a SiteRecord)> + '_ {
        self.order.iter().map(|key| (*key, self.by_key[key]))
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while fetching or loading source data for one site or feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-2xx HTTP response.
    #[error("HTTP error: {0}")]
    HttpStatus(u16),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request failed: {0}")]
    Request(String),
    /// The payload could not be deserialized.
    #[error("parse error: {0}")]
    Parse(String),
    /// The payload parsed but contained nothing usable.
    #[error("no data available: {0}")]
    NoData(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus(status.as_u16())
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Request(err.to_string())
        }
    }
}

impl FetchError {
    /// Timeouts and dropped connections are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout(_) | FetchError::Connection(_))
    }
}

/// Errors raised by the persisted state files.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize state for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by a notification channel.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification endpoint returned HTTP {0}")]
    HttpStatus(u16),
    #[error("notification request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => NotifyError::HttpStatus(status.as_u16()),
            None => NotifyError::Request(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(lat: f64, lon: f64, level: Level) -> SiteRecord {
        SiteRecord {
            id: "1".to_string(),
            name: "Rivas".to_string(),
            latitude: lat,
            longitude: lon,
            raw_score: 12.5,
            level,
            details: Map::new(),
        }
    }

    #[test]
    fn test_level_ordering_follows_severity() {
        assert!(Level::None < Level::Low);
        assert!(Level::Low < Level::Medium);
        assert!(Level::Medium < Level::High);
        assert!(Level::High < Level::Extreme);
    }

    #[test]
    fn test_level_parses_case_insensitively() {
        assert_eq!("extreme".parse::<Level>(), Ok(Level::Extreme));
        assert_eq!(" Medium ".parse::<Level>(), Ok(Level::Medium));
        assert!("severe".parse::<Level>().is_err());
    }

    #[test]
    fn test_level_set_membership() {
        let set: LevelSet = [Level::Medium, Level::High].into_iter().collect();
        assert!(set.contains(Level::Medium));
        assert!(!set.contains(Level::Low));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Level::Medium, Level::High]);
    }

    #[test]
    fn test_site_key_absorbs_jitter_below_precision() {
        let a = SiteKey::from_coords(40.416_78, -3.703_79, 4);
        let b = SiteKey::from_coords(40.416_780_000_1, -3.703_790_000_2, 4);
        assert_eq!(a, b);
        let c = SiteKey::from_coords(40.4169, -3.7038, 4);
        assert_ne!(a, c);
    }

    #[test]
    fn test_site_key_formats_with_fixed_decimals() {
        let key = SiteKey::from_coords(40.5, -3.25, 4);
        assert_eq!(key.to_string(), "40.5000,-3.2500");
    }

    #[test]
    fn test_record_details_flatten_into_json() {
        let mut r = record(40.0, -3.7, Level::High);
        r.details.insert("river_name".to_string(), json!("Tajo"));
        let value = serde_json::to_value(&r).unwrap();
        assert_eq!(value["river_name"], "Tajo");
        assert_eq!(value["dynamic_level"], "High");
        assert_eq!(value["raw_dynamic_score"], 12.5);

        let back: SiteRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_site_map_keeps_first_position_last_value() {
        let records = vec![
            record(1.0, 1.0, Level::Low),
            record(2.0, 2.0, Level::Medium),
            record(1.0, 1.0, Level::High),
        ];
        let map = SiteMap::from_records(&records, 4);
        let levels: Vec<Level> = map.iter().map(|(_, r)| r.level).collect();
        assert_eq!(levels, vec![Level::High, Level::Medium]);
    }

    #[test]
    fn test_snapshot_accepts_source_label_alias() {
        let raw = r#"{"timestamp":"t","source_label":"GloFAS","features_evaluated":0,"alerts":[]}"#;
        let snapshot: Snapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.source, "GloFAS");
    }
}
