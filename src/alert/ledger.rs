//! Notification ledger.
//!
//! Durable record of every site that has been notified about, and at which
//! level. The differ reads the snapshot, not the ledger; the ledger only
//! decides whether a downgrade may be announced (never announce "risk
//! decreased" for a site nobody was told about) and keeps an auditable
//! history of what was sent.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::alert::transitions::TransitionKind;
use crate::model::{format_timestamp, Level, LevelSet, SiteKey, SiteRecord};

/// Last notified state of one site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub risk_level: Level,
    #[serde(default)]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "raw_dynamic_score", default)]
    pub raw_score: f64,
    pub last_updated: String,
    /// Set when the site was last recorded below the notifiable floor.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resolved: bool,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Mapping from `"lat,lon"` site key to its ledger entry.
///
/// Keys are kept sorted so the persisted file diffs cleanly between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl NotificationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SiteKey) -> Option<&LedgerEntry> {
        self.entries.get(&key.to_string())
    }

    pub fn contains(&self, key: &SiteKey) -> bool {
        self.entries.contains_key(&key.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LedgerEntry)> {
        self.entries.iter()
    }

    /// Whether a transition of `kind` for `key` may be notified.
    ///
    /// Downgrades require a prior ledger entry of any kind, including a
    /// resolved one. New and Upgrade are always allowed.
    pub fn is_notification_allowed(&self, key: &SiteKey, kind: TransitionKind) -> bool {
        match kind {
            TransitionKind::Downgrade => self.contains(key),
            TransitionKind::New | TransitionKind::Upgrade => true,
        }
    }

    /// Upserts the entry for `key` from the site's current record.
    ///
    /// A level outside `notifiable` marks the entry resolved; the entry is
    /// kept so later escalations still find a history for the site.
    pub fn record(
        &mut self,
        key: &SiteKey,
        record: &SiteRecord,
        notifiable: &LevelSet,
        now: DateTime<Utc>,
    ) {
        let entry = LedgerEntry {
            risk_level: record.level,
            name: record.name.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            raw_score: record.raw_score,
            last_updated: format_timestamp(now),
            resolved: !notifiable.contains(record.level),
            details: record.details.clone(),
        };
        self.entries.insert(key.to_string(), entry);
    }

    /// Drops entries whose site is no longer present in the source data.
    /// Returns how many entries were removed.
    pub fn retain_sites(&mut self, valid: &HashSet<SiteKey>) -> usize {
        let valid: HashSet<String> = valid.iter().map(SiteKey::to_string).collect();
        let before = self.entries.len();
        self.entries.retain(|key, _| valid.contains(key));
        before - self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn notifiable() -> LevelSet {
        [Level::Medium, Level::High, Level::Extreme].into_iter().collect()
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 6, 0, 0).unwrap()
    }

    fn record(level: Level) -> SiteRecord {
        let mut details = Map::new();
        details.insert("river_name".to_string(), json!("Manzanares"));
        SiteRecord {
            id: "17".to_string(),
            name: "Getafe".to_string(),
            latitude: 40.3057,
            longitude: -3.7329,
            raw_score: 22.4,
            level,
            details,
        }
    }

    fn key() -> SiteKey {
        SiteKey::from_coords(40.3057, -3.7329, 4)
    }

    #[test]
    fn test_downgrade_requires_prior_entry() {
        let ledger = NotificationLedger::new();
        assert!(!ledger.is_notification_allowed(&key(), TransitionKind::Downgrade));
        assert!(ledger.is_notification_allowed(&key(), TransitionKind::New));
        assert!(ledger.is_notification_allowed(&key(), TransitionKind::Upgrade));
    }

    #[test]
    fn test_record_creates_entry_with_fields() {
        let mut ledger = NotificationLedger::new();
        ledger.record(&key(), &record(Level::High), &notifiable(), fixed_now());

        let entry = ledger.get(&key()).expect("entry recorded");
        assert_eq!(entry.risk_level, Level::High);
        assert_eq!(entry.name, "Getafe");
        assert!(!entry.resolved);
        assert_eq!(entry.details["river_name"], "Manzanares");
        assert_eq!(entry.last_updated, "2025-03-04T06:00:00.000000Z");
        assert!(ledger.is_notification_allowed(&key(), TransitionKind::Downgrade));
    }

    #[test]
    fn test_record_below_floor_marks_resolved_and_keeps_entry() {
        let mut ledger = NotificationLedger::new();
        ledger.record(&key(), &record(Level::High), &notifiable(), fixed_now());
        ledger.record(&key(), &record(Level::Low), &notifiable(), fixed_now());

        let entry = ledger.get(&key()).unwrap();
        assert_eq!(entry.risk_level, Level::Low);
        assert!(entry.resolved);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_re_escalation_clears_resolved_marker() {
        let mut ledger = NotificationLedger::new();
        ledger.record(&key(), &record(Level::Low), &notifiable(), fixed_now());
        ledger.record(&key(), &record(Level::Extreme), &notifiable(), fixed_now());
        assert!(!ledger.get(&key()).unwrap().resolved);
    }

    #[test]
    fn test_resolved_entry_still_allows_downgrade() {
        // The gate checks for any entry, not for a notifiable one. A site
        // that only ever reached the ledger in a resolved state can still
        // have a later downgrade announced.
        let mut ledger = NotificationLedger::new();
        ledger.record(&key(), &record(Level::Low), &notifiable(), fixed_now());
        assert!(ledger.get(&key()).unwrap().resolved);
        assert!(ledger.is_notification_allowed(&key(), TransitionKind::Downgrade));
    }

    #[test]
    fn test_retain_sites_drops_unknown_keys() {
        let mut ledger = NotificationLedger::new();
        let other = SiteKey::from_coords(41.0, -4.0, 4);
        ledger.record(&key(), &record(Level::High), &notifiable(), fixed_now());
        ledger.record(&other, &record(Level::Medium), &notifiable(), fixed_now());

        let valid: HashSet<SiteKey> = [key()].into_iter().collect();
        assert_eq!(ledger.retain_sites(&valid), 1);
        assert!(ledger.contains(&key()));
        assert!(!ledger.contains(&other));
    }

    #[test]
    fn test_serializes_as_flat_map_keyed_by_coordinates() {
        let mut ledger = NotificationLedger::new();
        ledger.record(&key(), &record(Level::Low), &notifiable(), fixed_now());
        let value = serde_json::to_value(&ledger).unwrap();

        let entry = &value["40.3057,-3.7329"];
        assert_eq!(entry["risk_level"], "Low");
        assert_eq!(entry["resolved"], true);
        assert_eq!(entry["river_name"], "Manzanares");

        let back: NotificationLedger = serde_json::from_value(value).unwrap();
        assert_eq!(back, ledger);
    }

    #[test]
    fn test_unresolved_entry_omits_resolved_field() {
        let mut ledger = NotificationLedger::new();
        ledger.record(&key(), &record(Level::High), &notifiable(), fixed_now());
        let value = serde_json::to_value(&ledger).unwrap();
        assert!(value["40.3057,-3.7329"].get("resolved").is_none());
    }
}
