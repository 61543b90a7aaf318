//! One alert run, end to end.
//!
//! An evaluator produces an `Evaluation` (every site it scored this run).
//! `AlertEngine::run` compares it with the previous snapshot, notifies the
//! permitted transitions, updates the ledger and persists the new baseline.
//!
//! Failure policy:
//! - unreadable previous state: logged, run continues from empty state
//! - notification failure: logged, ledger still updated
//! - persistence failure: returned, after attempting both saves

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::alert::{diff, NotificationLedger, NotificationThrottle};
use crate::config::AlertSettings;
use crate::logging::{self, DataSource};
use crate::model::{SiteKey, SiteMap, SiteRecord, Snapshot, StoreError};
use crate::notify::{Notification, Notifier};
use crate::store::StateStore;

/// Everything an evaluator scored in one run.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// Label written into the snapshot, e.g. "Open-Meteo".
    pub source: String,
    pub forecast_window_hours: Option<u32>,
    pub records: Vec<SiteRecord>,
    /// Every site present in the source data, evaluated or not. Required
    /// for ledger cleanup; `None` disables it for this run.
    pub source_sites: Option<HashSet<SiteKey>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub evaluated: usize,
    pub transitions: usize,
    pub sent: usize,
    /// Downgrades dropped because the site was never notified.
    pub suppressed: usize,
    pub failed: usize,
    /// Ledger entries removed for sites gone from the source.
    pub cleaned: usize,
}

pub struct AlertEngine<S, N> {
    store: S,
    notifier: N,
    settings: AlertSettings,
    throttle: NotificationThrottle,
    log_source: DataSource,
}

impl<S: StateStore, N: Notifier> AlertEngine<S, N> {
    pub fn new(store: S, notifier: N, settings: AlertSettings, min_interval: Duration) -> Self {
        AlertEngine {
            store,
            notifier,
            settings,
            throttle: NotificationThrottle::new(min_interval),
            log_source: DataSource::System,
        }
    }

    /// Tag used on this engine's log lines.
    pub fn with_log_source(mut self, source: DataSource) -> Self {
        self.log_source = source;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    pub fn into_parts(self) -> (S, N) {
        (self.store, self.notifier)
    }

    pub fn run(&mut self, evaluation: &Evaluation, now: DateTime<Utc>) -> Result<RunReport, StoreError> {
        let src = self.log_source;
        let precision = self.settings.key_precision;
        let mut report = RunReport {
            evaluated: evaluation.records.len(),
            ..RunReport::default()
        };

        let previous = match self.store.load_snapshot() {
            Ok(Some(snapshot)) => snapshot.alerts,
            Ok(None) => {
                logging::info(src, None, "No previous snapshot, treating every site as new");
                Vec::new()
            }
            Err(e) => {
                logging::warn(src, None, &format!("Ignoring unreadable snapshot: {}", e));
                Vec::new()
            }
        };

        let mut ledger = match self.store.load_ledger() {
            Ok(ledger) => ledger.unwrap_or_default(),
            Err(e) => {
                logging::warn(src, None, &format!("Ignoring unreadable ledger: {}", e));
                NotificationLedger::new()
            }
        };

        if self.settings.cleanup_ledger {
            if let Some(sites) = &evaluation.source_sites {
                report.cleaned = ledger.retain_sites(sites);
                if report.cleaned > 0 {
                    logging::info(
                        src,
                        None,
                        &format!("Removed {} ledger entries for sites no longer in the source", report.cleaned),
                    );
                }
            }
        }

        let previous_map = SiteMap::from_records(&previous, precision);
        let current_map = SiteMap::from_records(&evaluation.records, precision);
        let transitions = diff(&previous_map, &current_map, &self.settings.policy);
        report.transitions = transitions.len();
        logging::info(src, None, &format!("Detected {} level-change events", transitions.len()));

        for t in &transitions {
            let key = t.record.key(precision);
            let site = key.to_string();
            logging::debug(
                src,
                Some(&site),
                &format!(
                    "{}: {} -> {} ({}), score {}",
                    t.record.name,
                    t.previous_level.map(|l| l.as_str()).unwrap_or("None"),
                    t.record.level,
                    t.kind,
                    t.record.raw_score
                ),
            );

            if !ledger.is_notification_allowed(&key, t.kind) {
                report.suppressed += 1;
                logging::info(
                    src,
                    Some(&site),
                    &format!("Skipping {} for {}: never notified", t.kind, t.record.name),
                );
                continue;
            }

            self.throttle.pace();
            let notification = Notification {
                kind: t.kind,
                record: t.record,
                previous_level: t.previous_level,
            };
            match self.notifier.send(&notification) {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    report.failed += 1;
                    logging::error(
                        DataSource::Notifier,
                        Some(&site),
                        &format!("Notification for {} failed: {}", t.record.name, e),
                    );
                }
            }
            self.throttle.mark_sent();
            ledger.record(&key, t.record, &self.settings.policy.notifiable, now);
        }

        let mut snapshot = Snapshot::new(&evaluation.source, evaluation.records.clone(), now);
        snapshot.forecast_window_hours = evaluation.forecast_window_hours;

        let ledger_saved = self.store.save_ledger(&ledger);
        let snapshot_saved = self.store.save_snapshot(&snapshot);
        ledger_saved?;
        snapshot_saved?;

        logging::log_run_summary(src, report.evaluated, report.sent, report.failed);
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
