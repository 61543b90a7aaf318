//! Level-transition detection between two runs.
//!
//! Compares the current run's sites against the previous snapshot and
//! classifies each change as New, Upgrade or Downgrade. Policy is
//! asymmetric: upgrades are judged by the level a site moves *into*,
//! downgrades by the level it moves *out of*, so a Medium site dropping to
//! Low is still reported (that is how resolved alerts get announced).

use std::fmt;

use serde::Serialize;

use crate::model::{Level, LevelSet, SiteMap, SiteRecord};

/// Kind of change detected for one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransitionKind {
    New,
    Upgrade,
    Downgrade,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::New => write!(f, "New"),
            TransitionKind::Upgrade => write!(f, "Upgrade"),
            TransitionKind::Downgrade => write!(f, "Downgrade"),
        }
    }
}

/// Which transitions are worth reporting.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    /// Levels that may trigger an outward notification.
    pub notifiable: LevelSet,
    pub alert_on_upgrades: bool,
    pub alert_on_downgrades: bool,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        AlertPolicy {
            notifiable: [Level::Medium, Level::High, Level::Extreme]
                .into_iter()
                .collect(),
            alert_on_upgrades: true,
            alert_on_downgrades: true,
        }
    }
}

/// A classified change for one site.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<'a> {
    pub kind: TransitionKind,
    pub record: &'a SiteRecord,
    /// Level in the previous snapshot; `None` for sites seen for the first time.
    pub previous_level: Option<Level>,
}

/// Classifies level changes from `previous` to `current`.
///
/// Only sites present in `current` are considered; sites that disappeared
/// are not reported. Output follows `current`'s insertion order.
pub fn diff<'a>(
    previous: &SiteMap<'_>,
    current: &SiteMap<'a>,
    policy: &AlertPolicy,
) -> Vec<Transition<'a>> {
    let mut transitions = Vec::new();

    for (key, record) in current.iter() {
        let current_level = record.level;

        let Some(prev_record) = previous.get(&key) else {
            if policy.notifiable.contains(current_level) {
                transitions.push(Transition {
                    kind: TransitionKind::New,
                    record,
                    previous_level: None,
                });
            }
            continue;
        };

        let previous_level = prev_record.level;
        if previous_level == current_level {
            continue;
        }

        let kind = if current_level > previous_level
            && policy.alert_on_upgrades
            && policy.notifiable.contains(current_level)
        {
            Some(TransitionKind::Upgrade)
        } else if current_level < previous_level
            && policy.alert_on_downgrades
            && policy.notifiable.contains(previous_level)
        {
            Some(TransitionKind::Downgrade)
        } else {
            None
        };

        if let Some(kind) = kind {
            transitions.push(Transition {
                kind,
                record,
                previous_level: Some(previous_level),
            });
        }
    }

    transitions
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
