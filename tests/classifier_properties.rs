/// Property tests for score classification and transition detection
///
/// Run with: cargo test --test classifier_properties
use proptest::prelude::*;
use serde_json::Map;

use floodlink_service::alert::{diff, AlertPolicy, Breakpoints, TransitionKind};
use floodlink_service::model::{Level, SiteMap, SiteRecord};

fn any_level() -> impl Strategy<Value = Level> {
    prop::sample::select(Level::ALL.to_vec())
}

fn record(lat: f64, level: Level) -> SiteRecord {
    SiteRecord {
        id: String::new(),
        name: String::new(),
        latitude: lat,
        longitude: 0.0,
        raw_score: 0.0,
        level,
        details: Map::new(),
    }
}

proptest! {
    #[test]
    fn classify_is_monotonic(a in -100.0f64..500.0, b in -100.0f64..500.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        for bands in [Breakpoints::live_default(), Breakpoints::return_period_default()] {
            prop_assert!(bands.classify(lo) <= bands.classify(hi));
        }
    }

    #[test]
    fn classify_is_total(score in any::<f64>()) {
        // Any f64, including NaN and infinities, yields a level.
        let level = Breakpoints::live_default().classify(score);
        prop_assert!(Level::ALL.contains(&level));
    }

    #[test]
    fn unchanged_levels_produce_no_transitions(levels in prop::collection::vec(any_level(), 0..20)) {
        let records: Vec<SiteRecord> = levels
            .iter()
            .enumerate()
            .map(|(i, l)| record(i as f64, *l))
            .collect();
        let map = SiteMap::from_records(&records, 4);
        let again = SiteMap::from_records(&records, 4);
        prop_assert!(diff(&map, &again, &AlertPolicy::default()).is_empty());
    }

    #[test]
    fn transitions_respect_policy(prev in any_level(), curr in any_level()) {
        let policy = AlertPolicy::default();
        let previous = vec![record(1.0, prev)];
        let current = vec![record(1.0, curr)];
        let out = diff(
            &SiteMap::from_records(&previous, 4),
            &SiteMap::from_records(&current, 4),
            &policy,
        );

        match out.first().map(|t| t.kind) {
            None => {
                let silent_up = curr > prev && !policy.notifiable.contains(curr);
                let silent_down = curr < prev && !policy.notifiable.contains(prev);
                prop_assert!(curr == prev || silent_up || silent_down);
            }
            Some(TransitionKind::Upgrade) => {
                prop_assert!(curr > prev && policy.notifiable.contains(curr));
            }
            Some(TransitionKind::Downgrade) => {
                prop_assert!(curr < prev && policy.notifiable.contains(prev));
            }
            Some(TransitionKind::New) => prop_assert!(false, "site existed in previous run"),
        }
    }
}
