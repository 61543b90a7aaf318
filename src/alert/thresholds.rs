//! Risk score classification.
//!
//! Maps a raw numeric score onto the discrete `Level` scale using an ordered
//! breakpoint table. The same classifier serves both evaluators; only the
//! table differs (rainfall-weighted score bands for the live evaluator,
//! return-period bands for GloFAS hotspots).

use crate::model::Level;

/// Ordered breakpoint table.
///
/// Each band is `(threshold, level)` covering `[previous_threshold, threshold)`.
/// Scores at or above the last threshold map to `top`. When `zero_level` is
/// set, every score `<= 0` maps to it regardless of the bands.
#[derive(Debug, Clone, PartialEq)]
pub struct Breakpoints {
    bands: Vec<(f64, Level)>,
    top: Level,
    zero_level: Option<Level>,
}

impl Breakpoints {
    /// Builds a validated table.
    ///
    /// Thresholds must be finite and strictly increasing, levels must never
    /// decrease from one band to the next, and `top` must not sit below the
    /// last band.
    pub fn new(
        bands: Vec<(f64, Level)>,
        top: Level,
        zero_level: Option<Level>,
    ) -> Result<Self, String> {
        for (threshold, _) in &bands {
            if !threshold.is_finite() {
                return Err(format!("breakpoint threshold {} is not finite", threshold));
            }
        }
        for pair in bands.windows(2) {
            let ((t0, l0), (t1, l1)) = (pair[0], pair[1]);
            if t1 <= t0 {
                return Err(format!(
                    "breakpoint thresholds must be strictly increasing ({} then {})",
                    t0, t1
                ));
            }
            if l1 < l0 {
                return Err(format!("breakpoint levels must not decrease ({} then {})", l0, l1));
            }
        }
        if let Some((_, last)) = bands.last() {
            if top < *last {
                return Err(format!("top level {} is below the last band level {}", top, last));
            }
        }
        if let (Some(zero), Some((_, first))) = (zero_level, bands.first()) {
            if zero > *first {
                return Err(format!(
                    "zero level {} is above the lowest band level {}",
                    zero, first
                ));
            }
        }
        Ok(Breakpoints {
            bands,
            top,
            zero_level,
        })
    }

    /// Default bands for the rainfall-weighted live score:
    /// `0 → None`, `(0, 5) → Low`, `[5, 15) → Medium`, `[15, 35) → High`,
    /// `>= 35 → Extreme`.
    pub fn live_default() -> Self {
        Breakpoints {
            bands: vec![(5.0, Level::Low), (15.0, Level::Medium), (35.0, Level::High)],
            top: Level::Extreme,
            zero_level: Some(Level::None),
        }
    }

    /// Default return-period bands for GloFAS hotspots (years):
    /// `< 2 → Low`, `[2, 5) → Medium`, `[5, 20) → High`, `>= 20 → Extreme`.
    pub fn return_period_default() -> Self {
        Breakpoints {
            bands: vec![(2.0, Level::Low), (5.0, Level::Medium), (20.0, Level::High)],
            top: Level::Extreme,
            zero_level: None,
        }
    }

    /// Classifies a score. Total: never panics, NaN maps to the lowest level.
    pub fn classify(&self, score: f64) -> Level {
        if score.is_nan() {
            return self.lowest();
        }
        if let Some(zero) = self.zero_level {
            if score <= 0.0 {
                return zero;
            }
        }
        self.bands
            .iter()
            .find(|(threshold, _)| score < *threshold)
            .map(|(_, level)| *level)
            .unwrap_or(self.top)
    }

    fn lowest(&self) -> Level {
        self.zero_level
            .or_else(|| self.bands.first().map(|(_, level)| *level))
            .unwrap_or(self.top)
    }

    pub fn bands(&self) -> &[(f64, Level)] {
        &self.bands
    }

    pub fn top(&self) -> Level {
        self.top
    }

    pub fn zero_level(&self) -> Option<Level> {
        self.zero_level
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
