//! Dynamic flood risk scoring.
//!
//! The live evaluator scales each feature's static GIS base risk by the
//! forecast: rainfall drives the score linearly and without bound, while
//! soil saturation and humidity act as bounded amplifiers. The GloFAS
//! evaluator scores hotspots by forecast return period instead.

use serde::Deserialize;

use crate::alert::Breakpoints;
use crate::model::Level;

/// Unit-aware constants of the linear risk model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskTunables {
    /// Rainfall that yields a 1.0× rain multiplier, in mm.
    pub rain_unit_mm: f64,
    /// Soil multiplier at a fully dry (0.0) normalized soil moisture.
    pub soil_min_mult: f64,
    /// Soil multiplier at a saturated (1.0) normalized soil moisture.
    pub soil_max_mult: f64,
    /// Humidity multiplier at 0 % RH.
    pub hum_min_mult: f64,
    /// Humidity multiplier at 100 % RH.
    pub hum_max_mult: f64,
    /// Rainfall below this scores zero (0.0 keeps strict linearity).
    pub rain_cutoff_mm: f64,
}

impl Default for RiskTunables {
    fn default() -> Self {
        RiskTunables {
            rain_unit_mm: 100.0,
            soil_min_mult: 0.95,
            soil_max_mult: 1.8,
            hum_min_mult: 1.0,
            hum_max_mult: 1.05,
            rain_cutoff_mm: 0.0,
        }
    }
}

/// Forecast indicators for one site over the configured window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Indicators {
    /// Total precipitation, mm.
    pub rain_mm: f64,
    /// Mean relative humidity, %.
    pub humidity_pct: f64,
    /// Mean soil moisture normalized to [0, 1].
    pub soil_frac: f64,
}

/// Output of the live risk model, multipliers kept for tuning diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicRisk {
    /// Unrounded product; levels are classified from this.
    pub score: f64,
    /// `score` rounded to three decimals, the value persisted per site.
    pub raw_score: f64,
    pub rain_mult: f64,
    pub soil_mult: f64,
    pub humidity_mult: f64,
}

impl RiskTunables {
    pub fn rainfall_multiplier(&self, rain_mm: f64) -> f64 {
        if self.rain_unit_mm <= 0.0 {
            return 0.0;
        }
        (rain_mm / self.rain_unit_mm).max(0.0)
    }

    pub fn soil_multiplier(&self, soil_frac: f64) -> f64 {
        let s = soil_frac.clamp(0.0, 1.0);
        self.soil_min_mult + s * (self.soil_max_mult - self.soil_min_mult)
    }

    pub fn humidity_multiplier(&self, humidity_pct: f64) -> f64 {
        let rh = humidity_pct.clamp(0.0, 100.0);
        self.hum_min_mult + (rh / 100.0) * (self.hum_max_mult - self.hum_min_mult)
    }

    /// Scores a site: `max(0, base) × rain × soil × humidity`. Rain below the
    /// cutoff short-circuits to zero.
    pub fn dynamic_risk(&self, base_risk: f64, ind: &Indicators) -> DynamicRisk {
        if ind.rain_mm < self.rain_cutoff_mm {
            return DynamicRisk {
                score: 0.0,
                raw_score: 0.0,
                rain_mult: 0.0,
                soil_mult: self.soil_multiplier(0.0),
                humidity_mult: self.humidity_multiplier(0.0),
            };
        }

        let rain_mult = self.rainfall_multiplier(ind.rain_mm);
        let soil_mult = self.soil_multiplier(ind.soil_frac);
        let humidity_mult = self.humidity_multiplier(ind.humidity_pct);
        let raw = base_risk.max(0.0) * rain_mult * soil_mult * humidity_mult;

        DynamicRisk {
            score: raw,
            raw_score: round_to(raw, 3),
            rain_mult,
            soil_mult,
            humidity_mult,
        }
    }
}

impl DynamicRisk {
    /// Level from the unrounded score, so a score just under a band edge
    /// stays below it even when its stored value rounds up.
    pub fn level(&self, bands: &Breakpoints) -> Level {
        bands.classify(self.score)
    }
}

/// Level of a GloFAS hotspot from its forecast return period in years.
/// Unknown return periods are treated as Medium.
pub fn return_period_level(return_period: Option<f64>, bands: &Breakpoints) -> Level {
    match return_period {
        Some(rp) => bands.classify(rp),
        None => Level::Medium,
    }
}

/// Scalar score recorded for a hotspot: ten points per return-period year,
/// defaulting to a 2-year event.
pub fn return_period_score(return_period: Option<f64>) -> f64 {
    return_period.unwrap_or(2.0) * 10.0
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
