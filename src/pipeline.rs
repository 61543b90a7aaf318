//! Evaluators: turn source data into an `Evaluation` for the alert engine.
//!
//! Per-site fetch failures are logged and the site skipped. Only failing to
//! read the static inputs (feature table, hotspot feed, gazetteer) aborts.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Map};

use crate::alert::Breakpoints;
use crate::config::{GlofasConfig, LiveConfig};
use crate::engine::Evaluation;
use crate::geo::{load_cities, CitySearch};
use crate::ingest::features::{load_features, Feature};
use crate::ingest::glofas::{build_record, load_hotspots};
use crate::ingest::open_meteo::{compute_indicators_at, fetch_forecast, ForecastRequest};
use crate::logging::{self, DataSource};
use crate::model::{FetchError, SiteRecord};
use crate::risk::{round_to, DynamicRisk, Indicators};

pub const LIVE_SOURCE_LABEL: &str = "Open-Meteo";
pub const GLOFAS_SOURCE_LABEL: &str = "GloFAS";

// ---------------------------------------------------------------------------
// Live Open-Meteo evaluator
// ---------------------------------------------------------------------------

/// Builds the record for one scored feature, with the forecast inputs and
/// multipliers kept as descriptive fields for tuning.
pub fn build_live_record(
    feature: &Feature,
    indicators: &Indicators,
    risk: &DynamicRisk,
    forecast_hours: usize,
    bands: &Breakpoints,
) -> SiteRecord {
    let mut details = Map::new();
    details.insert("base_risk".to_string(), json!(round_to(feature.base_risk, 2)));
    details.insert(
        format!("rain_{}h_mm", forecast_hours),
        json!(round_to(indicators.rain_mm, 2)),
    );
    details.insert("humidity_avg".to_string(), json!(round_to(indicators.humidity_pct, 1)));
    details.insert("soil_moisture_avg".to_string(), json!(round_to(indicators.soil_frac, 3)));
    details.insert("rain_mult".to_string(), json!(round_to(risk.rain_mult, 3)));
    details.insert("soil_mult".to_string(), json!(round_to(risk.soil_mult, 3)));
    details.insert("humidity_mult".to_string(), json!(round_to(risk.humidity_mult, 3)));

    SiteRecord {
        id: feature.id.clone(),
        name: feature.name.clone(),
        latitude: feature.latitude,
        longitude: feature.longitude,
        raw_score: risk.raw_score,
        level: risk.level(bands),
        details,
    }
}

/// Scores every feature above the configured base-risk threshold against
/// the hourly forecast.
pub fn evaluate_live(
    config: &LiveConfig,
    bands: &Breakpoints,
    key_precision: u32,
    client: &reqwest::blocking::Client,
    now: DateTime<Utc>,
) -> Result<Evaluation, FetchError> {
    let src = DataSource::OpenMeteo;
    let features = load_features(&config.features_csv)?;
    for (line, reason) in &features.skipped {
        logging::warn(src, None, &format!("Skipping feature row {}: {}", line, reason));
    }

    let candidates = features.above_threshold(config.risk_threshold);
    logging::info(
        src,
        None,
        &format!(
            "Evaluating {} of {} features above base risk {} ({}-hour window)",
            candidates.len(),
            features.features.len(),
            config.risk_threshold,
            config.forecast_hours
        ),
    );

    let request = ForecastRequest {
        base_url: config.api_base_url.clone(),
        timeout: Duration::from_secs(config.request_timeout_secs),
        max_retries: config.max_retries,
    };
    let pause = Duration::from_millis(config.sleep_between_calls_ms);

    let mut records = Vec::with_capacity(candidates.len());
    let mut fetch_failures = 0usize;
    for (i, feature) in candidates.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            thread::sleep(pause);
        }

        let indicators = fetch_forecast(client, &request, feature.latitude, feature.longitude)
            .and_then(|forecast| compute_indicators_at(&forecast.hourly, config.forecast_hours, now));
        let indicators = match indicators {
            Ok(ind) => ind,
            Err(e) => {
                fetch_failures += 1;
                logging::log_fetch_failure(src, &feature.id, "forecast", &e);
                continue;
            }
        };

        let risk = config.risk.dynamic_risk(feature.base_risk, &indicators);
        records.push(build_live_record(feature, &indicators, &risk, config.forecast_hours, bands));
    }

    if fetch_failures > 0 {
        logging::warn(
            src,
            None,
            &format!("{} of {} forecasts could not be fetched", fetch_failures, candidates.len()),
        );
    }

    Ok(Evaluation {
        source: LIVE_SOURCE_LABEL.to_string(),
        forecast_window_hours: u32::try_from(config.forecast_hours).ok(),
        records,
        source_sites: Some(features.site_keys(key_precision)),
    })
}

// ---------------------------------------------------------------------------
// GloFAS hotspot evaluator
// ---------------------------------------------------------------------------

pub fn evaluate_glofas(
    config: &GlofasConfig,
    bands: &Breakpoints,
    key_precision: u32,
    client: &reqwest::blocking::Client,
) -> Result<Evaluation, FetchError> {
    let hotspots = load_hotspots(
        client,
        &config.hotspots,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    logging::info(
        DataSource::GloFas,
        None,
        &format!("Retrieved {} GloFAS hotspots", hotspots.len()),
    );

    let cities = load_cities(&config.cities_csv)?;
    logging::debug(
        DataSource::Gazetteer,
        None,
        &format!("Loaded {} cities from {}", cities.len(), config.cities_csv.display()),
    );

    let search = CitySearch {
        max_distance_km: config.max_city_distance_km,
        top_n: config.top_nearest_cities,
    };
    let records: Vec<SiteRecord> = hotspots
        .iter()
        .map(|h| build_record(h, &cities, search, bands))
        .collect();
    let source_sites = records.iter().map(|r| r.key(key_precision)).collect();

    Ok(Evaluation {
        source: GLOFAS_SOURCE_LABEL.to_string(),
        forecast_window_hours: None,
        records,
        source_sites: Some(source_sites),
    })
}
