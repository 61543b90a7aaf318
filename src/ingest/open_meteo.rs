/// Open-Meteo Forecast API Client
///
/// Retrieves hourly precipitation, relative humidity and topsoil moisture
/// forecasts for a single coordinate and condenses them into the
/// `Indicators` consumed by the live risk model.
///
/// API Documentation: https://open-meteo.com/en/docs
///
/// Times are requested in UTC so the forecast window can be located against
/// `Utc::now()` without a timezone database.
use std::time::Duration;

use chrono::{DateTime, DurationRound, NaiveDateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::logging::{self, DataSource};
use crate::model::FetchError;
use crate::risk::Indicators;

pub const HOURLY_VARIABLES: &str = "precipitation,relative_humidity_2m,soil_moisture_0_to_7cm";

/// Upper bound of the useful volumetric soil moisture range (m³/m³);
/// readings are normalized against it.
const SOIL_SATURATION: f64 = 0.6;

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub hourly: HourlySeries,
}

/// Parallel hourly arrays. Individual hours may be `null`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HourlySeries {
    pub time: Vec<String>,
    pub precipitation: Vec<Option<f64>>,
    pub relative_humidity_2m: Vec<Option<f64>>,
    pub soil_moisture_0_to_7cm: Vec<Option<f64>>,
}

// ============================================================================
// API Client Functions
// ============================================================================

/// Request settings for forecast calls.
#[derive(Debug, Clone)]
pub struct ForecastRequest {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

pub fn build_forecast_url(base_url: &str, latitude: f64, longitude: f64) -> String {
    format!(
        "{}?latitude={}&longitude={}&hourly={}&forecast_days=2&timezone=UTC",
        base_url, latitude, longitude, HOURLY_VARIABLES
    )
}

/// Fetch the hourly forecast for one coordinate.
///
/// Timeouts and connection failures are retried up to `max_retries` total
/// attempts with a linear back-off (1.5 s × attempt). Any other failure is
/// returned immediately.
pub fn fetch_forecast(
    client: &reqwest::blocking::Client,
    request: &ForecastRequest,
    latitude: f64,
    longitude: f64,
) -> Result<ForecastResponse, FetchError> {
    let url = build_forecast_url(&request.base_url, latitude, longitude);
    let attempts = request.max_retries.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match fetch_once(client, &url, request.timeout) {
            Ok(response) => return Ok(response),
            Err(err) if err.is_retryable() => {
                logging::warn(
                    DataSource::OpenMeteo,
                    Some(&format!("{},{}", latitude, longitude)),
                    &format!("Timeout/connection (attempt {}/{}): {}", attempt, attempts, err),
                );
                last_err = Some(err);
                if attempt < attempts {
                    std::thread::sleep(Duration::from_millis(1500 * attempt as u64));
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err.unwrap_or_else(|| FetchError::Request("no attempts made".to_string())))
}

fn fetch_once(
    client: &reqwest::blocking::Client,
    url: &str,
    timeout: Duration,
) -> Result<ForecastResponse, FetchError> {
    let response = client
        .get(url)
        .header("Accept", "application/json")
        .timeout(timeout)
        .send()?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let body = response.text()?;
    parse_forecast(&body)
}

pub fn parse_forecast(body: &str) -> Result<ForecastResponse, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))
}

// ============================================================================
// Indicator Computation
// ============================================================================

/// Condense the next `hours` hours starting at the current hour into rain
/// total, mean humidity and mean normalized soil moisture.
///
/// The window starts at the first timestamp at or after `now` truncated to
/// the hour (or at the first entry if every timestamp is earlier or
/// unparseable). Missing hours count as zero and averages always divide by
/// `hours`, so a short series dampens rather than inflates the result.
pub fn compute_indicators_at(
    hourly: &HourlySeries,
    hours: usize,
    now: DateTime<Utc>,
) -> Result<Indicators, FetchError> {
    if hourly.time.is_empty() {
        return Err(FetchError::NoData("forecast has no hourly timestamps".to_string()));
    }
    if hours == 0 {
        return Ok(Indicators::default());
    }

    let hour_start = now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now);
    let start = hourly
        .time
        .iter()
        .position(|t| parse_hour(t).is_some_and(|t| t >= hour_start))
        .unwrap_or(0);

    let window = |values: &[Option<f64>]| -> Vec<f64> {
        (start..start + hours)
            .map(|i| values.get(i).copied().flatten().unwrap_or(0.0))
            .collect()
    };

    let rain: f64 = window(&hourly.precipitation).iter().sum();
    let humidity: f64 = window(&hourly.relative_humidity_2m).iter().sum::<f64>() / hours as f64;
    let soil: f64 = window(&hourly.soil_moisture_0_to_7cm)
        .iter()
        .map(|v| (v / SOIL_SATURATION).clamp(0.0, 1.0))
        .sum::<f64>()
        / hours as f64;

    Ok(Indicators {
        rain_mm: rain,
        humidity_pct: humidity,
        soil_frac: soil,
    })
}

/// Open-Meteo hourly timestamps look like `2025-03-04T06:00` (no seconds,
/// no offset) when `timezone=UTC`.
fn parse_hour(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn series(start_hour: u32, n: usize, rain: f64, rh: f64, soil: f64) -> HourlySeries {
        HourlySeries {
            time: (0..n)
                .map(|i| format!("2025-03-04T{:02}:00", start_hour as usize + i))
                .collect(),
            precipitation: vec![Some(rain); n],
            relative_humidity_2m: vec![Some(rh); n],
            soil_moisture_0_to_7cm: vec![Some(soil); n],
        }
    }

    /// 2025-03-04 06:25 UTC; the window starts at the 06:00 entry.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 6, 25, 0).unwrap()
    }

    #[test]
    fn test_window_starts_at_current_hour() {
        let mut hourly = series(0, 18, 1.0, 80.0, 0.3);
        // Make the hours before 06:00 obviously different.
        for i in 0..6 {
            hourly.precipitation[i] = Some(100.0);
        }
        let ind = compute_indicators_at(&hourly, 6, fixed_now()).unwrap();
        assert!(approx(ind.rain_mm, 6.0));
        assert!(approx(ind.humidity_pct, 80.0));
        assert!(approx(ind.soil_frac, 0.5));
    }

    #[test]
    fn test_short_series_is_padded_with_zero() {
        // Only 3 hours from 06:00 onwards, window of 6.
        let hourly = series(6, 3, 2.0, 60.0, 0.6);
        let ind = compute_indicators_at(&hourly, 6, fixed_now()).unwrap();
        assert!(approx(ind.rain_mm, 6.0));
        assert!(approx(ind.humidity_pct, 30.0));
        assert!(approx(ind.soil_frac, 0.5));
    }

    #[test]
    fn test_null_hours_count_as_zero_and_soil_is_clamped() {
        let mut hourly = series(6, 6, 1.0, 50.0, 0.9);
        hourly.precipitation[2] = None;
        let ind = compute_indicators_at(&hourly, 6, fixed_now()).unwrap();
        assert!(approx(ind.rain_mm, 5.0));
        assert!(approx(ind.soil_frac, 1.0));
    }

    #[test]
    fn test_all_times_in_past_uses_first_entry() {
        let hourly = series(0, 4, 1.0, 10.0, 0.0);
        let late = Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap();
        let ind = compute_indicators_at(&hourly, 2, late).unwrap();
        assert!(approx(ind.rain_mm, 2.0));
    }

    #[test]
    fn test_empty_series_is_no_data() {
        let result = compute_indicators_at(&HourlySeries::default(), 6, fixed_now());
        assert!(matches!(result, Err(FetchError::NoData(_))));
    }

    #[test]
    fn test_parse_forecast_payload_with_nulls() {
        let body = r#"{
            "latitude": 40.3,
            "longitude": -3.7,
            "hourly": {
                "time": ["2025-03-04T06:00", "2025-03-04T07:00"],
                "precipitation": [0.4, null],
                "relative_humidity_2m": [88, 91],
                "soil_moisture_0_to_7cm": [0.31, 0.32]
            }
        }"#;
        let parsed = parse_forecast(body).unwrap();
        assert_eq!(parsed.hourly.time.len(), 2);
        assert_eq!(parsed.hourly.precipitation, vec![Some(0.4), None]);
        assert_eq!(parsed.hourly.relative_humidity_2m[1], Some(91.0));
    }

    #[test]
    fn test_malformed_payload_is_parse_error() {
        assert!(matches!(parse_forecast("<html>"), Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_forecast_url_contains_variables() {
        let url = build_forecast_url("https://api.open-meteo.com/v1/forecast", 40.3, -3.7);
        assert!(url.starts_with("https://api.open-meteo.com/v1/forecast?latitude=40.3&longitude=-3.7"));
        assert!(url.contains("hourly=precipitation,relative_humidity_2m,soil_moisture_0_to_7cm"));
        assert!(url.ends_with("timezone=UTC"));
    }
}
