/// GloFAS river flood hotspots
///
/// A hotspot is a GloFAS reporting point whose forecast discharge exceeds a
/// return-period threshold. Hotspots arrive as a JSON array, either from a
/// local file prepared by an upstream job or from an HTTP endpoint:
///
/// ```json
/// [{"glofas_id": "ES-0012", "latitude": 40.0, "longitude": -3.7,
///   "river_name": "Tajo", "country": "ES",
///   "return_period": 5, "lead_time_days": 2}]
/// ```
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::alert::Breakpoints;
use crate::geo::{nearest_cities, City, CitySearch};
use crate::logging::{self, DataSource};
use crate::model::{FetchError, SiteRecord};
use crate::risk::{return_period_level, return_period_score};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hotspot {
    /// String or number upstream; kept verbatim.
    #[serde(default)]
    pub glofas_id: Value,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub river_name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Years.
    #[serde(default)]
    pub return_period: Option<f64>,
    #[serde(default)]
    pub lead_time_days: Option<f64>,
}

impl Hotspot {
    pub fn id(&self) -> String {
        match &self.glofas_id {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Loads hotspots from `source`, which is either an `http(s)://` URL or a
/// local file path.
pub fn load_hotspots(
    client: &reqwest::blocking::Client,
    source: &str,
    timeout: Duration,
) -> Result<Vec<Hotspot>, FetchError> {
    let body = if source.starts_with("http://") || source.starts_with("https://") {
        let response = client
            .get(source)
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }
        response.text()?
    } else {
        let path = Path::new(source);
        std::fs::read_to_string(path).map_err(|source| FetchError::Io {
            path: path.to_path_buf(),
            source,
        })?
    };
    parse_hotspots(&body)
}

/// Parses the feed. A body that is not a JSON array is an error; a single
/// malformed entry is logged and skipped.
pub fn parse_hotspots(body: &str) -> Result<Vec<Hotspot>, FetchError> {
    let entries: Vec<Value> =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(format!("hotspots: {}", e)))?;

    let mut hotspots = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let label = match entry.get("glofas_id") {
            Some(Value::String(id)) => id.clone(),
            Some(id) if !id.is_null() => id.to_string(),
            _ => format!("entry {}", i),
        };
        match serde_json::from_value::<Hotspot>(entry) {
            Ok(hotspot) => hotspots.push(hotspot),
            Err(e) => {
                let err = FetchError::Parse(format!("hotspot: {}", e));
                logging::log_fetch_failure(DataSource::GloFas, &label, "parse", &err);
            }
        }
    }
    Ok(hotspots)
}

/// Turns a hotspot into a site record: level and score from the return
/// period, name from the nearest town.
pub fn build_record(
    hotspot: &Hotspot,
    cities: &[City],
    search: CitySearch,
    bands: &Breakpoints,
) -> SiteRecord {
    let nearest = nearest_cities(hotspot.latitude, hotspot.longitude, cities, search);
    let country = hotspot.country.clone().unwrap_or_default();
    let headline_city = match nearest.first() {
        Some(city) => city.name.clone(),
        None if !country.is_empty() => country.clone(),
        None => "Location".to_string(),
    };

    let mut details = Map::new();
    details.insert("country".to_string(), json!(country));
    details.insert("headline_city".to_string(), json!(headline_city));
    details.insert(
        "river_name".to_string(),
        json!(hotspot.river_name.as_deref().unwrap_or("river")),
    );
    details.insert("return_period".to_string(), json!(hotspot.return_period));
    details.insert("lead_time_days".to_string(), json!(hotspot.lead_time_days));
    details.insert("nearest_cities".to_string(), json!(nearest));

    SiteRecord {
        id: hotspot.id(),
        name: headline_city,
        latitude: hotspot.latitude,
        longitude: hotspot.longitude,
        raw_score: return_period_score(hotspot.return_period),
        level: return_period_level(hotspot.return_period, bands),
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Level;

    fn getafe() -> City {
        City {
            name: "Getafe".to_string(),
            country_code: "ES".to_string(),
            country_name: "Spain".to_string(),
            latitude: 40.30571,
            longitude: -3.73295,
            population: 183374,
        }
    }

    fn search() -> CitySearch {
        CitySearch {
            max_distance_km: 50.0,
            top_n: 3,
        }
    }

    #[test]
    fn test_parse_accepts_numeric_ids_and_missing_fields() {
        let body = r#"[
            {"glofas_id": "ES-1", "latitude": 40.3, "longitude": -3.7,
             "river_name": "Manzanares", "country": "ES",
             "return_period": 5, "lead_time_days": 2},
            {"glofas_id": 42, "latitude": 10.0, "longitude": 20.0}
        ]"#;
        let hotspots = parse_hotspots(body).unwrap();
        assert_eq!(hotspots.len(), 2);
        assert_eq!(hotspots[0].id(), "ES-1");
        assert_eq!(hotspots[1].id(), "42");
        assert_eq!(hotspots[1].return_period, None);
    }

    #[test]
    fn test_malformed_body_is_parse_error() {
        assert!(matches!(parse_hotspots("{}"), Err(FetchError::Parse(_))));
        assert!(matches!(parse_hotspots("[{"), Err(FetchError::Parse(_))));
    }

    #[test]
    fn test_malformed_entry_is_skipped() {
        let body = r#"[
            {"glofas_id": "ok", "latitude": 40.0, "longitude": -3.7, "return_period": 5},
            {"glofas_id": "bad", "latitude": null, "longitude": -3.0},
            "not an object",
            {"glofas_id": 7, "latitude": 41.0, "longitude": -4.0}
        ]"#;
        let hotspots = parse_hotspots(body).unwrap();
        let ids: Vec<String> = hotspots.iter().map(Hotspot::id).collect();
        assert_eq!(ids, vec!["ok", "7"]);
        assert_eq!(hotspots[0].return_period, Some(5.0));
    }

    #[test]
    fn test_record_uses_nearest_city_as_headline() {
        let hotspot = parse_hotspots(
            r#"[{"glofas_id": "ES-1", "latitude": 40.31, "longitude": -3.72,
                 "river_name": "Manzanares", "country": "ES",
                 "return_period": 20, "lead_time_days": 3}]"#,
        )
        .unwrap()
        .remove(0);
        let record = build_record(&hotspot, &[getafe()], search(), &Breakpoints::return_period_default());

        assert_eq!(record.name, "Getafe");
        assert_eq!(record.level, Level::Extreme);
        assert_eq!(record.raw_score, 200.0);
        assert_eq!(record.details["river_name"], "Manzanares");
        assert_eq!(record.details["nearest_cities"][0]["country"], "Spain");
        assert_eq!(record.details["lead_time_days"], 3.0);
    }

    #[test]
    fn test_headline_falls_back_to_country_then_location() {
        let bands = Breakpoints::return_period_default();
        let mut hotspot = Hotspot {
            glofas_id: Value::Null,
            latitude: 0.0,
            longitude: 0.0,
            river_name: None,
            country: Some("GH".to_string()),
            return_period: None,
            lead_time_days: None,
        };
        let record = build_record(&hotspot, &[getafe()], search(), &bands);
        assert_eq!(record.name, "GH");
        assert_eq!(record.level, Level::Medium);
        assert_eq!(record.raw_score, 20.0);
        assert_eq!(record.details["river_name"], "river");
        assert!(record.details["return_period"].is_null());

        hotspot.country = None;
        assert_eq!(build_record(&hotspot, &[], search(), &bands).name, "Location");
    }
}
