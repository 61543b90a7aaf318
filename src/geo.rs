//! Gazetteer lookups: great-circle distance and nearest populated places.
//!
//! The city list is the GeoNames `cities1000` export (every place with a
//! population of at least 1000), used to give GloFAS hotspots a
//! human-readable headline.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ingest::table::Table;
use crate::logging::{self, DataSource};
use crate::model::FetchError;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub name: String,
    pub country_code: String,
    pub country_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub population: u64,
}

/// A city near a site, as stored in the site's descriptive fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyCity {
    pub name: String,
    pub country: String,
    pub population: u64,
    pub distance_km: f64,
}

/// Search radius and result count for `nearest_cities`.
#[derive(Debug, Clone, Copy)]
pub struct CitySearch {
    pub max_distance_km: f64,
    pub top_n: usize,
}

pub fn load_cities(path: &Path) -> Result<Vec<City>, FetchError> {
    let text = std::fs::read_to_string(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_cities(&text)
}

/// Parses the gazetteer. Rows without a name or usable coordinates are
/// skipped; a missing population counts as zero.
pub fn parse_cities(text: &str) -> Result<Vec<City>, FetchError> {
    let table = Table::parse(text).map_err(FetchError::Parse)?;
    table
        .require_columns(&["Name", "Latitude", "Longitude"])
        .map_err(FetchError::Parse)?;

    let mut skipped = 0usize;
    let mut cities = Vec::with_capacity(table.len());
    for row in table.rows() {
        let (Some(name), Some(latitude), Some(longitude)) =
            (row.get("Name"), row.get_f64("Latitude"), row.get_f64("Longitude"))
        else {
            skipped += 1;
            continue;
        };
        cities.push(City {
            name: name.to_string(),
            country_code: row.get("Country Code").unwrap_or_default().to_string(),
            country_name: row.get("Country name EN").unwrap_or_default().to_string(),
            latitude,
            longitude,
            population: row
                .get_f64("Population")
                .map(|p| p.max(0.0) as u64)
                .unwrap_or(0),
        });
    }
    if skipped > 0 {
        logging::debug(
            DataSource::Gazetteer,
            None,
            &format!("Skipped {} malformed gazetteer rows", skipped),
        );
    }
    Ok(cities)
}

/// Up to `top_n` cities within `max_distance_km` of the point, nearest first.
pub fn nearest_cities(latitude: f64, longitude: f64, cities: &[City], search: CitySearch) -> Vec<NearbyCity> {
    let mut within: Vec<(f64, &City)> = cities
        .iter()
        .map(|c| (haversine_km(latitude, longitude, c.latitude, c.longitude), c))
        .filter(|(d, _)| *d <= search.max_distance_km)
        .collect();
    within.sort_by(|a, b| a.0.total_cmp(&b.0));

    within
        .into_iter()
        .take(search.top_n)
        .map(|(distance_km, city)| NearbyCity {
            name: city.name.clone(),
            country: city.country_name.clone(),
            population: city.population,
            distance_km,
        })
        .collect()
}
