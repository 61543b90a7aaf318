//! GIS feature table for the live evaluator.
//!
//! Each row is a mapped flood-prone location with a static base risk
//! (`FRisk`). Columns used: `Latitude`, `Longitude`, `FRisk`, `JOIN_ID`,
//! and optionally `ETIQUETA` as the display name.

use std::collections::HashSet;
use std::path::Path;

use crate::ingest::table::Table;
use crate::model::{FetchError, SiteKey};

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub base_risk: f64,
}

impl Feature {
    pub fn key(&self, precision: u32) -> SiteKey {
        SiteKey::from_coords(self.latitude, self.longitude, precision)
    }
}

/// Parsed feature table plus the rows that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    pub features: Vec<Feature>,
    /// `(line, reason)` for every malformed row.
    pub skipped: Vec<(usize, String)>,
}

impl FeatureSet {
    /// Features whose base risk is strictly above `threshold`, in file order.
    pub fn above_threshold(&self, threshold: f64) -> Vec<&Feature> {
        self.features.iter().filter(|f| f.base_risk > threshold).collect()
    }

    /// Keys of every feature in the table, regardless of risk. Ledger
    /// entries outside this set belong to sites no longer mapped.
    pub fn site_keys(&self, precision: u32) -> HashSet<SiteKey> {
        self.features.iter().map(|f| f.key(precision)).collect()
    }
}

pub fn load_features(path: &Path) -> Result<FeatureSet, FetchError> {
    let text = std::fs::read_to_string(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_features(&text)
}

pub fn parse_features(text: &str) -> Result<FeatureSet, FetchError> {
    let table = Table::parse(text).map_err(FetchError::Parse)?;
    table
        .require_columns(&["Latitude", "Longitude", "FRisk", "JOIN_ID"])
        .map_err(FetchError::Parse)?;

    let mut set = FeatureSet::default();
    for row in table.rows() {
        let (Some(latitude), Some(longitude)) = (row.get_f64("Latitude"), row.get_f64("Longitude"))
        else {
            set.skipped.push((row.line, "invalid coordinates".to_string()));
            continue;
        };
        let Some(base_risk) = row.get_f64("FRisk") else {
            set.skipped.push((row.line, "invalid FRisk".to_string()));
            continue;
        };
        let id = row.get("JOIN_ID").unwrap_or_default().to_string();
        let name = row
            .get("ETIQUETA")
            .map(str::to_string)
            .unwrap_or_else(|| format!("id_{}", id));

        set.features.push(Feature {
            id,
            name,
            latitude,
            longitude,
            base_risk,
        });
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
JOIN_ID,ETIQUETA,Latitude,Longitude,FRisk
101,Arroyo Culebro,40.3021,-3.7712,9.4
102,,40.3522,-3.6110,12.0
103,Ribera,40.4000,-3.7000,3.1
104,Broken,abc,-3.7000,9.9
";

    #[test]
    fn test_parses_rows_and_defaults_name() {
        let set = parse_features(SAMPLE).unwrap();
        assert_eq!(set.features.len(), 3);
        assert_eq!(set.features[0].name, "Arroyo Culebro");
        assert_eq!(set.features[1].name, "id_102");
        assert_eq!(set.skipped, vec![(5, "invalid coordinates".to_string())]);
    }

    #[test]
    fn test_threshold_filter_is_strict() {
        let set = parse_features(SAMPLE).unwrap();
        let ids: Vec<&str> = set.above_threshold(9.4).iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["102"]);
    }

    #[test]
    fn test_site_keys_cover_all_rows() {
        let set = parse_features(SAMPLE).unwrap();
        let keys = set.site_keys(4);
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&SiteKey::from_coords(40.4, -3.7, 4)));
    }

    #[test]
    fn test_missing_column_is_parse_error() {
        let result = parse_features("Latitude,Longitude\n1,2\n");
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }
}
