//! Service configuration.
//!
//! Tunables live in a TOML file (`floodlink.toml` by default); secrets and
//! deployment switches come from the environment, loaded through `.env` when
//! present. A missing config file means "all defaults".
//!
//! The parsed file is resolved once per run into immutable settings
//! (`AlertSettings`, `StoreSettings`) that are handed to each component.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::alert::{AlertPolicy, Breakpoints};
use crate::model::{Level, LevelSet, DEFAULT_KEY_PRECISION};
use crate::risk::RiskTunables;

pub const DEFAULT_CONFIG_PATH: &str = "floodlink.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// File layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub notifier: NotifierConfig,
    pub live: LiveConfig,
    pub glofas: GlofasConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifierConfig {
    /// `false` is a dry run: messages are logged, never sent.
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub min_seconds_between: u64,
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        NotifierConfig {
            enabled: false,
            webhook_url: None,
            min_seconds_between: 30,
            timeout_secs: 10,
        }
    }
}

/// Live Open-Meteo evaluator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LiveConfig {
    pub features_csv: PathBuf,
    /// Only features with a base risk strictly above this are evaluated.
    pub risk_threshold: f64,
    pub forecast_hours: usize,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub sleep_between_calls_ms: u64,
    pub risk: RiskTunables,
    pub alerts: AlertsConfig,
    pub store: StoreConfig,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            features_csv: PathBuf::from("madrid_features.csv"),
            risk_threshold: 8.5,
            forecast_hours: 6,
            api_base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            request_timeout_secs: 5,
            max_retries: 1,
            sleep_between_calls_ms: 1000,
            risk: RiskTunables::default(),
            alerts: AlertsConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// GloFAS hotspot evaluator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlofasConfig {
    /// Local JSON file or http(s) URL returning the hotspot list.
    pub hotspots: String,
    pub cities_csv: PathBuf,
    pub max_city_distance_km: f64,
    pub top_nearest_cities: usize,
    pub request_timeout_secs: u64,
    pub alerts: AlertsConfig,
    pub store: StoreConfig,
}

impl Default for GlofasConfig {
    fn default() -> Self {
        GlofasConfig {
            hotspots: "glofas_hotspots.json".to_string(),
            cities_csv: PathBuf::from("cities1000.csv"),
            max_city_distance_km: 50.0,
            top_nearest_cities: 3,
            request_timeout_secs: 30,
            alerts: AlertsConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Alert policy overrides. Unset fields fall back to the evaluator's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertsConfig {
    pub breakpoints: Option<Vec<(f64, Level)>>,
    pub top_level: Option<Level>,
    pub zero_level: Option<Level>,
    pub notifiable_levels: Option<Vec<Level>>,
    pub alert_on_upgrades: Option<bool>,
    pub alert_on_downgrades: Option<bool>,
    pub key_precision: Option<u32>,
    pub cleanup_ledger: Option<bool>,
}

/// State file overrides. Unset fields fall back to the evaluator's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub snapshot_path: Option<PathBuf>,
    pub ledger_path: Option<PathBuf>,
    pub history: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved settings
// ---------------------------------------------------------------------------

/// Everything the alert core needs, fixed for the duration of a run.
#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub breakpoints: Breakpoints,
    pub policy: AlertPolicy,
    pub key_precision: u32,
    /// Drop ledger entries for sites missing from the current source data.
    pub cleanup_ledger: bool,
}

impl AlertSettings {
    pub fn live_default() -> Self {
        AlertSettings {
            breakpoints: Breakpoints::live_default(),
            policy: AlertPolicy::default(),
            key_precision: DEFAULT_KEY_PRECISION,
            cleanup_ledger: true,
        }
    }

    pub fn glofas_default() -> Self {
        AlertSettings {
            breakpoints: Breakpoints::return_period_default(),
            policy: AlertPolicy::default(),
            key_precision: DEFAULT_KEY_PRECISION,
            cleanup_ledger: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    pub snapshot_path: PathBuf,
    pub ledger_path: PathBuf,
    pub history: usize,
}

impl AlertsConfig {
    pub fn resolve(&self, defaults: AlertSettings) -> Result<AlertSettings, ConfigError> {
        let breakpoints = if self.breakpoints.is_some()
            || self.top_level.is_some()
            || self.zero_level.is_some()
        {
            let bands = self
                .breakpoints
                .clone()
                .unwrap_or_else(|| defaults.breakpoints.bands().to_vec());
            let top = self.top_level.unwrap_or(defaults.breakpoints.top());
            let zero = self.zero_level.or(defaults.breakpoints.zero_level());
            Breakpoints::new(bands, top, zero).map_err(ConfigError::Invalid)?
        } else {
            defaults.breakpoints
        };

        let notifiable = match &self.notifiable_levels {
            Some(levels) => {
                let set: LevelSet = levels.iter().copied().collect();
                if set.is_empty() {
                    return Err(ConfigError::Invalid(
                        "notifiable_levels must name at least one level".to_string(),
                    ));
                }
                set
            }
            None => defaults.policy.notifiable,
        };

        let key_precision = self.key_precision.unwrap_or(defaults.key_precision);
        if key_precision > 9 {
            return Err(ConfigError::Invalid(format!(
                "key_precision {} is out of range (0-9)",
                key_precision
            )));
        }

        Ok(AlertSettings {
            breakpoints,
            policy: AlertPolicy {
                notifiable,
                alert_on_upgrades: self
                    .alert_on_upgrades
                    .unwrap_or(defaults.policy.alert_on_upgrades),
                alert_on_downgrades: self
                    .alert_on_downgrades
                    .unwrap_or(defaults.policy.alert_on_downgrades),
            },
            key_precision,
            cleanup_ledger: self.cleanup_ledger.unwrap_or(defaults.cleanup_ledger),
        })
    }
}

impl StoreConfig {
    pub fn resolve(&self, defaults: StoreSettings) -> StoreSettings {
        StoreSettings {
            snapshot_path: self.snapshot_path.clone().unwrap_or(defaults.snapshot_path),
            ledger_path: self.ledger_path.clone().unwrap_or(defaults.ledger_path),
            history: self.history.unwrap_or(defaults.history),
        }
    }
}

impl LiveConfig {
    pub fn alert_settings(&self) -> Result<AlertSettings, ConfigError> {
        self.alerts.resolve(AlertSettings::live_default())
    }

    pub fn store_settings(&self) -> StoreSettings {
        self.store.resolve(StoreSettings {
            snapshot_path: PathBuf::from("alerts_comparison.json"),
            ledger_path: PathBuf::from("tweeted_alerts.json"),
            history: 5,
        })
    }
}

impl GlofasConfig {
    pub fn alert_settings(&self) -> Result<AlertSettings, ConfigError> {
        self.alerts.resolve(AlertSettings::glofas_default())
    }

    pub fn store_settings(&self) -> StoreSettings {
        self.store.resolve(StoreSettings {
            snapshot_path: PathBuf::from("glofas_alerts_comparison.json"),
            ledger_path: PathBuf::from("glofas_tweeted_alerts.json"),
            history: 5,
        })
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses a TOML config string.
pub fn parse_config(text: &str, path: &Path) -> Result<FileConfig, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads `path` (missing file → defaults), then applies environment overrides.
///
/// Environment:
/// - `NOTIFICATIONS_ENABLED`: `true`/`false`, overrides `[notifier].enabled`
/// - `FLOODLINK_WEBHOOK_URL`: overrides `[notifier].webhook_url`
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    dotenv::dotenv().ok();

    let mut config = match std::fs::read_to_string(path) {
        Ok(text) => parse_config(&text, path)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileConfig::default(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    config.apply_env(
        std::env::var("NOTIFICATIONS_ENABLED").ok().as_deref(),
        std::env::var("FLOODLINK_WEBHOOK_URL").ok().as_deref(),
    );
    Ok(config)
}

impl FileConfig {
    fn apply_env(&mut self, enabled: Option<&str>, webhook_url: Option<&str>) {
        if let Some(flag) = enabled {
            self.notifier.enabled = flag.trim().eq_ignore_ascii_case("true");
        }
        if let Some(url) = webhook_url.filter(|u| !u.trim().is_empty()) {
            self.notifier.webhook_url = Some(url.trim().to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
