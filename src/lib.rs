//! FloodLink: scheduled flood-risk evaluation with level-change alerting.
//!
//! Two evaluators score monitored sites each run (a live rainfall-weighted
//! model fed by Open-Meteo forecasts, and GloFAS river flood hotspots). The
//! shared alert core detects level transitions against the previous run,
//! notifies them once, and persists the new state.

pub mod alert;
pub mod config;
pub mod engine;
pub mod geo;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod notify;
pub mod pipeline;
pub mod risk;
pub mod store;
