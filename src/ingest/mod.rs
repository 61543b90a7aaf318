//! Source data readers.
//!
//! Everything here turns an external input (GIS table, forecast API,
//! hotspot feed) into plain Rust values. No alerting decisions are made at
//! this layer.

pub mod features;
pub mod glofas;
pub mod open_meteo;
pub mod table;
