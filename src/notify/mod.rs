//! Outbound notification channels.
//!
//! The alert engine hands every permitted transition to a `Notifier`. What
//! "sending" means is the channel's business: `LogNotifier` only writes the
//! rendered message to the log (dry run), `WebhookNotifier` POSTs it as
//! JSON to an HTTP endpoint (chat bridge, social media relay, pager...).

use std::time::Duration;

use serde::Serialize;

use crate::alert::TransitionKind;
use crate::logging::{self, DataSource};
use crate::model::{Level, NotifyError, SiteRecord};

/// One transition worth telling people about.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification<'a> {
    pub kind: TransitionKind,
    pub record: &'a SiteRecord,
    pub previous_level: Option<Level>,
}

pub trait Notifier {
    fn send(&mut self, notification: &Notification<'_>) -> Result<(), NotifyError>;
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn send(&mut self, notification: &Notification<'_>) -> Result<(), NotifyError> {
        (**self).send(notification)
    }
}

// ---------------------------------------------------------------------------
// Message rendering
// ---------------------------------------------------------------------------

pub fn level_marker(level: Level) -> &'static str {
    match level {
        Level::None | Level::Low => "⚪",
        Level::Medium => "🟢",
        Level::High => "🟠",
        Level::Extreme => "🔴",
    }
}

/// Renders the human-readable message for a notification.
///
/// Records carrying a `river_name` are GloFAS hotspots and get the river
/// block; records carrying a `rain_<N>h_mm` field are live forecasts and
/// get the weather block.
pub fn format_message(n: &Notification<'_>) -> String {
    let r = n.record;
    let is_river = r.details.contains_key("river_name");
    let marker = level_marker(r.level);

    let mut text = if is_river {
        let headline = r.detail_str("headline_city").unwrap_or_else(|| r.name.clone());
        format!("{} River flood risk near {}.\n\n", marker, headline)
    } else {
        format!("{} Flood risk at {}.\n\n", marker, r.name)
    };

    let rain = rain_window(r);
    if let Some((hours, _)) = &rain {
        text.push_str(&format!("Time: {} hours\n", hours));
    }
    text.push_str(&format!("{} risk ({})\n", r.level, n.kind));
    if let Some(prev) = n.previous_level {
        text.push_str(&format!("Previously: {}\n", prev));
    }

    if is_river {
        text.push_str(&river_block(r));
        text.push_str(&format!("Location ({:.2}, {:.2})\n", r.latitude, r.longitude));
    } else {
        text.push_str(&format!("Location ({:.2}, {:.2})\n", r.latitude, r.longitude));
        if let Some((_, mm)) = rain {
            text.push_str(&format!("\nRain: {} mm\n", mm));
            if let Some(soil) = r.details.get("soil_moisture_avg").and_then(|v| v.as_f64()) {
                text.push_str(&format!("Soil moisture: {:.2}\n", soil));
            }
            if let Some(rh) = r.detail_str("humidity_avg") {
                text.push_str(&format!("Humidity: {}%\n", rh));
            }
        }
    }
    text
}

/// `(hours, rain)` from the first `rain_<N>h_mm` field.
fn rain_window(r: &SiteRecord) -> Option<(String, String)> {
    r.details.iter().find_map(|(key, value)| {
        let hours = key.strip_prefix("rain_")?.strip_suffix("h_mm")?;
        if hours.is_empty() || !hours.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some((hours.to_string(), value.to_string()))
    })
}

fn river_block(r: &SiteRecord) -> String {
    let river = r.detail_str("river_name").unwrap_or_else(|| "river".to_string());
    let rp_text = match r.details.get("return_period").and_then(|v| v.as_f64()) {
        Some(rp) if rp > 0.0 => format!("≥{}-year event", rp),
        _ => "flood event".to_string(),
    };
    let lead_text = match r.details.get("lead_time_days").and_then(|v| v.as_f64()) {
        Some(days) => format!("in ~{} days", days),
        None => "in coming days".to_string(),
    };

    let towns: Vec<String> = r
        .details
        .get("nearest_cities")
        .and_then(|v| v.as_array())
        .map(|cities| {
            cities
                .iter()
                .filter_map(|c| {
                    let name = c.get("name")?.as_str()?;
                    let km = c.get("distance_km")?.as_f64()?;
                    Some(format!("{} ({:.0} km)", name, km))
                })
                .collect()
        })
        .unwrap_or_default();
    let towns = if towns.is_empty() {
        "No major towns within range".to_string()
    } else {
        towns.join("; ")
    };

    format!(
        "River: {} ({} {})\nNearest towns: {}\n",
        river, rp_text, lead_text, towns
    )
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// Dry-run channel: logs what would have been sent.
#[derive(Debug, Default)]
pub struct LogNotifier {
    pub sent: usize,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for LogNotifier {
    fn send(&mut self, notification: &Notification<'_>) -> Result<(), NotifyError> {
        logging::info(
            DataSource::Notifier,
            Some(&notification.record.id),
            &format!("DRY RUN (notification suppressed):\n{}", format_message(notification)),
        );
        self.sent += 1;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: String,
    kind: TransitionKind,
    level: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_level: Option<Level>,
    site: &'a SiteRecord,
}

/// Posts each notification as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(WebhookNotifier {
            client,
            url: url.to_string(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn send(&mut self, notification: &Notification<'_>) -> Result<(), NotifyError> {
        let payload = WebhookPayload {
            text: format_message(notification),
            kind: notification.kind,
            level: notification.record.level,
            previous_level: notification.previous_level,
            site: notification.record,
        };
        let response = self.client.post(&self.url).json(&payload).send()?;
        if !response.status().is_success() {
            return Err(NotifyError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
