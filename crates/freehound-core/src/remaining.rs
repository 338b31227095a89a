//! Time/window classification for promotion end times.
//!
//! All remaining-time math runs in a fixed UTC+8 reference zone so behavior
//! does not depend on where the process is deployed.

use chrono::{FixedOffset, NaiveDateTime, Utc};
use serde::Serialize;

/// Current wall-clock time in the UTC+8 reference zone.
pub fn reference_now() -> NaiveDateTime {
    let offset = FixedOffset::east_opt(8 * 3600).expect("static offset is valid");
    Utc::now().with_timezone(&offset).naive_local()
}

/// Severity bucket for the remaining promotional window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowStatus {
    Permanent,
    Expired,
    Safe,
    Warning,
    Danger,
    Critical,
}

/// Derived remaining-time descriptor for a promotion window.
#[derive(Debug, Clone, Serialize)]
pub struct Remaining {
    pub display: String,
    pub display_en: String,
    pub status: WindowStatus,
    pub color: &'static str,
    /// Fractional hours left; 0 when expired, +∞ when permanent.
    pub hours: f64,
    pub timestamp: Option<String>,
}

impl Remaining {
    pub fn minutes(&self) -> f64 {
        self.hours * 60.0
    }
}

/// Classify an optional promotion end time against `now`.
///
/// Pure and total: never fails, never blocks. No end time means the
/// promotion is permanent.
pub fn classify_at(end: Option<NaiveDateTime>, now: NaiveDateTime) -> Remaining {
    let end = match end {
        Some(end) => end,
        None => {
            return Remaining {
                display: "永久免费".to_string(),
                display_en: "Permanent".to_string(),
                status: WindowStatus::Permanent,
                color: "green",
                hours: f64::INFINITY,
                timestamp: None,
            }
        }
    };

    let timestamp = Some(end.format("%Y-%m-%dT%H:%M:%S").to_string());
    let total_seconds = (end - now).num_seconds();
    if total_seconds <= 0 {
        return Remaining {
            display: "已过期".to_string(),
            display_en: "Expired".to_string(),
            status: WindowStatus::Expired,
            color: "red",
            hours: 0.0,
            timestamp,
        };
    }

    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let total_hours = hours as f64 + minutes as f64 / 60.0;

    let (display, display_en) = if hours >= 24 {
        let days = hours / 24;
        let rem = hours % 24;
        (format!("{days}天 {rem}小时"), format!("{days}d {rem}h"))
    } else {
        (format!("{hours}小时 {minutes}分"), format!("{hours}h {minutes}m"))
    };

    // Bands partition [0h, ∞): exact 1.0/2.0/6.0 belong to the higher band.
    let (color, status) = if total_hours >= 6.0 {
        ("green", WindowStatus::Safe)
    } else if total_hours >= 2.0 {
        ("yellow", WindowStatus::Warning)
    } else if total_hours >= 1.0 {
        ("orange", WindowStatus::Danger)
    } else {
        ("red", WindowStatus::Critical)
    };

    Remaining {
        display,
        display_en,
        status,
        color,
        hours: total_hours,
        timestamp,
    }
}

/// Parse a tracker timestamp, trying the known wire formats in order.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%SZ",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
