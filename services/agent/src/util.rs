//! Small shared helpers.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local};

/// Current wall-clock time as fractional seconds since the Unix epoch.
///
/// All persisted timestamps use this representation.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Render an epoch timestamp for log messages.
pub fn friendly_time(timestamp: f64) -> String {
    match DateTime::from_timestamp(timestamp as i64, 0) {
        Some(utc) => utc.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("{timestamp}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_recent() {
        let now = unix_now();
        // The agent was certainly built after 2024.
        assert!(now > 1_700_000_000.0);
    }

    #[test]
    fn friendly_time_has_expected_shape() {
        let rendered = friendly_time(unix_now());
        assert_eq!(rendered.len(), "1970-01-01 00:00:00".len());
    }
}
