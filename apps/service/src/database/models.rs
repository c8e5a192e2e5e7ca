use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::monitoring::types::{MonitorType, ProbeOutcome};

/// Convert a stored unix timestamp back into a [`DateTime<Utc>`].
pub(crate) fn i64_to_datetime(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap_or_default()
}

/// Monitor model - a configured endpoint to probe periodically.
///
/// Monitors are written by the management layer; the core only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Option<i64>,
    pub uuid: Uuid,
    pub name: String,
    pub url: String,
    pub monitor_type: String,
    pub method: String,
    pub expected_status: u16,
    pub expected_text: Option<String>,
    pub timeout_seconds: u64,
    pub interval_seconds: u64,
    pub retries: u32,
    /// JSON object of extra request headers, as stored.
    pub headers: Option<String>,
    pub body: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    pub fn new(name: impl Into<String>, url: impl Into<String>, monitor_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            monitor_type: monitor_type.into(),
            method: "GET".to_string(),
            expected_status: 200,
            expected_text: None,
            timeout_seconds: 30,
            interval_seconds: 60,
            retries: 3,
            headers: None,
            body: None,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// The monitor type as a closed enum; `None` for unrecognized strings,
    /// which the runner records as a failed check rather than an error.
    pub fn kind(&self) -> Option<MonitorType> {
        MonitorType::parse(&self.monitor_type)
    }

    /// Parse the stored headers JSON. Malformed JSON yields an empty map.
    pub fn parsed_headers(&self) -> HashMap<String, String> {
        self.headers
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

/// Check model - one immutable probe result for a monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Check {
    pub id: Option<i64>,
    pub monitor_uuid: Uuid,
    pub is_up: bool,
    pub response_time_ms: Option<f64>,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    /// Leading slice of the response body, capped at 1000 chars.
    pub response_snippet: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl Check {
    /// Build the durable record from a probe outcome. `checked_at` is the
    /// runner invocation start, not the probe completion time.
    pub fn from_outcome(monitor_uuid: Uuid, outcome: ProbeOutcome, checked_at: DateTime<Utc>) -> Self {
        Self {
            id: None,
            monitor_uuid,
            is_up: outcome.success,
            response_time_ms: outcome.latency_ms,
            status_code: outcome.status_code,
            error_message: outcome.error,
            response_snippet: outcome.body_snippet,
            checked_at,
        }
    }
}

/// Incident model - a contiguous downtime span for a monitor.
///
/// Only the incident tracker may create or mutate these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Option<i64>,
    pub monitor_uuid: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub error_message: Option<String>,
    pub resolved: bool,
}

impl Incident {
    /// Human-readable duration: `"42s"`, `"3m 10s"`, `"2h 5m"`. Open
    /// incidents report the time elapsed so far.
    pub fn duration_formatted(&self) -> String {
        let duration = self.duration_seconds.unwrap_or_else(|| {
            let end = self.ended_at.unwrap_or_else(Utc::now);
            (end - self.started_at).num_seconds()
        });
        format_duration(duration)
    }
}

fn format_duration(seconds: i64) -> String {
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// NotificationChannel model - a configured alert delivery mechanism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub id: Option<i64>,
    pub name: String,
    pub channel_type: String,
    /// Type-specific configuration blob (JSON).
    pub config: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationChannel {
    pub fn new(
        name: impl Into<String>,
        channel_type: impl Into<String>,
        config: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            channel_type: channel_type.into(),
            config: config.into(),
            enabled: true,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_defaults() {
        let monitor = Monitor::new("api", "https://example.com/health", "https");
        assert_eq!(monitor.method, "GET");
        assert_eq!(monitor.expected_status, 200);
        assert_eq!(monitor.interval_seconds, 60);
        assert_eq!(monitor.retries, 3);
        assert!(monitor.enabled);
        assert_eq!(monitor.kind(), Some(MonitorType::Https));
    }

    #[test]
    fn malformed_headers_parse_to_empty_map() {
        let mut monitor = Monitor::new("api", "https://example.com", "http");
        monitor.headers = Some("{not json".to_string());
        assert!(monitor.parsed_headers().is_empty());

        monitor.headers = Some(r#"{"Authorization": "Bearer t"}"#.to_string());
        assert_eq!(monitor.parsed_headers().get("Authorization").unwrap(), "Bearer t");
    }

    #[test]
    fn duration_formatting_boundaries() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(190), "3m 10s");
        assert_eq!(format_duration(7500), "2h 5m");
    }

    #[test]
    fn closed_incident_uses_stored_duration() {
        let incident = Incident {
            id: Some(1),
            monitor_uuid: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: Some(61),
            error_message: None,
            resolved: true,
        };
        assert_eq!(incident.duration_formatted(), "1m 1s");
    }
}
