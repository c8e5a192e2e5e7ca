use serde::{Deserialize, Serialize};

/// Kind of probe a monitor performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorType {
    Http,
    Https,
    Ping,
    Port,
}

impl MonitorType {
    /// Lenient parse: unknown strings return `None` so a misconfigured
    /// monitor records a failed check instead of crashing the pipeline.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            "ping" => Some(Self::Ping),
            "port" => Some(Self::Port),
            _ => None,
        }
    }
}

impl std::fmt::Display for MonitorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorType::Http => write!(f, "http"),
            MonitorType::Https => write!(f, "https"),
            MonitorType::Ping => write!(f, "ping"),
            MonitorType::Port => write!(f, "port"),
        }
    }
}

/// Normalized result of a single probe attempt.
///
/// Probers never fail outright; every error is folded into a failure
/// outcome so the pipeline always receives a well-formed result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub success: bool,

    /// Wall-clock duration of the attempt, in milliseconds
    pub latency_ms: Option<f64>,

    /// Protocol detail, e.g. the HTTP status code
    pub status_code: Option<u16>,

    /// Why the probe failed (when it did)
    pub error: Option<String>,

    /// Leading slice of the response body (HTTP probes only)
    pub body_snippet: Option<String>,
}

impl ProbeOutcome {
    /// A successful probe with its measured latency
    pub fn up(latency_ms: f64) -> Self {
        Self {
            success: true,
            latency_ms: Some(latency_ms),
            status_code: None,
            error: None,
            body_snippet: None,
        }
    }

    /// A failed probe with its error text
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            latency_ms: None,
            status_code: None,
            error: Some(error.into()),
            body_snippet: None,
        }
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_types() {
        assert_eq!(MonitorType::parse("http"), Some(MonitorType::Http));
        assert_eq!(MonitorType::parse("https"), Some(MonitorType::Https));
        assert_eq!(MonitorType::parse("ping"), Some(MonitorType::Ping));
        assert_eq!(MonitorType::parse("port"), Some(MonitorType::Port));
        assert_eq!(MonitorType::parse("dns"), None);
    }

    #[test]
    fn builders_set_expected_fields() {
        let up = ProbeOutcome::up(12.5);
        assert!(up.success);
        assert_eq!(up.latency_ms, Some(12.5));

        let down = ProbeOutcome::failure("connection refused").with_latency(3.0);
        assert!(!down.success);
        assert_eq!(down.error.as_deref(), Some("connection refused"));
        assert_eq!(down.latency_ms, Some(3.0));
    }
}
