use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::models::{Incident, Monitor};

/// Which way a monitor's up/down state flipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    IncidentStarted,
    IncidentResolved,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::IncidentStarted => "incident_started",
            TransitionKind::IncidentResolved => "incident_resolved",
        }
    }
}

impl std::fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted exactly once per incident open or close; the only input the
/// notification dispatcher consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub kind: TransitionKind,
    /// Snapshot of the monitor at transition time
    pub monitor: Monitor,
    /// The incident this transition opened or closed
    pub incident: Incident,
    pub timestamp: DateTime<Utc>,
}

impl TransitionEvent {
    /// Monitor status implied by the transition
    pub fn monitor_status(&self) -> &'static str {
        match self.kind {
            TransitionKind::IncidentStarted => "down",
            TransitionKind::IncidentResolved => "up",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_renders_wire_names() {
        assert_eq!(TransitionKind::IncidentStarted.as_str(), "incident_started");
        assert_eq!(TransitionKind::IncidentResolved.to_string(), "incident_resolved");
    }
}
