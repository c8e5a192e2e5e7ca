use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::Database;
use crate::database::models::{Check, Incident, Monitor};
use crate::notifications::{TransitionEvent, TransitionKind};

/// In-memory handle to a monitor's unresolved incident.
#[derive(Debug, Clone)]
pub struct OpenIncident {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

/// Incident mutation derived from one check outcome. Persisted together
/// with the check in a single transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum IncidentAction {
    Open { started_at: DateTime<Utc>, error_message: Option<String> },
    Close { incident_id: i64, ended_at: DateTime<Utc>, duration_seconds: i64 },
}

/// The state machine proper: (current open incident, new check) → action.
///
/// - down with nothing open opens an incident carrying the check's error;
/// - down with one open changes nothing (the first failure's message is
///   sticky);
/// - up with one open closes it, duration in whole seconds;
/// - up with nothing open is a no-op.
pub fn transition(open: Option<&OpenIncident>, check: &Check) -> Option<IncidentAction> {
    if check.is_up {
        open.map(|incident| IncidentAction::Close {
            incident_id: incident.id,
            ended_at: check.checked_at,
            duration_seconds: (check.checked_at - incident.started_at).num_seconds(),
        })
    } else if open.is_none() {
        Some(IncidentAction::Open {
            started_at: check.checked_at,
            error_message: check.error_message.clone(),
        })
    } else {
        None
    }
}

/// Tracks the open incident per monitor and applies transitions.
///
/// The map is the explicit form of "latest unresolved incident per
/// monitor" and is the linchpin of the at-most-one-open invariant: it is
/// only read and written inside the scheduler's serialized completion
/// path, and only advanced after the transactional write commits. A
/// persistence failure therefore leaves both the store and the map on the
/// previous state, and the next check re-derives the same transition.
pub struct IncidentTracker {
    database: Arc<dyn Database>,
    open: HashMap<Uuid, OpenIncident>,
}

impl IncidentTracker {
    /// Recover open incidents from the store.
    pub async fn load(database: Arc<dyn Database>) -> Result<Self> {
        let mut open = HashMap::new();
        for incident in database.open_incidents().await? {
            let id = incident.id.context("open incident row without id")?;
            open.insert(
                incident.monitor_uuid,
                OpenIncident {
                    id,
                    started_at: incident.started_at,
                    error_message: incident.error_message,
                },
            );
        }

        if !open.is_empty() {
            info!("Recovered {} open incident(s) from the database", open.len());
        }
        Ok(Self { database, open })
    }

    /// Persist a check, apply its incident transition, and emit the
    /// transition event when the monitor's state flipped.
    pub async fn apply(
        &mut self,
        monitor: &Monitor,
        check: &Check,
    ) -> Result<Option<TransitionEvent>> {
        let action = transition(self.open.get(&check.monitor_uuid), check);
        let opened_id = self.database.record_check(check, action.as_ref()).await?;

        match action {
            None => Ok(None),
            Some(IncidentAction::Open { started_at, error_message }) => {
                let id = opened_id.context("no incident id returned for opened incident")?;
                self.open.insert(
                    check.monitor_uuid,
                    OpenIncident { id, started_at, error_message: error_message.clone() },
                );

                warn!("New incident for monitor {}: {:?}", monitor.name, error_message);
                Ok(Some(TransitionEvent {
                    kind: TransitionKind::IncidentStarted,
                    monitor: monitor.clone(),
                    incident: Incident {
                        id: Some(id),
                        monitor_uuid: check.monitor_uuid,
                        started_at,
                        ended_at: None,
                        duration_seconds: None,
                        error_message,
                        resolved: false,
                    },
                    timestamp: check.checked_at,
                }))
            }
            Some(IncidentAction::Close { incident_id, ended_at, duration_seconds }) => {
                let closed = self
                    .open
                    .remove(&check.monitor_uuid)
                    .context("closed an incident that was not tracked")?;

                info!(
                    "Incident resolved for monitor {} after {}s",
                    monitor.name, duration_seconds
                );
                Ok(Some(TransitionEvent {
                    kind: TransitionKind::IncidentResolved,
                    monitor: monitor.clone(),
                    incident: Incident {
                        id: Some(incident_id),
                        monitor_uuid: check.monitor_uuid,
                        started_at: closed.started_at,
                        ended_at: Some(ended_at),
                        duration_seconds: Some(duration_seconds),
                        error_message: closed.error_message,
                        resolved: true,
                    },
                    timestamp: check.checked_at,
                }))
            }
        }
    }

    /// Number of incidents currently open.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(is_up: bool, at: DateTime<Utc>, error: Option<&str>) -> Check {
        Check {
            id: None,
            monitor_uuid: Uuid::new_v4(),
            is_up,
            response_time_ms: None,
            status_code: None,
            error_message: error.map(str::to_string),
            response_snippet: None,
            checked_at: at,
        }
    }

    #[test]
    fn down_with_no_open_incident_opens_one() {
        let at = Utc::now();
        let action = transition(None, &check(false, at, Some("expected status 200, got 500")));

        assert_eq!(
            action,
            Some(IncidentAction::Open {
                started_at: at,
                error_message: Some("expected status 200, got 500".to_string()),
            })
        );
    }

    #[test]
    fn down_with_open_incident_is_silent() {
        let open = OpenIncident { id: 1, started_at: Utc::now(), error_message: None };
        assert_eq!(transition(Some(&open), &check(false, Utc::now(), Some("still down"))), None);
    }

    #[test]
    fn up_with_open_incident_closes_it() {
        let started = Utc::now();
        let ended = started + chrono::Duration::seconds(60);
        let open = OpenIncident { id: 7, started_at: started, error_message: None };

        let action = transition(Some(&open), &check(true, ended, None));
        assert_eq!(
            action,
            Some(IncidentAction::Close { incident_id: 7, ended_at: ended, duration_seconds: 60 })
        );
    }

    #[test]
    fn up_with_no_open_incident_is_a_no_op() {
        assert_eq!(transition(None, &check(true, Utc::now(), None)), None);
    }
}
