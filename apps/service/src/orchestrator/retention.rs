//! Automatic retention and cleanup of monitoring history.
//!
//! Data lifecycle:
//! - Checks: removed after the configured history window (default 30 days)
//! - Resolved incidents: removed after a fixed 90 days
//! - Unresolved incidents: never removed, regardless of age
//!
//! Cleanup runs hourly as a background task and can also be triggered
//! through the scheduler's `Cleanup` command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::database::Database;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Retention windows for monitoring history
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Days of check history to keep
    pub check_history_days: i64,
    /// Days to keep resolved incidents after they ended
    pub resolved_incident_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { check_history_days: 30, resolved_incident_days: 90 }
    }
}

/// Cleanup manager for expired history
pub struct RetentionCleanup {
    database: Arc<dyn Database>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(database: Arc<dyn Database>, policy: RetentionPolicy) -> Self {
        Self { database, policy }
    }

    /// Delete out-of-window checks and resolved incidents. Returns
    /// (checks removed, incidents removed).
    pub async fn cleanup_expired(&self) -> Result<(u64, u64)> {
        let now = Utc::now();
        let check_cutoff = now - chrono::Duration::days(self.policy.check_history_days);
        let incident_cutoff = now - chrono::Duration::days(self.policy.resolved_incident_days);

        let checks = self.database.delete_checks_before(check_cutoff).await?;
        let incidents = self.database.delete_resolved_incidents_before(incident_cutoff).await?;

        if checks > 0 || incidents > 0 {
            info!(
                "Retention cleanup removed {} check(s) and {} resolved incident(s)",
                checks, incidents
            );
        } else {
            debug!("Retention cleanup found nothing to remove");
        }

        Ok((checks, incidents))
    }

    /// Start the hourly background cleanup task
    pub fn start_periodic_cleanup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cleanup = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                interval.tick().await;

                if let Err(err) = cleanup.cleanup_expired().await {
                    warn!("Periodic retention cleanup failed: {err:#}");
                }
            }
        })
    }
}
