/// Orchestrator module - coordinates all components
///
/// Wires the persistence pool, check runner, incident tracker,
/// notification dispatcher, scheduler, and retention cleanup together,
/// and translates process signals into a graceful shutdown.
pub mod retention;

#[cfg(test)]
mod tests;

pub use retention::{RetentionCleanup, RetentionPolicy};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use crate::config::Config;
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::monitoring::{CheckRunner, IncidentTracker, MonitorScheduler};
use crate::notifications::NotificationDispatcher;
use crate::pool::LibsqlPool;

/// Main orchestrator for the vigil service
pub struct Orchestrator;

impl Orchestrator {
    /// Bring the whole core up and run it until shutdown.
    pub async fn start(config: Config, pool: LibsqlPool) -> Result<()> {
        info!("Initializing database schema...");
        let conn = pool.get().await?;
        initialize_database(&conn).await?;
        drop(conn);

        let database: Arc<dyn Database> = Arc::new(DatabaseImpl::new_from_pool(pool));

        let runner = Arc::new(CheckRunner::new()?);
        let dispatcher = Arc::new(NotificationDispatcher::new(database.clone()));

        let policy = RetentionPolicy {
            check_history_days: config.retention.check_history_days,
            ..RetentionPolicy::default()
        };
        info!(
            "Retention policy: checks={}d, resolved incidents={}d",
            policy.check_history_days, policy.resolved_incident_days
        );
        let retention = Arc::new(RetentionCleanup::new(database.clone(), policy));
        let retention_handle = retention.start_periodic_cleanup();

        let tracker = IncidentTracker::load(database.clone()).await?;

        let scheduler = MonitorScheduler::new(
            database,
            runner,
            dispatcher,
            retention,
            tracker,
            Duration::from_secs(config.scheduler.reload_seconds),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
        });

        info!("Orchestrator started");
        let result = scheduler.run(shutdown_rx).await;

        retention_handle.abort();
        result
    }
}
