use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};
use uuid::Uuid;

use super::models::{Check, Incident, Monitor, NotificationChannel, i64_to_datetime};
use crate::monitoring::incident::IncidentAction;
use crate::monitoring::validation::validate_monitor;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Database trait for abstracting storage operations.
///
/// This is also the read model the management layer consumes: monitors and
/// channels flow in, checks and incidents flow out.
#[async_trait]
pub trait Database: Send + Sync {
    /// Get all enabled monitors
    async fn get_enabled_monitors(&self) -> Result<Vec<Monitor>>;

    /// Get a monitor by UUID
    async fn get_monitor_by_uuid(&self, uuid: Uuid) -> Result<Option<Monitor>>;

    /// Insert or update a monitor (validates its invariants first)
    async fn save_monitor(&self, monitor: &Monitor) -> Result<i64>;

    /// Delete a monitor; checks and incidents follow via cascade
    async fn delete_monitor(&self, uuid: Uuid) -> Result<()>;

    /// Latest check for a monitor, if any
    async fn latest_check(&self, monitor_uuid: Uuid) -> Result<Option<Check>>;

    /// Recent checks for a monitor, newest first
    async fn recent_checks(&self, monitor_uuid: Uuid, limit: usize) -> Result<Vec<Check>>;

    /// Persist a check and the incident transition it caused in one
    /// transaction. Returns the rowid of a newly opened incident.
    async fn record_check(
        &self,
        check: &Check,
        action: Option<&IncidentAction>,
    ) -> Result<Option<i64>>;

    /// The unresolved incident for a monitor, if one is open
    async fn open_incident(&self, monitor_uuid: Uuid) -> Result<Option<Incident>>;

    /// All unresolved incidents (tracker recovery at startup)
    async fn open_incidents(&self) -> Result<Vec<Incident>>;

    /// Recent incidents for a monitor, newest first
    async fn recent_incidents(&self, monitor_uuid: Uuid, limit: usize) -> Result<Vec<Incident>>;

    /// Percentage of up checks within the trailing window; 100.0 when the
    /// window holds no checks
    async fn uptime_percentage(&self, monitor_uuid: Uuid, window_days: i64) -> Result<f64>;

    /// Get all enabled notification channels
    async fn get_enabled_channels(&self) -> Result<Vec<NotificationChannel>>;

    /// Insert a notification channel
    async fn save_channel(&self, channel: &NotificationChannel) -> Result<i64>;

    /// Delete checks older than the cutoff; returns rows removed
    async fn delete_checks_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete resolved incidents that ended before the cutoff; unresolved
    /// incidents are never touched
    async fn delete_resolved_incidents_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// LibSQL database implementation
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }
}

const MONITOR_COLUMNS: &str = "id, uuid, name, url, monitor_type, method, expected_status, \
     expected_text, timeout_seconds, interval_seconds, retries, headers, body, enabled, \
     created_at, updated_at";

const CHECK_COLUMNS: &str =
    "id, monitor_uuid, is_up, response_time_ms, status_code, error_message, response_snippet, \
     checked_at";

const INCIDENT_COLUMNS: &str =
    "id, monitor_uuid, started_at, ended_at, duration_seconds, error_message, resolved";

fn monitor_from_row(row: &Row) -> Result<Monitor> {
    let uuid_str: String = row.get(1)?;
    Ok(Monitor {
        id: Some(row.get(0)?),
        uuid: Uuid::parse_str(&uuid_str).context("invalid monitor uuid in database")?,
        name: row.get(2)?,
        url: row.get(3)?,
        monitor_type: row.get(4)?,
        method: row.get(5)?,
        expected_status: row.get::<i64>(6)? as u16,
        expected_text: row.get(7)?,
        timeout_seconds: row.get::<i64>(8)? as u64,
        interval_seconds: row.get::<i64>(9)? as u64,
        retries: row.get::<i64>(10)? as u32,
        headers: row.get(11)?,
        body: row.get(12)?,
        enabled: row.get::<i64>(13)? != 0,
        created_at: i64_to_datetime(row.get(14)?),
        updated_at: i64_to_datetime(row.get(15)?),
    })
}

fn check_from_row(row: &Row) -> Result<Check> {
    let uuid_str: String = row.get(1)?;
    Ok(Check {
        id: Some(row.get(0)?),
        monitor_uuid: Uuid::parse_str(&uuid_str).context("invalid monitor uuid in database")?,
        is_up: row.get::<i64>(2)? != 0,
        response_time_ms: row.get(3)?,
        status_code: row.get::<Option<i64>>(4)?.map(|v| v as u16),
        error_message: row.get(5)?,
        response_snippet: row.get(6)?,
        checked_at: i64_to_datetime(row.get(7)?),
    })
}

fn incident_from_row(row: &Row) -> Result<Incident> {
    let uuid_str: String = row.get(1)?;
    Ok(Incident {
        id: Some(row.get(0)?),
        monitor_uuid: Uuid::parse_str(&uuid_str).context("invalid monitor uuid in database")?,
        started_at: i64_to_datetime(row.get(2)?),
        ended_at: row.get::<Option<i64>>(3)?.map(i64_to_datetime),
        duration_seconds: row.get(4)?,
        error_message: row.get(5)?,
        resolved: row.get::<i64>(6)? != 0,
    })
}

#[async_trait]
impl Database for DatabaseImpl {
    async fn get_enabled_monitors(&self) -> Result<Vec<Monitor>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE enabled = 1"))
            .await?;

        let mut rows = stmt.query(()).await?;
        let mut monitors = Vec::new();
        while let Some(row) = rows.next().await? {
            monitors.push(monitor_from_row(&row)?);
        }

        Ok(monitors)
    }

    async fn get_monitor_by_uuid(&self, uuid: Uuid) -> Result<Option<Monitor>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE uuid = ?"))
            .await?;

        let mut rows = stmt.query(params![uuid.to_string()]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(monitor_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn save_monitor(&self, monitor: &Monitor) -> Result<i64> {
        validate_monitor(monitor)?;

        let conn = self.get_conn().await?;
        let created_at = monitor.created_at.timestamp();
        let updated_at = monitor.updated_at.timestamp();

        if let Some(id) = monitor.id {
            conn.execute(
                "UPDATE monitors SET name = ?, url = ?, monitor_type = ?, method = ?, \
                 expected_status = ?, expected_text = ?, timeout_seconds = ?, \
                 interval_seconds = ?, retries = ?, headers = ?, body = ?, enabled = ?, \
                 updated_at = ? WHERE id = ?",
                params![
                    monitor.name.clone(),
                    monitor.url.clone(),
                    monitor.monitor_type.clone(),
                    monitor.method.clone(),
                    monitor.expected_status as i64,
                    monitor.expected_text.clone(),
                    monitor.timeout_seconds as i64,
                    monitor.interval_seconds as i64,
                    monitor.retries as i64,
                    monitor.headers.clone(),
                    monitor.body.clone(),
                    if monitor.enabled { 1 } else { 0 },
                    updated_at,
                    id
                ],
            )
            .await?;
            Ok(id)
        } else {
            conn.execute(
                "INSERT INTO monitors (uuid, name, url, monitor_type, method, expected_status, \
                 expected_text, timeout_seconds, interval_seconds, retries, headers, body, \
                 enabled, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    monitor.uuid.to_string(),
                    monitor.name.clone(),
                    monitor.url.clone(),
                    monitor.monitor_type.clone(),
                    monitor.method.clone(),
                    monitor.expected_status as i64,
                    monitor.expected_text.clone(),
                    monitor.timeout_seconds as i64,
                    monitor.interval_seconds as i64,
                    monitor.retries as i64,
                    monitor.headers.clone(),
                    monitor.body.clone(),
                    if monitor.enabled { 1 } else { 0 },
                    created_at,
                    updated_at
                ],
            )
            .await?;

            Ok(conn.last_insert_rowid())
        }
    }

    async fn delete_monitor(&self, uuid: Uuid) -> Result<()> {
        let conn = self.get_conn().await?;
        conn.execute("DELETE FROM monitors WHERE uuid = ?", params![uuid.to_string()]).await?;
        Ok(())
    }

    async fn latest_check(&self, monitor_uuid: Uuid) -> Result<Option<Check>> {
        let mut checks = self.recent_checks(monitor_uuid, 1).await?;
        Ok(checks.pop())
    }

    async fn recent_checks(&self, monitor_uuid: Uuid, limit: usize) -> Result<Vec<Check>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {CHECK_COLUMNS} FROM checks WHERE monitor_uuid = ? \
                 ORDER BY checked_at DESC LIMIT ?"
            ))
            .await?;

        let mut rows = stmt.query(params![monitor_uuid.to_string(), limit as i64]).await?;
        let mut checks = Vec::new();
        while let Some(row) = rows.next().await? {
            checks.push(check_from_row(&row)?);
        }

        Ok(checks)
    }

    async fn record_check(
        &self,
        check: &Check,
        action: Option<&IncidentAction>,
    ) -> Result<Option<i64>> {
        let conn = self.get_conn().await?;
        let tx = conn.transaction().await?;

        tx.execute(
            "INSERT INTO checks (monitor_uuid, is_up, response_time_ms, status_code, \
             error_message, response_snippet, checked_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                check.monitor_uuid.to_string(),
                if check.is_up { 1 } else { 0 },
                check.response_time_ms,
                check.status_code.map(|v| v as i64),
                check.error_message.clone(),
                check.response_snippet.clone(),
                check.checked_at.timestamp()
            ],
        )
        .await?;

        let opened = match action {
            Some(IncidentAction::Open { started_at, error_message }) => {
                tx.execute(
                    "INSERT INTO incidents (monitor_uuid, started_at, error_message, resolved) \
                     VALUES (?, ?, ?, 0)",
                    params![
                        check.monitor_uuid.to_string(),
                        started_at.timestamp(),
                        error_message.clone()
                    ],
                )
                .await?;
                Some(tx.last_insert_rowid())
            }
            Some(IncidentAction::Close { incident_id, ended_at, duration_seconds }) => {
                tx.execute(
                    "UPDATE incidents SET ended_at = ?, duration_seconds = ?, resolved = 1 \
                     WHERE id = ?",
                    params![ended_at.timestamp(), *duration_seconds, *incident_id],
                )
                .await?;
                None
            }
            None => None,
        };

        tx.commit().await?;
        Ok(opened)
    }

    async fn open_incident(&self, monitor_uuid: Uuid) -> Result<Option<Incident>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE monitor_uuid = ? AND resolved = 0 \
                 ORDER BY started_at DESC LIMIT 1"
            ))
            .await?;

        let mut rows = stmt.query(params![monitor_uuid.to_string()]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(incident_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn open_incidents(&self) -> Result<Vec<Incident>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!("SELECT {INCIDENT_COLUMNS} FROM incidents WHERE resolved = 0"))
            .await?;

        let mut rows = stmt.query(()).await?;
        let mut incidents = Vec::new();
        while let Some(row) = rows.next().await? {
            incidents.push(incident_from_row(&row)?);
        }

        Ok(incidents)
    }

    async fn recent_incidents(&self, monitor_uuid: Uuid, limit: usize) -> Result<Vec<Incident>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {INCIDENT_COLUMNS} FROM incidents WHERE monitor_uuid = ? \
                 ORDER BY started_at DESC LIMIT ?"
            ))
            .await?;

        let mut rows = stmt.query(params![monitor_uuid.to_string(), limit as i64]).await?;
        let mut incidents = Vec::new();
        while let Some(row) = rows.next().await? {
            incidents.push(incident_from_row(&row)?);
        }

        Ok(incidents)
    }

    async fn uptime_percentage(&self, monitor_uuid: Uuid, window_days: i64) -> Result<f64> {
        let conn = self.get_conn().await?;
        let since = (Utc::now() - chrono::Duration::days(window_days)).timestamp();

        let mut rows = conn
            .query(
                "SELECT COUNT(*), COALESCE(SUM(is_up), 0) FROM checks \
                 WHERE monitor_uuid = ? AND checked_at >= ?",
                params![monitor_uuid.to_string(), since],
            )
            .await?;

        let row = rows.next().await?.context("count query returned no rows")?;
        let total: i64 = row.get(0)?;
        let up: i64 = row.get(1)?;

        if total == 0 {
            return Ok(100.0);
        }
        Ok(up as f64 / total as f64 * 100.0)
    }

    async fn get_enabled_channels(&self) -> Result<Vec<NotificationChannel>> {
        let conn = self.get_conn().await?;
        let mut stmt = conn
            .prepare(
                "SELECT id, name, channel_type, config, enabled, created_at \
                 FROM notification_channels WHERE enabled = 1",
            )
            .await?;

        let mut rows = stmt.query(()).await?;
        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(NotificationChannel {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                channel_type: row.get(2)?,
                config: row.get(3)?,
                enabled: row.get::<i64>(4)? != 0,
                created_at: i64_to_datetime(row.get(5)?),
            });
        }

        Ok(channels)
    }

    async fn save_channel(&self, channel: &NotificationChannel) -> Result<i64> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO notification_channels (name, channel_type, config, enabled, created_at) \
             VALUES (?, ?, ?, ?, ?)",
            params![
                channel.name.clone(),
                channel.channel_type.clone(),
                channel.config.clone(),
                if channel.enabled { 1 } else { 0 },
                channel.created_at.timestamp()
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn delete_checks_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        let removed = conn
            .execute("DELETE FROM checks WHERE checked_at < ?", params![cutoff.timestamp()])
            .await?;
        Ok(removed)
    }

    async fn delete_resolved_incidents_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let conn = self.get_conn().await?;
        let removed = conn
            .execute(
                "DELETE FROM incidents WHERE resolved = 1 AND ended_at < ?",
                params![cutoff.timestamp()],
            )
            .await?;
        Ok(removed)
    }
}
