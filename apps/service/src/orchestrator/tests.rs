/// Integration tests for the monitoring core against a real database:
/// incident lifecycle, scheduler due logic, uptime read model, and
/// retention cleanup.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::database::models::{Check, Monitor};
use crate::database::{Database, DatabaseImpl, initialize_database};
use crate::monitoring::incident::IncidentAction;
use crate::monitoring::scheduler::CompletedCheck;
use crate::monitoring::{CheckRunner, IncidentTracker, MonitorScheduler};
use crate::notifications::{NotificationDispatcher, TransitionKind};
use crate::orchestrator::{RetentionCleanup, RetentionPolicy};
use crate::pool::{LibsqlManager, LibsqlPool};

/// Helper to create a test database pool backed by a tempdir file.
async fn create_test_database() -> Result<(Arc<DatabaseImpl>, TempDir)> {
    let temp_dir = tempfile::tempdir()?;
    let db_path = temp_dir.path().join("test.db");

    let db = libsql::Builder::new_local(db_path.to_string_lossy().as_ref()).build().await?;
    let manager = LibsqlManager::new(db);
    let pool: LibsqlPool = deadpool::managed::Pool::builder(manager)
        .config(deadpool::managed::PoolConfig::default())
        .build()?;

    let conn = pool.get().await?;
    initialize_database(&conn).await?;
    drop(conn);

    Ok((Arc::new(DatabaseImpl::new_from_pool(pool)), temp_dir))
}

async fn save_monitor(database: &Arc<DatabaseImpl>, monitor: &Monitor) -> Result<()> {
    database.save_monitor(monitor).await?;
    Ok(())
}

fn check_at(monitor_uuid: Uuid, is_up: bool, at: DateTime<Utc>, error: Option<&str>) -> Check {
    Check {
        id: None,
        monitor_uuid,
        is_up,
        response_time_ms: if is_up { Some(12.0) } else { None },
        status_code: Some(if is_up { 200 } else { 500 }),
        error_message: error.map(str::to_string),
        response_snippet: None,
        checked_at: at,
    }
}

#[tokio::test]
async fn at_most_one_open_incident_per_monitor() -> Result<()> {
    let (database, _guard) = create_test_database().await?;
    let monitor = Monitor::new("api", "https://example.com", "https");
    save_monitor(&database, &monitor).await?;

    let db: Arc<dyn Database> = database.clone();
    let mut tracker = IncidentTracker::load(db).await?;

    let t0 = Utc::now();
    let first = tracker
        .apply(&monitor, &check_at(monitor.uuid, false, t0, Some("expected status 200, got 500")))
        .await?;
    let second = tracker
        .apply(
            &monitor,
            &check_at(
                monitor.uuid,
                false,
                t0 + chrono::Duration::seconds(60),
                Some("expected status 200, got 502"),
            ),
        )
        .await?;

    assert_eq!(first.unwrap().kind, TransitionKind::IncidentStarted);
    assert!(second.is_none(), "a second down check must not open another incident");
    assert_eq!(database.open_incidents().await?.len(), 1);
    assert_eq!(tracker.open_count(), 1);

    // The first failure's message is sticky.
    let open = database.open_incident(monitor.uuid).await?.unwrap();
    assert_eq!(open.error_message.as_deref(), Some("expected status 200, got 500"));

    Ok(())
}

#[tokio::test]
async fn down_up_down_produces_two_incidents_and_three_events() -> Result<()> {
    let (database, _guard) = create_test_database().await?;
    let monitor = Monitor::new("api", "https://example.com", "https");
    save_monitor(&database, &monitor).await?;

    let db: Arc<dyn Database> = database.clone();
    let mut tracker = IncidentTracker::load(db).await?;

    let t0 = Utc::now();
    let step = chrono::Duration::seconds(60);

    let open1 = tracker
        .apply(&monitor, &check_at(monitor.uuid, false, t0, Some("connection refused")))
        .await?
        .expect("first down must open");
    let close1 = tracker
        .apply(&monitor, &check_at(monitor.uuid, true, t0 + step, None))
        .await?
        .expect("up must close");
    let open2 = tracker
        .apply(&monitor, &check_at(monitor.uuid, false, t0 + step * 2, Some("ping timeout")))
        .await?
        .expect("second down must open a fresh incident");

    assert_eq!(open1.kind, TransitionKind::IncidentStarted);
    assert_eq!(close1.kind, TransitionKind::IncidentResolved);
    assert_eq!(open2.kind, TransitionKind::IncidentStarted);
    assert_eq!(open2.incident.error_message.as_deref(), Some("ping timeout"));
    assert_ne!(open1.incident.id, open2.incident.id);

    let incidents = database.recent_incidents(monitor.uuid, 10).await?;
    assert_eq!(incidents.len(), 2);
    assert_eq!(database.open_incidents().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn outage_opens_with_status_error_and_resolves_with_duration() -> Result<()> {
    let (database, _guard) = create_test_database().await?;
    let mut monitor = Monitor::new("api", "https://example.com", "https");
    monitor.interval_seconds = 60;
    save_monitor(&database, &monitor).await?;

    let db: Arc<dyn Database> = database.clone();
    let mut tracker = IncidentTracker::load(db).await?;

    let t0 = Utc::now();
    assert!(tracker.apply(&monitor, &check_at(monitor.uuid, true, t0, None)).await?.is_none());
    assert_eq!(database.open_incidents().await?.len(), 0);

    let started = tracker
        .apply(
            &monitor,
            &check_at(
                monitor.uuid,
                false,
                t0 + chrono::Duration::seconds(60),
                Some("expected status 200, got 500"),
            ),
        )
        .await?
        .expect("incident must open at t=60");
    assert_eq!(started.incident.error_message.as_deref(), Some("expected status 200, got 500"));

    let resolved = tracker
        .apply(&monitor, &check_at(monitor.uuid, true, t0 + chrono::Duration::seconds(120), None))
        .await?
        .expect("incident must resolve at t=120");
    assert_eq!(resolved.incident.duration_seconds, Some(60));
    assert!(resolved.incident.resolved);

    let stored = database.recent_incidents(monitor.uuid, 1).await?.remove(0);
    assert!(stored.resolved);
    assert_eq!(stored.duration_seconds, Some(60));

    Ok(())
}

#[tokio::test]
async fn tracker_recovers_open_incidents_across_restart() -> Result<()> {
    let (database, _guard) = create_test_database().await?;
    let monitor = Monitor::new("api", "https://example.com", "https");
    save_monitor(&database, &monitor).await?;

    let db: Arc<dyn Database> = database.clone();
    let mut tracker = IncidentTracker::load(db.clone()).await?;
    let t0 = Utc::now();
    tracker.apply(&monitor, &check_at(monitor.uuid, false, t0, Some("down"))).await?;
    drop(tracker);

    // A fresh tracker must pick up the open incident and close it, not
    // open a second one.
    let mut tracker = IncidentTracker::load(db).await?;
    assert_eq!(tracker.open_count(), 1);

    let event = tracker
        .apply(&monitor, &check_at(monitor.uuid, true, t0 + chrono::Duration::seconds(30), None))
        .await?
        .expect("recovered incident must close");
    assert_eq!(event.kind, TransitionKind::IncidentResolved);
    assert_eq!(database.open_incidents().await?.len(), 0);

    Ok(())
}

#[tokio::test]
async fn uptime_percentage_over_window() -> Result<()> {
    let (database, _guard) = create_test_database().await?;
    let monitor = Monitor::new("api", "https://example.com", "https");
    save_monitor(&database, &monitor).await?;

    let now = Utc::now();
    for i in 0..10i64 {
        let is_up = i < 8;
        let check = check_at(monitor.uuid, is_up, now - chrono::Duration::hours(i), None);
        database.record_check(&check, None).await?;
    }

    let uptime = database.uptime_percentage(monitor.uuid, 7).await?;
    assert!((uptime - 80.0).abs() < f64::EPSILON, "expected 80.0, got {uptime}");

    // No checks in the window reads as fully up.
    let empty = Monitor::new("quiet", "https://example.org", "https");
    save_monitor(&database, &empty).await?;
    assert!((database.uptime_percentage(empty.uuid, 7).await? - 100.0).abs() < f64::EPSILON);

    Ok(())
}

#[tokio::test]
async fn retention_removes_expired_history_but_never_open_incidents() -> Result<()> {
    let (database, _guard) = create_test_database().await?;
    let monitor = Monitor::new("api", "https://example.com", "https");
    save_monitor(&database, &monitor).await?;

    let now = Utc::now();

    // One check inside the window, one far outside it.
    database
        .record_check(&check_at(monitor.uuid, true, now - chrono::Duration::days(1), None), None)
        .await?;
    database
        .record_check(&check_at(monitor.uuid, true, now - chrono::Duration::days(40), None), None)
        .await?;

    // A resolved incident that ended 100 days ago.
    let old_start = now - chrono::Duration::days(101);
    let old_end = now - chrono::Duration::days(100);
    let opened = database
        .record_check(
            &check_at(monitor.uuid, false, old_start, Some("down")),
            Some(&IncidentAction::Open { started_at: old_start, error_message: None }),
        )
        .await?
        .expect("open must return the incident id");
    database
        .record_check(
            &check_at(monitor.uuid, true, old_end, None),
            Some(&IncidentAction::Close {
                incident_id: opened,
                ended_at: old_end,
                duration_seconds: 86400,
            }),
        )
        .await?;

    // An unresolved incident much older than any window.
    let ancient = now - chrono::Duration::days(200);
    database
        .record_check(
            &check_at(monitor.uuid, false, ancient, Some("still down")),
            Some(&IncidentAction::Open { started_at: ancient, error_message: None }),
        )
        .await?;

    let db: Arc<dyn Database> = database.clone();
    let cleanup = RetentionCleanup::new(db, RetentionPolicy::default());
    cleanup.cleanup_expired().await?;

    // Only the in-window check survives (the incident-bearing checks were
    // all out of window too).
    let checks = database.recent_checks(monitor.uuid, 100).await?;
    assert_eq!(checks.len(), 1);

    let incidents = database.recent_incidents(monitor.uuid, 100).await?;
    assert_eq!(incidents.len(), 1, "the resolved incident must be gone");
    assert!(!incidents[0].resolved, "the unresolved incident must survive");

    Ok(())
}

fn test_scheduler(
    database: Arc<DatabaseImpl>,
    tracker: IncidentTracker,
) -> Result<MonitorScheduler> {
    let db: Arc<dyn Database> = database;
    let runner = Arc::new(CheckRunner::new()?);
    let dispatcher = Arc::new(NotificationDispatcher::new(db.clone()));
    let retention = Arc::new(RetentionCleanup::new(db.clone(), RetentionPolicy::default()));
    Ok(MonitorScheduler::new(db, runner, dispatcher, retention, tracker, Duration::from_secs(30)))
}

#[tokio::test]
async fn due_pass_with_no_due_monitor_writes_nothing() -> Result<()> {
    let (database, _guard) = create_test_database().await?;
    let mut monitor = Monitor::new("local port", "127.0.0.1:9", "port");
    monitor.interval_seconds = 3600;
    save_monitor(&database, &monitor).await?;

    // Checked moments ago, so nothing is due.
    database.record_check(&check_at(monitor.uuid, true, Utc::now(), None), None).await?;

    let db: Arc<dyn Database> = database.clone();
    let tracker = IncidentTracker::load(db).await?;
    let mut scheduler = test_scheduler(database.clone(), tracker)?;
    scheduler.sync_monitors().await?;

    let (done_tx, _done_rx) = mpsc::channel::<CompletedCheck>(8);
    scheduler.run_due_pass(&done_tx, Utc::now());

    assert_eq!(scheduler.in_flight_count(), 0);
    assert_eq!(database.recent_checks(monitor.uuid, 10).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn due_monitor_is_checked_and_incident_opened() -> Result<()> {
    let (database, _guard) = create_test_database().await?;
    // Nothing listens on this port, so the probe fails fast and locally.
    let monitor = Monitor::new("local port", "127.0.0.1:9", "port");
    save_monitor(&database, &monitor).await?;

    let db: Arc<dyn Database> = database.clone();
    let tracker = IncidentTracker::load(db).await?;
    let mut scheduler = test_scheduler(database.clone(), tracker)?;
    scheduler.sync_monitors().await?;

    let (done_tx, mut done_rx) = mpsc::channel::<CompletedCheck>(8);
    scheduler.run_due_pass(&done_tx, Utc::now());
    assert_eq!(scheduler.in_flight_count(), 1);

    let done = tokio::time::timeout(Duration::from_secs(30), done_rx.recv())
        .await
        .expect("check should complete well within its timeout")
        .expect("completion channel closed");
    scheduler.on_complete(done).await;

    assert_eq!(scheduler.in_flight_count(), 0);
    let checks = database.recent_checks(monitor.uuid, 10).await?;
    assert_eq!(checks.len(), 1);
    assert!(!checks[0].is_up);
    assert_eq!(database.open_incidents().await?.len(), 1);

    // Immediately re-running the pass launches nothing: the monitor was
    // just checked.
    scheduler.run_due_pass(&done_tx, Utc::now());
    assert_eq!(scheduler.in_flight_count(), 0);

    Ok(())
}

#[tokio::test]
async fn scheduler_runs_and_shuts_down_cleanly() -> Result<()> {
    let (database, _guard) = create_test_database().await?;

    let db: Arc<dyn Database> = database.clone();
    let tracker = IncidentTracker::load(db).await?;
    let scheduler = test_scheduler(database, tracker)?;
    let handle = scheduler.handle();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(scheduler.run(shutdown_rx));

    handle.run_due_pass().await?;
    shutdown_tx.send(true)?;

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("scheduler should stop promptly")?
        .expect("scheduler should exit cleanly");

    Ok(())
}
