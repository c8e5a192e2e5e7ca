use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::incident::IncidentTracker;
use super::runner::CheckRunner;
use crate::database::Database;
use crate::database::models::{Check, Monitor};
use crate::notifications::NotificationDispatcher;
use crate::orchestrator::RetentionCleanup;

/// Idle sleep when no monitor is armed.
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// How long shutdown waits for one in-flight check to finish.
const DRAIN_WAIT: Duration = Duration::from_secs(30);

/// A monitor is due when it has never been checked, or its interval has
/// elapsed since the last check started.
pub(crate) fn is_due(
    last_checked: Option<DateTime<Utc>>,
    interval_seconds: u64,
    now: DateTime<Utc>,
) -> bool {
    match last_checked {
        None => true,
        Some(last) => (now - last).num_seconds() >= interval_seconds as i64,
    }
}

/// Management hooks into a running scheduler. Safe to call repeatedly;
/// commands funnel through the scheduler's serialized loop.
#[derive(Clone)]
pub struct SchedulerHandle {
    cmd_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Check one monitor immediately, skipped if a check is in flight.
    pub async fn run_now(&self, monitor_uuid: Uuid) -> Result<()> {
        Ok(self.cmd_tx.send(SchedulerCommand::RunNow(monitor_uuid)).await?)
    }

    /// Launch checks for every currently due monitor.
    pub async fn run_due_pass(&self) -> Result<()> {
        Ok(self.cmd_tx.send(SchedulerCommand::RunDuePass).await?)
    }

    /// Trigger retention cleanup outside its periodic cadence.
    pub async fn cleanup(&self) -> Result<()> {
        Ok(self.cmd_tx.send(SchedulerCommand::Cleanup).await?)
    }
}

#[derive(Debug)]
enum SchedulerCommand {
    RunNow(Uuid),
    RunDuePass,
    Cleanup,
}

pub(crate) struct CompletedCheck {
    monitor: Monitor,
    check: Check,
}

#[derive(Debug, PartialEq, Eq)]
struct DueEntry {
    at: DateTime<Utc>,
    monitor_uuid: Uuid,
}

impl Ord for DueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at.cmp(&other.at).then_with(|| self.monitor_uuid.cmp(&other.monitor_uuid))
    }
}

impl PartialOrd for DueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Monitoring scheduler - the coordinating loop of the core.
///
/// Rather than scanning every monitor on a fixed tick, a min-heap of
/// next-due times drives the loop; monitor configuration is re-read from
/// the database on a reload interval. All persistence and incident
/// transitions happen on this loop, and the `in_flight` set guarantees no
/// two checks of the same monitor ever overlap, which together make the
/// incident tracker's critical section per-monitor serialized.
pub struct MonitorScheduler {
    database: Arc<dyn Database>,
    runner: Arc<CheckRunner>,
    dispatcher: Arc<NotificationDispatcher>,
    retention: Arc<RetentionCleanup>,
    tracker: IncidentTracker,
    reload_interval: Duration,

    monitors: HashMap<Uuid, Monitor>,
    last_checked: HashMap<Uuid, DateTime<Utc>>,
    /// Monitors with a pending entry in `due` (no duplicate entries).
    scheduled: HashSet<Uuid>,
    /// Monitors with a check currently running.
    in_flight: HashSet<Uuid>,
    due: BinaryHeap<Reverse<DueEntry>>,

    cmd_tx: mpsc::Sender<SchedulerCommand>,
    cmd_rx: Option<mpsc::Receiver<SchedulerCommand>>,
}

impl MonitorScheduler {
    pub fn new(
        database: Arc<dyn Database>,
        runner: Arc<CheckRunner>,
        dispatcher: Arc<NotificationDispatcher>,
        retention: Arc<RetentionCleanup>,
        tracker: IncidentTracker,
        reload_interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        Self {
            database,
            runner,
            dispatcher,
            retention,
            tracker,
            reload_interval,
            monitors: HashMap::new(),
            last_checked: HashMap::new(),
            scheduled: HashSet::new(),
            in_flight: HashSet::new(),
            due: BinaryHeap::new(),
            cmd_tx,
            cmd_rx: Some(cmd_rx),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle { cmd_tx: self.cmd_tx.clone() }
    }

    /// Run until the shutdown watch flips. In-flight checks are drained
    /// before returning so no check/incident pair is left half-written.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.sync_monitors().await?;
        info!("Scheduler started with {} enabled monitor(s)", self.monitors.len());

        let (done_tx, mut done_rx) = mpsc::channel::<CompletedCheck>(64);
        let mut cmd_rx = self.cmd_rx.take().expect("scheduler started twice");
        let mut reload = tokio::time::interval(self.reload_interval);
        reload.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        reload.tick().await; // immediate first tick; monitors already synced

        loop {
            let wait = self.next_due_delay(Utc::now());

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.launch_due(&done_tx, Utc::now());
                }

                _ = reload.tick() => {
                    if let Err(err) = self.sync_monitors().await {
                        error!("Failed to reload monitors: {err:#}");
                    }
                }

                Some(done) = done_rx.recv() => {
                    self.on_complete(done).await;
                }

                Some(cmd) = cmd_rx.recv() => {
                    self.handle_command(cmd, &done_tx).await;
                }

                _ = shutdown.changed() => {
                    info!("Scheduler shutting down");
                    break;
                }
            }
        }

        // Let running checks land; their results are persisted so a check
        // never exists without its incident transition.
        while !self.in_flight.is_empty() {
            match tokio::time::timeout(DRAIN_WAIT, done_rx.recv()).await {
                Ok(Some(done)) => self.on_complete(done).await,
                Ok(None) => break,
                Err(_) => {
                    warn!("Abandoning {} in-flight check(s) on shutdown", self.in_flight.len());
                    break;
                }
            }
        }

        Ok(())
    }

    /// Re-read enabled monitors. New monitors are armed from their latest
    /// persisted check; deleted or disabled ones are dropped (stale heap
    /// entries are discarded when popped).
    pub(crate) async fn sync_monitors(&mut self) -> Result<()> {
        let monitors = self.database.get_enabled_monitors().await?;
        let now = Utc::now();

        let mut refreshed = HashMap::with_capacity(monitors.len());
        for monitor in monitors {
            if !self.monitors.contains_key(&monitor.uuid) {
                let last = self.database.latest_check(monitor.uuid).await?.map(|c| c.checked_at);
                if let Some(last) = last {
                    self.last_checked.insert(monitor.uuid, last);
                }

                let at = match last {
                    Some(last) => last + chrono::Duration::seconds(monitor.interval_seconds as i64),
                    None => now,
                };
                self.push_due(monitor.uuid, at);
                debug!("Scheduling monitor {} ({})", monitor.name, monitor.uuid);
            }
            refreshed.insert(monitor.uuid, monitor);
        }

        self.last_checked.retain(|uuid, _| refreshed.contains_key(uuid));
        self.monitors = refreshed;
        Ok(())
    }

    fn push_due(&mut self, monitor_uuid: Uuid, at: DateTime<Utc>) {
        if self.scheduled.insert(monitor_uuid) {
            self.due.push(Reverse(DueEntry { at, monitor_uuid }));
        }
    }

    fn next_due_delay(&self, now: DateTime<Utc>) -> Duration {
        match self.due.peek() {
            Some(Reverse(entry)) => (entry.at - now).to_std().unwrap_or(Duration::ZERO),
            None => IDLE_WAIT,
        }
    }

    /// Pop every entry that has come due and launch its check.
    fn launch_due(&mut self, done_tx: &mpsc::Sender<CompletedCheck>, now: DateTime<Utc>) {
        while let Some(Reverse(entry)) = self.due.peek() {
            if entry.at > now {
                break;
            }
            let entry = self.due.pop().expect("peeked entry").0;
            self.scheduled.remove(&entry.monitor_uuid);

            let Some(monitor) = self.monitors.get(&entry.monitor_uuid).cloned() else {
                continue; // monitor deleted or disabled since arming
            };

            if self.in_flight.contains(&monitor.uuid) {
                continue; // completion will re-arm
            }

            // A manual run may have checked this monitor since it was
            // armed; honor the interval instead of probing early.
            if !is_due(self.last_checked.get(&monitor.uuid).copied(), monitor.interval_seconds, now)
            {
                let last = self.last_checked[&monitor.uuid];
                let at = last + chrono::Duration::seconds(monitor.interval_seconds as i64);
                self.push_due(monitor.uuid, at);
                continue;
            }

            self.spawn_check(monitor, done_tx);
        }
    }

    fn spawn_check(&mut self, monitor: Monitor, done_tx: &mpsc::Sender<CompletedCheck>) {
        debug!("Checking monitor {} ({})", monitor.name, monitor.url);
        self.in_flight.insert(monitor.uuid);

        let runner = self.runner.clone();
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let check = runner.run(&monitor).await;
            // The scheduler owns persistence; a dropped receiver only
            // happens on shutdown after drain.
            let _ = done_tx.send(CompletedCheck { monitor, check }).await;
        });
    }

    /// Serialized completion path: persist the check, apply the incident
    /// transition, fan out any event, and re-arm the monitor.
    pub(crate) async fn on_complete(&mut self, done: CompletedCheck) {
        let CompletedCheck { monitor, check } = done;
        self.in_flight.remove(&monitor.uuid);
        self.last_checked.insert(monitor.uuid, check.checked_at);

        info!(
            "Monitor {}: {}{}",
            monitor.name,
            if check.is_up { "UP" } else { "DOWN" },
            check.response_time_ms.map(|ms| format!(" ({ms}ms)")).unwrap_or_default()
        );

        match self.tracker.apply(&monitor, &check).await {
            Ok(Some(event)) => {
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.dispatch(&event).await;
                });
            }
            Ok(None) => {}
            Err(err) => {
                // The tracker did not advance; the next check of this
                // monitor re-derives the same transition.
                error!("Failed to persist check for monitor {}: {err:#}", monitor.name);
            }
        }

        if self.monitors.contains_key(&monitor.uuid) {
            let at = check.checked_at + chrono::Duration::seconds(monitor.interval_seconds as i64);
            self.push_due(monitor.uuid, at);
        }
    }

    async fn handle_command(
        &mut self,
        cmd: SchedulerCommand,
        done_tx: &mpsc::Sender<CompletedCheck>,
    ) {
        match cmd {
            SchedulerCommand::RunNow(monitor_uuid) => {
                let Some(monitor) = self.monitors.get(&monitor_uuid).cloned() else {
                    warn!("RunNow for unknown monitor {monitor_uuid}");
                    return;
                };
                if self.in_flight.contains(&monitor_uuid) {
                    debug!("RunNow skipped, check already in flight for {monitor_uuid}");
                    return;
                }
                self.spawn_check(monitor, done_tx);
            }
            SchedulerCommand::RunDuePass => {
                self.run_due_pass(done_tx, Utc::now());
            }
            SchedulerCommand::Cleanup => {
                let retention = self.retention.clone();
                tokio::spawn(async move {
                    if let Err(err) = retention.cleanup_expired().await {
                        warn!("Manual retention cleanup failed: {err:#}");
                    }
                });
            }
        }
    }

    /// Launch checks for every due monitor; a pass over monitors that are
    /// all up to date launches nothing.
    pub(crate) fn run_due_pass(&mut self, done_tx: &mpsc::Sender<CompletedCheck>, now: DateTime<Utc>) {
        let due: Vec<Monitor> = self
            .monitors
            .values()
            .filter(|m| {
                !self.in_flight.contains(&m.uuid)
                    && is_due(self.last_checked.get(&m.uuid).copied(), m.interval_seconds, now)
            })
            .cloned()
            .collect();

        for monitor in due {
            self.spawn_check(monitor, done_tx);
        }
    }

    #[cfg(test)]
    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
