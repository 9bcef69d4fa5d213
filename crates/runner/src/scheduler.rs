#![forbid(unsafe_code)]

//! Daily cleanup: one owned background task that runs a GC sweep at a fixed time of day.

use crate::error::LifecycleError;
use crate::lifecycle::GcReport;
use crate::service::FleetService;
use chrono::{DateTime, Days, FixedOffset, NaiveTime, Offset, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

/// A wall-clock time in a fixed UTC offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DailySchedule {
    pub at: NaiveTime,
    pub offset: FixedOffset,
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self {
            at: NaiveTime::MIN,
            offset: Utc.fix(),
        }
    }
}

impl DailySchedule {
    pub fn new(at: NaiveTime, offset: FixedOffset) -> Self {
        Self { at, offset }
    }

    /// First firing strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut date = now.with_timezone(&self.offset).date_naive();
        loop {
            let candidate = self
                .offset
                .from_local_datetime(&date.and_time(self.at))
                .single()
                .map(|local| local.with_timezone(&Utc));
            match candidate {
                Some(candidate) if candidate > now => return candidate,
                _ => {}
            }
            date = match date.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => return DateTime::<Utc>::MAX_UTC,
            };
        }
    }
}

#[derive(Debug)]
struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
pub struct CleanupScheduler {
    service: FleetService,
    schedule: DailySchedule,
    sweep_guard: Arc<Mutex<()>>,
    running: Option<RunningTask>,
}

impl CleanupScheduler {
    pub fn new(service: FleetService, schedule: DailySchedule) -> Self {
        Self {
            service,
            schedule,
            sweep_guard: Arc::new(Mutex::new(())),
            running: None,
        }
    }

    pub fn schedule(&self) -> DailySchedule {
        self.schedule
    }

    /// Spawns the background task on the current tokio runtime. Returns false when it is
    /// already running.
    pub fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(
            self.service.clone(),
            self.schedule,
            Arc::clone(&self.sweep_guard),
            shutdown_rx,
        ));
        tracing::info!(
            at = %self.schedule.at,
            offset = %self.schedule.offset,
            "cleanup scheduler started"
        );
        self.running = Some(RunningTask { shutdown, handle });
        true
    }

    /// Signals the task and waits for it. A sweep in flight is allowed to finish first.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(err) = running.handle.await {
            tracing::error!(%err, "cleanup scheduler task ended abnormally");
        }
        tracing::info!("cleanup scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Runs one sweep right away. `None` means a sweep was already in progress and this
    /// trigger was skipped.
    pub async fn run_now(&self) -> Option<Result<GcReport, LifecycleError>> {
        guarded_sweep(&self.service, &self.sweep_guard, "manual").await
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.shutdown.send(true);
        }
    }
}

async fn run_loop(
    service: FleetService,
    schedule: DailySchedule,
    sweep_guard: Arc<Mutex<()>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_fire = Utc::now();
    loop {
        let now = Utc::now();
        let next = schedule.next_after(now.max(last_fire));
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::debug!(%next, "next cleanup sweep scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                last_fire = next;
                guarded_sweep(&service, &sweep_guard, "scheduled").await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn guarded_sweep(
    service: &FleetService,
    sweep_guard: &Mutex<()>,
    trigger: &'static str,
) -> Option<Result<GcReport, LifecycleError>> {
    let Ok(_sweeping) = sweep_guard.try_lock() else {
        tracing::info!(trigger, "gc sweep already running; skipping this trigger");
        return None;
    };
    let result = service.gc_sweep().await;
    if let Err(err) = &result {
        tracing::error!(trigger, %err, "gc sweep failed");
    }
    Some(result)
}
