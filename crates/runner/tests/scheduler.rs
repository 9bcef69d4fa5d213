#![forbid(unsafe_code)]

mod support;

use chrono::{Duration as ChronoDuration, Offset, Utc};
use fleet_core::Role;
use fleet_runner::{CleanupScheduler, DailySchedule, FleetService, RetentionPolicy};
use std::sync::Arc;
use std::time::Duration;
use support::{DAY_MS, FakeRunnerBinary, Fleet};
use tempfile::TempDir;

fn into_service(fleet: Fleet) -> (FleetService, TempDir, Arc<FakeRunnerBinary>) {
    let Fleet {
        dir,
        binary,
        lifecycle,
    } = fleet;
    (
        FleetService::new(lifecycle, RetentionPolicy::default()),
        dir,
        binary,
    )
}

#[tokio::test]
async fn start_and_stop_own_the_background_task() {
    let (service, _dir, _binary) = into_service(Fleet::new());
    let mut scheduler = CleanupScheduler::new(service, DailySchedule::default());

    assert!(!scheduler.is_running());
    assert!(scheduler.start());
    assert!(scheduler.is_running());
    assert!(!scheduler.start(), "second start is a no-op");

    scheduler.stop().await;
    assert!(!scheduler.is_running());
    scheduler.stop().await;

    assert!(scheduler.start(), "can be restarted after stop");
    scheduler.stop().await;
}

#[tokio::test]
async fn run_now_sweeps_immediately() {
    let fleet = Fleet::new();
    let alice = fleet.owner("alice", Role::User);
    let old = fleet.existing_runner(alice, "glrt-old", 40 * DAY_MS);
    let (service, _dir, binary) = into_service(fleet);
    let scheduler = CleanupScheduler::new(service.clone(), DailySchedule::default());

    let report = scheduler
        .run_now()
        .await
        .expect("not skipped")
        .expect("sweep succeeds");
    assert_eq!(report.deleted, 1);
    assert_eq!(report.candidates[0].record_id, old.id);
    assert!(binary.live_tokens().is_empty());
    assert_eq!(
        service.lifecycle().store().lock().runners_count().expect("count"),
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduled_sweep_fires_at_the_configured_time() {
    let fleet = Fleet::new();
    let alice = fleet.owner("alice", Role::User);
    fleet.existing_runner(alice, "glrt-old", 40 * DAY_MS);
    let (service, _dir, binary) = into_service(fleet);

    let fire_at = Utc::now() + ChronoDuration::seconds(2);
    let schedule = DailySchedule::new(fire_at.time(), Utc.fix());
    let mut scheduler = CleanupScheduler::new(service.clone(), schedule);
    assert!(scheduler.start());

    let swept = tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let remaining = service
                .lifecycle()
                .store()
                .lock()
                .runners_count()
                .expect("count");
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    scheduler.stop().await;

    assert!(swept.is_ok(), "sweep did not run within the deadline");
    assert_eq!(binary.count("unregister"), 1);
}
