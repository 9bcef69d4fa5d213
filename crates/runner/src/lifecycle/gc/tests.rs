use super::*;
use chrono::TimeZone;

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().expect("valid date")
}

#[test]
fn default_retention_is_one_calendar_month() {
    let policy = RetentionPolicy::default();
    assert_eq!(policy.cutoff(at(2026, 10, 16)), at(2026, 9, 16));
}

#[test]
fn cutoff_clamps_to_month_end() {
    let policy = RetentionPolicy::new(1);
    assert_eq!(policy.cutoff(at(2026, 3, 31)), at(2026, 2, 28));
    assert_eq!(policy.cutoff(at(2024, 3, 31)), at(2024, 2, 29));
}

#[test]
fn zero_months_cuts_off_at_now() {
    let now = at(2026, 1, 1);
    assert_eq!(RetentionPolicy::new(0).cutoff(now), now);
}

#[test]
fn report_counts_each_outcome() {
    let row = StaleRunnerRow {
        id: RecordId::new(1),
        owner_id: OwnerId::new(2),
        token: "glrt-1".to_string(),
        created_at_ms: 10,
        owner_role: None,
    };
    let mut report = GcReport::default();
    report.record(&row, GcOutcome::Deleted);
    report.record(&row, GcOutcome::SkippedAdmin);
    report.record(
        &row,
        GcOutcome::UnregisterFailed {
            error: "boom".to_string(),
        },
    );
    assert_eq!(
        (report.deleted, report.skipped_admin, report.failed),
        (1, 1, 1)
    );
    assert!(report.candidates[2].outcome.is_failure());
}

#[test]
fn candidate_serializes_with_flat_outcome_tag() {
    let candidate = GcCandidate {
        record_id: RecordId::new(5),
        owner_id: OwnerId::new(9),
        created_at_ms: 1_000,
        outcome: GcOutcome::DeleteFailed {
            error: "locked".to_string(),
        },
    };
    let value = serde_json::to_value(&candidate).expect("serialize");
    assert_eq!(value["outcome"], "delete_failed");
    assert_eq!(value["error"], "locked");
    assert_eq!(value["record_id"], 5);
}
