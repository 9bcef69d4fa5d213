#![forbid(unsafe_code)]

use super::{RunnerLifecycle, token_hint};
use crate::error::LifecycleError;
use chrono::{DateTime, Months, Utc};
use fleet_core::{OwnerId, RecordId, Role};
use fleet_storage::{StaleRunnerRow, StoreError};
use serde::{Serialize, Serializer};

/// How long a runner may live before the sweep removes it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub months: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { months: 1 }
    }
}

impl RetentionPolicy {
    pub fn new(months: u32) -> Self {
        Self { months }
    }

    /// Calendar-month subtraction; the day is clamped to the end of a shorter month.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_months(Months::new(self.months))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GcOutcome {
    SkippedAdmin,
    Deleted,
    UnregisterFailed { error: String },
    DeleteFailed { error: String },
}

impl GcOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            GcOutcome::UnregisterFailed { .. } | GcOutcome::DeleteFailed { .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GcCandidate {
    #[serde(serialize_with = "record_id_raw")]
    pub record_id: RecordId,
    #[serde(serialize_with = "owner_id_raw")]
    pub owner_id: OwnerId,
    pub created_at_ms: i64,
    #[serde(flatten)]
    pub outcome: GcOutcome,
}

fn record_id_raw<S: Serializer>(id: &RecordId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(id.get())
}

fn owner_id_raw<S: Serializer>(id: &OwnerId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(id.get())
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub cutoff_ms: i64,
    pub scanned: usize,
    pub skipped_admin: usize,
    pub deleted: usize,
    pub failed: usize,
    pub candidates: Vec<GcCandidate>,
}

impl GcReport {
    fn record(&mut self, row: &StaleRunnerRow, outcome: GcOutcome) {
        match &outcome {
            GcOutcome::SkippedAdmin => self.skipped_admin += 1,
            GcOutcome::Deleted => self.deleted += 1,
            GcOutcome::UnregisterFailed { .. } | GcOutcome::DeleteFailed { .. } => {
                self.failed += 1
            }
        }
        self.candidates.push(GcCandidate {
            record_id: row.id,
            owner_id: row.owner_id,
            created_at_ms: row.created_at_ms,
            outcome,
        });
    }
}

impl RunnerLifecycle {
    /// Removes runners created before the policy cutoff, except those owned by admins.
    ///
    /// Only selecting candidates can fail the sweep. Each candidate is handled on its own: a
    /// record is deleted only after the binary confirmed the unregister, and a failure leaves
    /// the record for the next sweep.
    pub fn gc_sweep(
        &self,
        policy: RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<GcReport, LifecycleError> {
        let cutoff_ms = policy.cutoff(now).timestamp_millis();
        let stale = self.store.lock().runners_created_before(cutoff_ms)?;

        let mut report = GcReport {
            cutoff_ms,
            scanned: stale.len(),
            ..GcReport::default()
        };
        for row in &stale {
            let outcome = self.sweep_one(row);
            report.record(row, outcome);
        }

        tracing::info!(
            cutoff_ms,
            scanned = report.scanned,
            skipped_admin = report.skipped_admin,
            deleted = report.deleted,
            failed = report.failed,
            "gc sweep finished"
        );
        Ok(report)
    }

    fn sweep_one(&self, row: &StaleRunnerRow) -> GcOutcome {
        if row.owner_role == Some(Role::Admin) {
            tracing::info!(
                record_id = %row.id,
                owner_id = %row.owner_id,
                "gc: skipping admin-owned runner"
            );
            return GcOutcome::SkippedAdmin;
        }

        if let Err(err) = self.cli.unregister_by_token(&row.token) {
            tracing::warn!(
                record_id = %row.id,
                token = token_hint(&row.token),
                %err,
                "gc: unregister failed; record left for a later sweep"
            );
            return GcOutcome::UnregisterFailed {
                error: err.to_string(),
            };
        }

        let deleted = self.store.lock().runner_delete(row.id);
        match deleted {
            Ok(()) | Err(StoreError::NotFound) => {
                tracing::info!(record_id = %row.id, owner_id = %row.owner_id, "gc: runner deleted");
                GcOutcome::Deleted
            }
            Err(err) => {
                tracing::warn!(
                    record_id = %row.id,
                    %err,
                    "gc: unregistered but record delete failed"
                );
                GcOutcome::DeleteFailed {
                    error: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
