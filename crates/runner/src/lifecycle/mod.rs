#![forbid(unsafe_code)]

//! Runner lifecycle: reconciles persisted ownership records with the runner binary's live
//! state and drives register / delete / garbage collection against both.
//!
//! Everything here is blocking. [`crate::service::FleetService`] moves each call onto its
//! own blocking task.

mod gc;
mod registration;

pub use gc::{GcCandidate, GcOutcome, GcReport, RetentionPolicy};
pub use registration::{RegisterRequest, RegistrationAttempt, RegistrationState};

use crate::error::LifecycleError;
use crate::live_state;
use crate::runner_cli::RunnerCli;
use fleet_core::description::AttemptMarker;
use fleet_core::{CallerContext, RecordId, RunnerRecord, RunnerStatus};
use fleet_storage::{SqliteStore, StoreError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerView {
    pub record: RunnerRecord,
    pub owner_username: Option<String>,
    pub status: RunnerStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunnerListing {
    pub runners: Vec<RunnerView>,
    /// False when the runner binary could not be queried and every status fell back to
    /// offline.
    pub live_state_available: bool,
}

#[derive(Debug)]
pub struct RunnerLifecycle {
    store: Arc<Mutex<SqliteStore>>,
    cli: RunnerCli,
    attempts: AtomicU64,
}

impl RunnerLifecycle {
    pub fn new(store: SqliteStore, cli: RunnerCli) -> Self {
        Self::with_shared_store(Arc::new(Mutex::new(store)), cli)
    }

    pub fn with_shared_store(store: Arc<Mutex<SqliteStore>>, cli: RunnerCli) -> Self {
        Self {
            store,
            cli,
            attempts: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<Mutex<SqliteStore>> {
        &self.store
    }

    pub fn cli(&self) -> &RunnerCli {
        &self.cli
    }

    /// Records visible to `caller` (all of them for admins) with their live status.
    pub fn list(&self, caller: CallerContext) -> Result<RunnerListing, LifecycleError> {
        let rows = {
            let store = self.store.lock();
            if caller.is_admin() {
                store.runners_list_all()?
            } else {
                store.runners_list_by_owner(caller.caller_id)?
            }
        };

        let live = match self.cli.list() {
            Ok(live) => Some(live),
            Err(err) => {
                tracing::warn!(
                    %err,
                    "live runner state unavailable; reporting all runners offline"
                );
                None
            }
        };
        let index = live.as_deref().map(live_state::index_by_token);

        let runners = rows
            .into_iter()
            .map(|row| {
                let status = index
                    .as_ref()
                    .and_then(|index| index.get(row.record.token.as_str()))
                    .map(|live| RunnerStatus::Live(live.executor_status.clone()))
                    .unwrap_or(RunnerStatus::Offline);
                RunnerView {
                    record: row.record,
                    owner_username: row.owner_username,
                    status,
                }
            })
            .collect();

        Ok(RunnerListing {
            runners,
            live_state_available: live.is_some(),
        })
    }

    /// Registers a runner with the binary and records it. Either both happen or neither
    /// does (best effort: see [`RegistrationAttempt`]).
    pub fn register(&self, request: RegisterRequest) -> Result<RunnerRecord, LifecycleError> {
        let owner_id = request.owner_id;
        let mut attempt = RegistrationAttempt::prepare(request, self.next_marker())?;

        // Nothing may reach the binary for an owner the store cannot reference.
        let owner = self.store.lock().owner_get(owner_id);
        match owner {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                tracing::info!(%owner_id, "register refused: unknown owner");
                return Err(LifecycleError::InvalidInput("unknown owner"));
            }
            Err(err) => return Err(err.into()),
        }

        attempt.run(&self.cli, &self.store)
    }

    /// Unregisters the runner behind `record_id` and then drops the record. The record is
    /// kept whenever the binary does not confirm the unregister.
    pub fn delete(
        &self,
        caller: CallerContext,
        record_id: RecordId,
    ) -> Result<RunnerRecord, LifecycleError> {
        let record = self.store.lock().runner_get(record_id)?;
        if !caller.may_manage(record.owner_id) {
            tracing::info!(
                %record_id,
                caller_id = %caller.caller_id,
                owner_id = %record.owner_id,
                "delete refused: caller does not own the runner"
            );
            return Err(LifecycleError::Forbidden { record_id });
        }

        if let Err(err) = self.cli.unregister_by_token(&record.token) {
            tracing::warn!(
                %record_id,
                token = token_hint(&record.token),
                %err,
                "unregister failed; keeping record"
            );
            return Err(err.into());
        }

        let deleted = self.store.lock().runner_delete(record_id);
        match deleted {
            Ok(()) => {}
            Err(StoreError::NotFound) => {
                tracing::debug!(%record_id, "record already removed by a concurrent delete");
            }
            Err(err) => return Err(err.into()),
        }
        tracing::info!(%record_id, owner_id = %record.owner_id, "runner deleted");
        Ok(record)
    }

    fn next_marker(&self) -> AttemptMarker {
        let unix_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        AttemptMarker {
            unix_nanos,
            seq: self.attempts.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// Leading characters of a token, enough to tell runners apart in logs.
pub(crate) fn token_hint(token: &str) -> &str {
    match token.char_indices().nth(8) {
        Some((idx, _)) => &token[..idx],
        None => token,
    }
}
