#![forbid(unsafe_code)]

//! Async facade over [`RunnerLifecycle`]. Every call runs on its own blocking task so that a
//! slow runner binary never stalls unrelated requests or the cleanup scheduler.

use crate::error::LifecycleError;
use crate::lifecycle::{
    GcReport, RegisterRequest, RetentionPolicy, RunnerLifecycle, RunnerListing,
};
use chrono::Utc;
use fleet_core::{CallerContext, RecordId, RunnerRecord};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct FleetService {
    lifecycle: Arc<RunnerLifecycle>,
    retention: RetentionPolicy,
}

impl FleetService {
    pub fn new(lifecycle: RunnerLifecycle, retention: RetentionPolicy) -> Self {
        Self {
            lifecycle: Arc::new(lifecycle),
            retention,
        }
    }

    pub fn lifecycle(&self) -> &Arc<RunnerLifecycle> {
        &self.lifecycle
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    pub async fn list(&self, caller: CallerContext) -> Result<RunnerListing, LifecycleError> {
        self.blocking(move |lifecycle| lifecycle.list(caller)).await
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<RunnerRecord, LifecycleError> {
        self.blocking(move |lifecycle| lifecycle.register(request)).await
    }

    pub async fn delete(
        &self,
        caller: CallerContext,
        record_id: RecordId,
    ) -> Result<RunnerRecord, LifecycleError> {
        self.blocking(move |lifecycle| lifecycle.delete(caller, record_id))
            .await
    }

    /// One sweep with the configured retention, measured from the current time.
    pub async fn gc_sweep(&self) -> Result<GcReport, LifecycleError> {
        let policy = self.retention;
        self.blocking(move |lifecycle| lifecycle.gc_sweep(policy, Utc::now())).await
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, LifecycleError>
    where
        T: Send + 'static,
        F: FnOnce(&RunnerLifecycle) -> Result<T, LifecycleError> + Send + 'static,
    {
        let lifecycle = Arc::clone(&self.lifecycle);
        tokio::task::spawn_blocking(move || op(&lifecycle))
            .await
            .map_err(|err| LifecycleError::Task(err.to_string()))?
    }
}
