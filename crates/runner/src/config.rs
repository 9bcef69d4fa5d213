#![forbid(unsafe_code)]

use crate::invoker::{DEFAULT_COMMAND_TIMEOUT, ShellInvoker};
use crate::lifecycle::{RetentionPolicy, RunnerLifecycle};
use crate::runner_cli::{DEFAULT_EXECUTOR, DEFAULT_RUNNER_PROGRAM, RunnerCli};
use crate::scheduler::DailySchedule;
use crate::service::FleetService;
use fleet_storage::{SqliteStore, StoreError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_STORAGE_DIR: &str = ".runner-fleet";

#[derive(Clone, Debug)]
pub struct FleetConfig {
    pub storage_dir: PathBuf,
    pub runner_program: String,
    pub executor: String,
    pub command_timeout: Duration,
    pub retention: RetentionPolicy,
    pub cleanup: DailySchedule,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            runner_program: DEFAULT_RUNNER_PROGRAM.to_string(),
            executor: DEFAULT_EXECUTOR.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            retention: RetentionPolicy::default(),
            cleanup: DailySchedule::default(),
        }
    }
}

impl FleetConfig {
    pub fn open_store(&self) -> Result<SqliteStore, StoreError> {
        SqliteStore::open(&self.storage_dir)
    }

    pub fn runner_cli(&self) -> RunnerCli {
        RunnerCli::new(Arc::new(ShellInvoker::new(self.command_timeout)))
            .with_program(self.runner_program.clone())
            .with_executor(self.executor.clone())
    }

    /// Opens the store and wires the real runner binary behind a [`FleetService`].
    pub fn open_service(&self) -> Result<FleetService, StoreError> {
        let store = self.open_store()?;
        tracing::debug!(
            storage_dir = %self.storage_dir.display(),
            program = %self.runner_program,
            timeout_ms = self.command_timeout.as_millis() as u64,
            "fleet service configured"
        );
        let lifecycle = RunnerLifecycle::new(store, self.runner_cli());
        Ok(FleetService::new(lifecycle, self.retention))
    }
}
