#![forbid(unsafe_code)]

//! Runner fleet lifecycle: drives an external CI runner binary and keeps the ownership store
//! in step with it.

pub mod config;
pub mod error;
pub mod invoker;
pub mod lifecycle;
pub mod live_state;
pub mod runner_cli;
pub mod scheduler;
pub mod service;

pub use config::FleetConfig;
pub use error::{ExecutionError, LifecycleError, RegistrationStage};
pub use invoker::{ProcessInvoker, ProcessOutput, ShellInvoker};
pub use lifecycle::{
    GcCandidate, GcOutcome, GcReport, RegisterRequest, RegistrationAttempt, RegistrationState,
    RetentionPolicy, RunnerLifecycle, RunnerListing, RunnerView,
};
pub use runner_cli::{ExternalRegistration, RunnerCli};
pub use scheduler::{CleanupScheduler, DailySchedule};
pub use service::FleetService;
