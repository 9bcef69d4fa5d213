#![forbid(unsafe_code)]

use fleet_core::RecordId;
use fleet_storage::StoreError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The runner binary could not be run to a successful exit.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {}: {}", exit_label(.code), .stderr.trim())]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("`{program}` timed out after {after:?}")]
    TimedOut { program: String, after: Duration },
    #[error("invocation task failed: {0}")]
    Join(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationStage {
    Validate,
    Invoke,
    Correlate,
    Persist,
}

impl fmt::Display for RegistrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegistrationStage::Validate => "validate",
            RegistrationStage::Invoke => "invoke",
            RegistrationStage::Correlate => "correlate",
            RegistrationStage::Persist => "persist",
        })
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("runner binary: {0}")]
    Execution(#[from] ExecutionError),
    #[error("no live runner matches description '{description}'")]
    ParseMismatch { description: String },
    #[error("runner record not found")]
    NotFound,
    #[error("not allowed to manage runner record {record_id}")]
    Forbidden { record_id: RecordId },
    #[error("runner token already recorded")]
    Conflict { token: String },
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("store: {0}")]
    Store(StoreError),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("registration failed at {stage} (compensated={compensated}): {source}")]
    Registration {
        stage: RegistrationStage,
        compensated: bool,
        #[source]
        source: Box<LifecycleError>,
    },
}

impl LifecycleError {
    /// Declined operations surface to the caller as-is; everything else is a failure of the
    /// system rather than of the request.
    pub fn is_declined(&self) -> bool {
        matches!(
            self,
            LifecycleError::NotFound
                | LifecycleError::Forbidden { .. }
                | LifecycleError::Conflict { .. }
                | LifecycleError::InvalidInput(_)
        )
    }
}

impl From<StoreError> for LifecycleError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => LifecycleError::NotFound,
            StoreError::Conflict { token } => LifecycleError::Conflict { token },
            StoreError::InvalidInput(message) => LifecycleError::InvalidInput(message),
            other => LifecycleError::Store(other),
        }
    }
}
