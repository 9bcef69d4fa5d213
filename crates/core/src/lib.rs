#![forbid(unsafe_code)]

pub mod description;
pub mod ids;
pub mod model;
pub mod shell;

pub use description::{AttemptMarker, DisplayNameError};
pub use ids::{OwnerId, RecordId};
pub use model::{CallerContext, LiveRunnerStatus, Role, RunnerRecord, RunnerStatus, UnknownRole};
