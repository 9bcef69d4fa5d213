#![forbid(unsafe_code)]

use crate::ids::{OwnerId, RecordId};
use std::fmt;
use std::str::FromStr;

pub const OFFLINE_STATUS: &str = "offline";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role '{}' (expected admin|user)", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("admin") {
            Ok(Role::Admin)
        } else if trimmed.eq_ignore_ascii_case("user") {
            Ok(Role::User)
        } else {
            Err(UnknownRole(trimmed.to_string()))
        }
    }
}

/// Persisted ownership record of one registered runner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerRecord {
    pub id: RecordId,
    pub owner_id: OwnerId,
    /// Assigned by the runner binary at registration; unique across all records.
    pub token: String,
    pub display_name: String,
    pub endpoint_url: String,
    pub created_at_ms: i64,
}

/// One entry of the runner binary's `list` output. Derived on every query, never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveRunnerStatus {
    pub name: String,
    pub token: String,
    pub executor_status: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunnerStatus {
    Live(String),
    Offline,
}

impl RunnerStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunnerStatus::Live(status) => status.as_str(),
            RunnerStatus::Offline => OFFLINE_STATUS,
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, RunnerStatus::Offline)
    }
}

/// Identity of whoever drives a lifecycle call. Supplied by the authentication layer and
/// trusted as-is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallerContext {
    pub caller_id: OwnerId,
    pub role: Role,
}

impl CallerContext {
    pub const fn new(caller_id: OwnerId, role: Role) -> Self {
        Self { caller_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins manage every record; everyone else only their own.
    pub fn may_manage(&self, owner_id: OwnerId) -> bool {
        self.is_admin() || self.caller_id == owner_id
    }
}
