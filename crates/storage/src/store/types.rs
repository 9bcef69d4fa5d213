#![forbid(unsafe_code)]

use fleet_core::{OwnerId, RecordId, Role, RunnerRecord};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerRow {
    pub id: OwnerId,
    pub username: String,
    pub role: Role,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug)]
pub struct OwnerCreateRequest {
    pub username: String,
    pub role: Role,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnerPromotion {
    Created(OwnerRow),
    Promoted(OwnerRow),
}

impl OwnerPromotion {
    pub fn owner(&self) -> &OwnerRow {
        match self {
            OwnerPromotion::Created(row) | OwnerPromotion::Promoted(row) => row,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunnerInsertRequest {
    pub owner_id: OwnerId,
    pub token: String,
    pub display_name: String,
    pub endpoint_url: String,
    /// Defaults to the current time. Set explicitly only when importing existing runners.
    pub created_at_ms: Option<i64>,
}

/// A record joined with its owner (left join: the owner columns may be absent).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedRunnerRow {
    pub record: RunnerRecord,
    pub owner_username: Option<String>,
    pub owner_role: Option<Role>,
}

/// Garbage-collection candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaleRunnerRow {
    pub id: RecordId,
    pub owner_id: OwnerId,
    pub token: String,
    pub created_at_ms: i64,
    pub owner_role: Option<Role>,
}
