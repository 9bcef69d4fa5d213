#![forbid(unsafe_code)]

use super::*;
use fleet_core::{OwnerId, Role};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, params};

const MAX_USERNAME_LEN: usize = 64;

fn normalize_username(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("username must not be empty"));
    }
    if raw.len() > MAX_USERNAME_LEN {
        return Err(StoreError::InvalidInput("username is too long"));
    }
    if !raw
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
    {
        return Err(StoreError::InvalidInput(
            "username may only contain [A-Za-z0-9._-]",
        ));
    }
    Ok(raw.to_string())
}

pub(super) fn read_role(row: &rusqlite::Row<'_>, idx: usize) -> Result<Role, rusqlite::Error> {
    let raw: String = row.get(idx)?;
    raw.parse::<Role>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

pub(super) fn read_optional_role(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> Result<Option<Role>, rusqlite::Error> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        value.parse::<Role>().map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
        })
    })
    .transpose()
}

fn read_owner_row(row: &rusqlite::Row<'_>) -> Result<OwnerRow, rusqlite::Error> {
    Ok(OwnerRow {
        id: OwnerId::new(row.get(0)?),
        username: row.get(1)?,
        role: read_role(row, 2)?,
        created_at_ms: row.get(3)?,
    })
}

impl SqliteStore {
    pub fn owner_create(&mut self, request: OwnerCreateRequest) -> Result<OwnerRow, StoreError> {
        let username = normalize_username(&request.username)?;
        let created_at_ms = now_ms();

        let insert = self.conn.execute(
            "INSERT INTO owners(username, role, created_at_ms) VALUES (?1, ?2, ?3)",
            params![username.as_str(), request.role.as_str(), created_at_ms],
        );
        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                return Err(StoreError::InvalidInput("username is already taken"));
            }
            return Err(err.into());
        }

        Ok(OwnerRow {
            id: OwnerId::new(self.conn.last_insert_rowid()),
            username,
            role: request.role,
            created_at_ms,
        })
    }

    pub fn owner_get(&self, id: OwnerId) -> Result<OwnerRow, StoreError> {
        self.conn
            .query_row(
                "SELECT id, username, role, created_at_ms FROM owners WHERE id=?1",
                params![id.get()],
                read_owner_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub fn owner_find_by_username(&self, username: &str) -> Result<Option<OwnerRow>, StoreError> {
        let username = normalize_username(username)?;
        Ok(self
            .conn
            .query_row(
                "SELECT id, username, role, created_at_ms FROM owners WHERE username=?1",
                params![username.as_str()],
                read_owner_row,
            )
            .optional()?)
    }

    /// Makes `username` an admin, creating the account if it does not exist yet.
    pub fn owner_promote_admin(&mut self, username: &str) -> Result<OwnerPromotion, StoreError> {
        let username = normalize_username(username)?;
        let tx = self.conn.transaction()?;

        let existing = tx
            .query_row(
                "SELECT id, username, role, created_at_ms FROM owners WHERE username=?1",
                params![username.as_str()],
                read_owner_row,
            )
            .optional()?;

        let promotion = match existing {
            Some(mut owner) => {
                tx.execute(
                    "UPDATE owners SET role=?1 WHERE id=?2",
                    params![Role::Admin.as_str(), owner.id.get()],
                )?;
                owner.role = Role::Admin;
                OwnerPromotion::Promoted(owner)
            }
            None => {
                let created_at_ms = now_ms();
                tx.execute(
                    "INSERT INTO owners(username, role, created_at_ms) VALUES (?1, ?2, ?3)",
                    params![username.as_str(), Role::Admin.as_str(), created_at_ms],
                )?;
                OwnerPromotion::Created(OwnerRow {
                    id: OwnerId::new(tx.last_insert_rowid()),
                    username,
                    role: Role::Admin,
                    created_at_ms,
                })
            }
        };

        tx.commit()?;
        Ok(promotion)
    }

    /// Removes the owner and, through the foreign key, every runner record it owns.
    pub fn owner_delete(&mut self, id: OwnerId) -> Result<(), StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM owners WHERE id=?1", params![id.get()])?;
        if removed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
