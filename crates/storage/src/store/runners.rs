#![forbid(unsafe_code)]

use super::owners::read_optional_role;
use super::*;
use fleet_core::{OwnerId, RecordId, RunnerRecord};
use rusqlite::{OptionalExtension, params};

const MAX_TOKEN_LEN: usize = 256;
const MAX_NAME_LEN: usize = 1024;
const MAX_URL_LEN: usize = 2048;

const SELECT_RUNNER: &str = "SELECT id, owner_id, token, name, url, created_at_ms FROM runners";

const SELECT_OWNED_RUNNER: &str = r#"
            SELECT r.id, r.owner_id, r.token, r.name, r.url, r.created_at_ms, o.username, o.role
            FROM runners r
            LEFT JOIN owners o ON o.id = r.owner_id
"#;

fn normalize_token(raw: &str) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput("runner token must not be empty"));
    }
    if raw.len() > MAX_TOKEN_LEN {
        return Err(StoreError::InvalidInput("runner token is too long"));
    }
    if raw.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(StoreError::InvalidInput(
            "runner token must not contain whitespace",
        ));
    }
    Ok(raw.to_string())
}

fn normalize_text(
    raw: &str,
    max_len: usize,
    empty: &'static str,
    long: &'static str,
) -> Result<String, StoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(StoreError::InvalidInput(empty));
    }
    if raw.len() > max_len {
        return Err(StoreError::InvalidInput(long));
    }
    Ok(raw.to_string())
}

fn read_runner_row(row: &rusqlite::Row<'_>) -> Result<RunnerRecord, rusqlite::Error> {
    Ok(RunnerRecord {
        id: RecordId::new(row.get(0)?),
        owner_id: OwnerId::new(row.get(1)?),
        token: row.get(2)?,
        display_name: row.get(3)?,
        endpoint_url: row.get(4)?,
        created_at_ms: row.get(5)?,
    })
}

fn read_owned_runner_row(row: &rusqlite::Row<'_>) -> Result<OwnedRunnerRow, rusqlite::Error> {
    Ok(OwnedRunnerRow {
        record: read_runner_row(row)?,
        owner_username: row.get(6)?,
        owner_role: read_optional_role(row, 7)?,
    })
}

impl SqliteStore {
    /// Persists a new record. Fails with [`StoreError::Conflict`] when the token is already
    /// recorded; the existing row is left as it was.
    pub fn runner_insert(
        &mut self,
        request: RunnerInsertRequest,
    ) -> Result<RunnerRecord, StoreError> {
        let token = normalize_token(&request.token)?;
        let display_name = normalize_text(
            &request.display_name,
            MAX_NAME_LEN,
            "runner name must not be empty",
            "runner name is too long",
        )?;
        let endpoint_url = normalize_text(
            &request.endpoint_url,
            MAX_URL_LEN,
            "runner url must not be empty",
            "runner url is too long",
        )?;
        let created_at_ms = request.created_at_ms.unwrap_or_else(now_ms);

        let insert = self.conn.execute(
            "INSERT INTO runners(owner_id, token, name, url, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                request.owner_id.get(),
                token.as_str(),
                display_name.as_str(),
                endpoint_url.as_str(),
                created_at_ms,
            ],
        );

        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                if constraint_mentions(&err, "runners.token") {
                    return Err(StoreError::Conflict { token });
                }
                if constraint_mentions(&err, "FOREIGN KEY") {
                    return Err(StoreError::InvalidInput("unknown owner"));
                }
            }
            return Err(err.into());
        }

        Ok(RunnerRecord {
            id: RecordId::new(self.conn.last_insert_rowid()),
            owner_id: request.owner_id,
            token,
            display_name,
            endpoint_url,
            created_at_ms,
        })
    }

    pub fn runner_get(&self, id: RecordId) -> Result<RunnerRecord, StoreError> {
        self.conn
            .query_row(
                &format!("{SELECT_RUNNER} WHERE id=?1"),
                params![id.get()],
                read_runner_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    /// Exact match on the stored token; anything else, malformed input included, is
    /// `NotFound`.
    pub fn runner_find_by_token(&self, token: &str) -> Result<RunnerRecord, StoreError> {
        self.conn
            .query_row(
                &format!("{SELECT_RUNNER} WHERE token=?1"),
                params![token],
                read_runner_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    pub fn runners_list_by_owner(
        &self,
        owner_id: OwnerId,
    ) -> Result<Vec<OwnedRunnerRow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_OWNED_RUNNER} WHERE r.owner_id=?1 ORDER BY r.id ASC"))?;
        let rows = stmt.query_map(params![owner_id.get()], read_owned_runner_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn runners_list_all(&self) -> Result<Vec<OwnedRunnerRow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SELECT_OWNED_RUNNER} ORDER BY r.id ASC"))?;
        let rows = stmt.query_map([], read_owned_runner_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Records created strictly before `cutoff_ms`, oldest first, with their owner's role.
    pub fn runners_created_before(
        &self,
        cutoff_ms: i64,
    ) -> Result<Vec<StaleRunnerRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT r.id, r.owner_id, r.token, r.created_at_ms, o.role
            FROM runners r
            LEFT JOIN owners o ON o.id = r.owner_id
            WHERE r.created_at_ms < ?1
            ORDER BY r.created_at_ms ASC, r.id ASC
            "#,
        )?;
        let rows = stmt.query_map(params![cutoff_ms], |row| {
            Ok(StaleRunnerRow {
                id: RecordId::new(row.get(0)?),
                owner_id: OwnerId::new(row.get(1)?),
                token: row.get(2)?,
                created_at_ms: row.get(3)?,
                owner_role: read_optional_role(row, 4)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Hard delete.
    pub fn runner_delete(&mut self, id: RecordId) -> Result<(), StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM runners WHERE id=?1", params![id.get()])?;
        if removed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    pub fn runners_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runners", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::super::owners::read_role;
    use super::*;

    #[test]
    fn token_normalization_rejects_blank_and_whitespace() {
        assert!(matches!(
            normalize_token("   "),
            Err(StoreError::InvalidInput(_))
        ));
        assert!(matches!(
            normalize_token("abc def"),
            Err(StoreError::InvalidInput(_))
        ));
        assert_eq!(normalize_token(" abc123 ").expect("token"), "abc123");
    }

    #[test]
    fn role_reader_rejects_unknown_roles() {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        let err = conn
            .query_row("SELECT 'root'", [], |row| read_role(row, 0))
            .expect_err("unknown role");
        assert!(matches!(
            err,
            rusqlite::Error::FromSqlConversionFailure(0, _, _)
        ));
    }
}
