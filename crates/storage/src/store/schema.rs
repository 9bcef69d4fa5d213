#![forbid(unsafe_code)]

use super::StoreError;
use rusqlite::{Connection, params};

const SCHEMA_VERSION: &str = "v1";

const SQL: &str = r#"
        CREATE TABLE IF NOT EXISTS meta (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        -- Accounts are managed elsewhere; only the role matters here.
        CREATE TABLE IF NOT EXISTS owners (
          id INTEGER PRIMARY KEY,
          username TEXT NOT NULL UNIQUE,
          role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('admin', 'user')),
          created_at_ms INTEGER NOT NULL
        );

        -- One row per runner registered through this service. `token` is the identifier
        -- the runner binary assigned; it is the join key against live `list` output.
        CREATE TABLE IF NOT EXISTS runners (
          id INTEGER PRIMARY KEY,
          owner_id INTEGER NOT NULL REFERENCES owners(id) ON DELETE CASCADE,
          token TEXT NOT NULL UNIQUE,
          name TEXT NOT NULL,
          url TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS runners_by_owner ON runners(owner_id);
        CREATE INDEX IF NOT EXISTS runners_by_created ON runners(created_at_ms);
"#;

pub(super) fn install(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params!["schema_version", SCHEMA_VERSION],
    )?;
    Ok(())
}
