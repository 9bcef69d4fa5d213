#![forbid(unsafe_code)]

mod error;
mod owners;
mod runners;
mod schema;
mod types;

pub use error::StoreError;
pub use types::*;

use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::time::Duration;

const DB_FILE_NAME: &str = "runner_fleet.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ownership store. One connection per handle; open several handles on the same directory
/// to get concurrent writers (SQLite serializes them under WAL with a busy timeout).
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref();
        std::fs::create_dir_all(storage_dir)?;

        let db_path = storage_dir.join(DB_FILE_NAME);
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        tracing::debug!(path = %db_path.display(), %journal_mode, "opened ownership store");

        schema::install(&conn)?;

        Ok(Self { conn })
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("FOREIGN KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn constraint_mentions(err: &rusqlite::Error, needle: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.contains(needle),
        _ => false,
    }
}

pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
