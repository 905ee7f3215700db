use crate::core::error::BioappError;
use crate::core::schemas;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

/// Busy timeout for connections used by parallel writers.
const BUSY_TIMEOUT_SECS: u64 = 30;

pub fn db_connect(db_path: &Path) -> Result<Connection, BioappError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    Ok(conn)
}

/// Connect to an existing database without creating it.
///
/// Opens read/write when the file permits, so WAL index files can be
/// created, and falls back to a read-only connection otherwise.
pub fn db_connect_existing(db_path: &Path) -> Result<Connection, BioappError> {
    if !db_path.is_file() {
        return Err(BioappError::NotFound(format!(
            "database {} does not exist",
            db_path.display()
        )));
    }
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .or_else(|_| {
        Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    })?;
    conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))?;
    Ok(conn)
}

pub fn initialize_store_db(conn: &Connection) -> Result<(), BioappError> {
    conn.execute(schemas::RECORDS_SCHEMA, [])?;
    conn.execute(schemas::NOT_COMPLETED_SCHEMA, [])?;
    conn.execute(schemas::STATE_SCHEMA, [])?;
    Ok(())
}

/// Check if an error is a SQLite busy/locked error that is retryable.
pub fn is_busy_error(err: &BioappError) -> bool {
    match err {
        BioappError::Sqlite(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}
