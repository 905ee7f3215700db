//! Table definitions for the database-backed data store.
//!
//! A store file holds three tables:
//! 1. records: completed members, one row per identifier.
//! 2. not_completed: rich-dict JSON of failure markers, keyed the same way.
//! 3. state: store-level key/value metadata (record type, writer lock).

pub const STORE_DB_SUFFIX: &str = "sqlitedb";

pub const RECORDS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS records (
        identifier TEXT PRIMARY KEY,
        record_type TEXT,
        data BLOB NOT NULL,
        checksum TEXT NOT NULL
    )
";

pub const NOT_COMPLETED_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS not_completed (
        identifier TEXT PRIMARY KEY,
        data TEXT NOT NULL
    )
";

pub const STATE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const STATE_RECORD_TYPE: &str = "record_type";
pub const STATE_LOCK: &str = "lock";
