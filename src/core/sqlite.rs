//! SQLite-backed data store.
//!
//! Every write runs in its own transaction on a fresh connection, serialized
//! through a per-store write mutex. Readers open their own connections and
//! rely on WAL for concurrent access. Busy/locked errors from other processes
//! are retried with exponential backoff.

use crate::core::db;
use crate::core::error::BioappError;
use crate::core::not_completed::NotCompleted;
use crate::core::schemas;
use crate::core::store::{DataMember, DataStore, Mode, Section, hash_bytes};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Maximum retry attempts for busy/locked errors.
const MAX_RETRIES: u32 = 5;
/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 100;
/// Maximum delay cap (milliseconds).
const MAX_DELAY_MS: u64 = 5_000;

#[derive(Debug)]
pub struct DataStoreSqlite {
    me: Weak<DataStoreSqlite>,
    source: PathBuf,
    mode: Mode,
    limit: Option<usize>,
    write_lock: Mutex<()>,
    prepared: Mutex<bool>,
    lock_token: String,
}

impl DataStoreSqlite {
    /// Open a database store.
    ///
    /// Read mode requires an existing file. Write modes create the schema
    /// and take the writer lock.
    pub fn open(
        source: impl AsRef<Path>,
        mode: Mode,
        limit: Option<usize>,
    ) -> Result<Arc<Self>, BioappError> {
        let source = source.as_ref().to_path_buf();
        let lock_token = format!("{}:{}", std::process::id(), Ulid::new());

        if mode.is_writable() {
            if let Some(parent) = source.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
                if std::fs::metadata(parent)?.permissions().readonly() {
                    return Err(BioappError::Configuration(format!(
                        "cannot open {} in {} mode: directory is read-only",
                        source.display(),
                        mode
                    )));
                }
            }
            let conn = db::db_connect(&source)?;
            db::initialize_store_db(&conn)?;
        } else {
            db::db_connect_existing(&source)?;
        }

        let store = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            source,
            mode,
            limit,
            write_lock: Mutex::new(()),
            prepared: Mutex::new(mode != Mode::Overwrite),
            lock_token,
        });
        if mode.is_writable() {
            store.with_write(|conn| store.acquire_lock(conn))?;
        }
        Ok(store)
    }

    fn weak(&self) -> Weak<dyn DataStore> {
        self.me.clone()
    }

    fn make_member(
        &self,
        unique_id: String,
        record_type: Option<String>,
        section: Section,
    ) -> DataMember {
        DataMember::new(self.weak(), self.source.clone(), unique_id, record_type, section)
    }

    fn require_writable(&self) -> Result<(), BioappError> {
        if !self.mode.is_writable() {
            return Err(BioappError::ReadOnly(self.source.display().to_string()));
        }
        Ok(())
    }

    /// Execute a closure inside a write transaction.
    /// Write access is serialized per store via mutex.
    fn with_write<F, R>(&self, mut f: F) -> Result<R, BioappError>
    where
        F: FnMut(&Connection) -> Result<R, BioappError>,
    {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| BioappError::Validation("store write lock poisoned".to_string()))?;
        retry_on_busy(|| {
            let mut conn = db::db_connect(&self.source)?;
            let tx = conn.transaction()?;
            let out = f(&tx)?;
            tx.commit()?;
            Ok(out)
        })
    }

    fn with_read<F, R>(&self, f: F) -> Result<R, BioappError>
    where
        F: FnOnce(&Connection) -> Result<R, BioappError>,
    {
        let conn = db::db_connect_existing(&self.source)?;
        f(&conn)
    }

    fn acquire_lock(&self, conn: &Connection) -> Result<(), BioappError> {
        let holder = get_state(conn, schemas::STATE_LOCK)?;
        if let Some(holder) = holder.filter(|h| h != &self.lock_token) {
            warn!(store = %self.source.display(), holder = %holder, "taking over lock held by another writer");
        }
        set_state(conn, schemas::STATE_LOCK, &self.lock_token)
    }

    /// Token of the writer currently holding the store lock.
    pub fn locked(&self) -> Result<Option<String>, BioappError> {
        self.with_read(|conn| get_state(conn, schemas::STATE_LOCK))
    }

    /// Release the writer lock. Without `force`, only this handle's lock is released.
    pub fn unlock(&self, force: bool) -> Result<bool, BioappError> {
        self.require_writable()?;
        self.with_write(|conn| {
            let n = if force {
                conn.execute(
                    "DELETE FROM state WHERE key = ?1",
                    params![schemas::STATE_LOCK],
                )?
            } else {
                conn.execute(
                    "DELETE FROM state WHERE key = ?1 AND value = ?2",
                    params![schemas::STATE_LOCK, self.lock_token],
                )?
            };
            Ok(n > 0)
        })
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }
}

fn get_state(conn: &Connection, key: &str) -> Result<Option<String>, BioappError> {
    Ok(conn
        .query_row(
            "SELECT value FROM state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

fn set_state(conn: &Connection, key: &str, value: &str) -> Result<(), BioappError> {
    conn.execute(
        "INSERT INTO state(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Retry a closure on `SQLITE_BUSY` / `DatabaseLocked` with exponential backoff.
fn retry_on_busy<F, R>(mut f: F) -> Result<R, BioappError>
where
    F: FnMut() -> Result<R, BioappError>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if db::is_busy_error(&e) && attempt < MAX_RETRIES => {
                attempt += 1;
                let delay_ms = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(MAX_DELAY_MS);
                thread::sleep(Duration::from_millis(delay_ms));
            }
            Err(e) => return Err(e),
        }
    }
}

impl DataStore for DataStoreSqlite {
    fn source(&self) -> &Path {
        &self.source
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn members(&self) -> Result<Vec<DataMember>, BioappError> {
        let limit = self.limit.map_or(-1, |n| n as i64);
        let rows = self.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT identifier, record_type FROM records ORDER BY identifier LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })?;
        Ok(rows
            .into_iter()
            .map(|(id, record_type)| self.make_member(id, record_type, Section::Completed))
            .collect())
    }

    fn not_completed(&self) -> Result<Vec<DataMember>, BioappError> {
        let ids = self.with_read(|conn| {
            let mut stmt =
                conn.prepare("SELECT identifier FROM not_completed ORDER BY identifier")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })?;
        Ok(ids
            .into_iter()
            .map(|id| {
                self.make_member(
                    id,
                    Some(crate::core::not_completed::RICH_DICT_TYPE.to_string()),
                    Section::NotCompleted,
                )
            })
            .collect())
    }

    fn read(&self, member: &DataMember) -> Result<Vec<u8>, BioappError> {
        let found: Option<Vec<u8>> = self.with_read(|conn| {
            let data = match member.section {
                Section::Completed => conn
                    .query_row(
                        "SELECT data FROM records WHERE identifier = ?1",
                        params![member.unique_id],
                        |row| row.get::<_, Vec<u8>>(0),
                    )
                    .optional()?,
                Section::NotCompleted => conn
                    .query_row(
                        "SELECT data FROM not_completed WHERE identifier = ?1",
                        params![member.unique_id],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?
                    .map(String::into_bytes),
            };
            Ok(data)
        })?;
        found.ok_or_else(|| {
            BioappError::NotFound(format!(
                "'{}' not in {}",
                member.unique_id,
                self.source.display()
            ))
        })
    }

    fn write(
        &self,
        unique_id: &str,
        data: &[u8],
        record_type: Option<&str>,
    ) -> Result<DataMember, BioappError> {
        self.require_writable()?;
        self.prepare()?;
        let checksum = hash_bytes(data);
        let overwrite = self.mode == Mode::Overwrite;
        self.with_write(|conn| {
            if let Some(record_type) = record_type {
                match get_state(conn, schemas::STATE_RECORD_TYPE)? {
                    None => set_state(conn, schemas::STATE_RECORD_TYPE, record_type)?,
                    Some(existing) if existing != record_type => {
                        return Err(BioappError::Validation(format!(
                            "store holds '{}' records, cannot add '{}' record '{}'",
                            existing, record_type, unique_id
                        )));
                    }
                    Some(_) => {}
                }
            }
            if !overwrite {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT checksum FROM records WHERE identifier = ?1",
                        params![unique_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if existing.is_some_and(|c| c != checksum) {
                    return Err(BioappError::Validation(format!(
                        "'{}' already exists in {} with different content",
                        unique_id,
                        self.source.display()
                    )));
                }
            }
            conn.execute(
                "INSERT INTO records(identifier, record_type, data, checksum) VALUES(?1, ?2, ?3, ?4)
                 ON CONFLICT(identifier) DO UPDATE SET
                    record_type = excluded.record_type,
                    data = excluded.data,
                    checksum = excluded.checksum",
                params![unique_id, record_type, data, checksum],
            )?;
            conn.execute(
                "DELETE FROM not_completed WHERE identifier = ?1",
                params![unique_id],
            )?;
            Ok(())
        })?;
        debug!(store = %self.source.display(), unique_id = %unique_id, "wrote record");
        Ok(self.make_member(
            unique_id.to_string(),
            record_type.map(str::to_string),
            Section::Completed,
        ))
    }

    fn write_not_completed(
        &self,
        unique_id: &str,
        marker: &NotCompleted,
    ) -> Result<DataMember, BioappError> {
        self.require_writable()?;
        self.prepare()?;
        let json = marker.to_json()?;
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO not_completed(identifier, data) VALUES(?1, ?2)
                 ON CONFLICT(identifier) DO UPDATE SET data = excluded.data",
                params![unique_id, json],
            )?;
            Ok(())
        })?;
        debug!(store = %self.source.display(), unique_id = %unique_id, "wrote not-completed");
        Ok(self.make_member(
            unique_id.to_string(),
            Some(crate::core::not_completed::RICH_DICT_TYPE.to_string()),
            Section::NotCompleted,
        ))
    }

    fn prepare(&self) -> Result<(), BioappError> {
        let mut prepared = self
            .prepared
            .lock()
            .map_err(|_| BioappError::Validation("prepare lock poisoned".to_string()))?;
        if *prepared {
            return Ok(());
        }
        self.with_write(|conn| {
            conn.execute("DELETE FROM records", [])?;
            conn.execute("DELETE FROM not_completed", [])?;
            conn.execute("DELETE FROM state", [])?;
            self.acquire_lock(conn)
        })?;
        *prepared = true;
        info!(store = %self.source.display(), "cleared database for overwrite");
        Ok(())
    }

    fn cleanup(&self) -> Result<usize, BioappError> {
        if !self.mode.is_writable() {
            return Ok(0);
        }
        let released = self.unlock(false)?;
        let conn = db::db_connect(&self.source)?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE);", [], |_| Ok(()))?;
        if released {
            info!(store = %self.source.display(), "released writer lock");
        }
        Ok(usize::from(released))
    }

    fn drop_not_completed(&self, unique_id: Option<&str>) -> Result<usize, BioappError> {
        self.require_writable()?;
        self.with_write(|conn| {
            let n = match unique_id {
                Some(id) => conn.execute(
                    "DELETE FROM not_completed WHERE identifier = ?1",
                    params![id],
                )?,
                None => conn.execute("DELETE FROM not_completed", [])?,
            };
            Ok(n)
        })
    }

    fn checksum(&self, member: &DataMember) -> Result<Option<String>, BioappError> {
        self.with_read(|conn| {
            Ok(conn
                .query_row(
                    "SELECT checksum FROM records WHERE identifier = ?1",
                    params![member.unique_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    fn record_type(&self) -> Result<Option<String>, BioappError> {
        self.with_read(|conn| get_state(conn, schemas::STATE_RECORD_TYPE))
    }
}
