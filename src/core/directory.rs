//! Directory-backed data store.
//!
//! Layout under the root directory:
//! - `<unique_id>`: completed records, filtered by the store suffix
//! - `not_completed/<unique_id>.json`: rich-dict failure markers
//! - `checksums/<unique_id>.sha256`: SHA-256 of each completed record
//!
//! Writes go to a hidden `.partial-*` file that is renamed into place, so a
//! reader never observes a half-written record.

use crate::core::error::BioappError;
use crate::core::not_completed::NotCompleted;
use crate::core::store::{DataMember, DataStore, Mode, Section, SuffixFilter, hash_bytes};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info};

pub const NOT_COMPLETED_DIR: &str = "not_completed";
pub const CHECKSUMS_DIR: &str = "checksums";
pub const PARTIAL_PREFIX: &str = ".partial-";

#[derive(Debug)]
pub struct DataStoreDirectory {
    me: Weak<DataStoreDirectory>,
    source: PathBuf,
    mode: Mode,
    suffix: Option<SuffixFilter>,
    limit: Option<usize>,
    prepared: Mutex<bool>,
}

impl DataStoreDirectory {
    /// Open a directory store.
    ///
    /// Reading requires a suffix. Write modes create the root when absent
    /// and refuse a root whose permissions are read-only.
    pub fn open(
        source: impl AsRef<Path>,
        suffix: Option<&str>,
        mode: Mode,
        limit: Option<usize>,
    ) -> Result<Arc<Self>, BioappError> {
        let source = source.as_ref().to_path_buf();
        let suffix = match suffix {
            Some(s) => Some(SuffixFilter::new(s)?),
            None if mode == Mode::Read => {
                return Err(BioappError::Configuration(format!(
                    "a suffix is required to read from {}",
                    source.display()
                )));
            }
            None => None,
        };

        if mode.is_writable() {
            if source.exists() {
                let readonly = fs::metadata(&source)?.permissions().readonly();
                if readonly {
                    return Err(BioappError::Configuration(format!(
                        "cannot open {} in {} mode: directory is read-only",
                        source.display(),
                        mode
                    )));
                }
            } else {
                fs::create_dir_all(&source)?;
            }
        } else if !source.is_dir() {
            return Err(BioappError::NotFound(format!(
                "directory {} does not exist",
                source.display()
            )));
        }

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            source,
            mode,
            suffix,
            limit,
            prepared: Mutex::new(mode != Mode::Overwrite),
        }))
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_ref().map(|s| s.suffix())
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn weak(&self) -> Weak<dyn DataStore> {
        self.me.clone()
    }

    fn make_member(&self, unique_id: String, section: Section) -> DataMember {
        DataMember::new(
            self.weak(),
            self.source.clone(),
            unique_id,
            self.suffix().map(str::to_string),
            section,
        )
    }

    fn normalise_id(&self, unique_id: &str) -> Result<String, BioappError> {
        let unique_id = match &self.suffix {
            Some(filter) => filter.apply(unique_id),
            None => unique_id.to_string(),
        };
        validate_unique_id(&unique_id)?;
        Ok(unique_id)
    }

    fn record_path(&self, unique_id: &str) -> PathBuf {
        self.source.join(unique_id)
    }

    fn not_completed_path(&self, unique_id: &str) -> PathBuf {
        self.source
            .join(NOT_COMPLETED_DIR)
            .join(format!("{}.json", unique_id))
    }

    fn checksum_path(&self, unique_id: &str) -> PathBuf {
        self.source
            .join(CHECKSUMS_DIR)
            .join(format!("{}.sha256", unique_id))
    }

    fn require_writable(&self) -> Result<(), BioappError> {
        if !self.mode.is_writable() {
            return Err(BioappError::ReadOnly(self.source.display().to_string()));
        }
        Ok(())
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<String>, BioappError> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(PARTIAL_PREFIX) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}

/// Identifiers name a single file directly under the store root.
fn validate_unique_id(unique_id: &str) -> Result<(), BioappError> {
    let invalid = unique_id.is_empty()
        || unique_id == "."
        || unique_id == ".."
        || unique_id.contains(['/', '\\'])
        || unique_id.starts_with(PARTIAL_PREFIX);
    if invalid {
        return Err(BioappError::Validation(format!(
            "invalid unique_id '{}'",
            unique_id
        )));
    }
    Ok(())
}

/// Write `data` to `path` by renaming a completed temp file into place.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), BioappError> {
    let dir = path.parent().ok_or_else(|| {
        BioappError::Validation(format!("invalid record path {}", path.display()))
    })?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| BioappError::Io(e.error))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<bool, BioappError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

impl DataStore for DataStoreDirectory {
    fn source(&self) -> &Path {
        &self.source
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn members(&self) -> Result<Vec<DataMember>, BioappError> {
        let names = self.list_files(&self.source)?;
        let limit = self.limit.unwrap_or(usize::MAX);
        Ok(names
            .into_iter()
            .filter(|name| match &self.suffix {
                Some(filter) => filter.matches(name),
                None => true,
            })
            .take(limit)
            .map(|name| self.make_member(name, Section::Completed))
            .collect())
    }

    fn not_completed(&self) -> Result<Vec<DataMember>, BioappError> {
        let names = self.list_files(&self.source.join(NOT_COMPLETED_DIR))?;
        Ok(names
            .into_iter()
            .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
            .map(|id| self.make_member(id, Section::NotCompleted))
            .collect())
    }

    fn read(&self, member: &DataMember) -> Result<Vec<u8>, BioappError> {
        let path = match member.section {
            Section::Completed => self.record_path(&member.unique_id),
            Section::NotCompleted => self.not_completed_path(&member.unique_id),
        };
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                BioappError::NotFound(format!("no record at {}", path.display()))
            }
            _ => BioappError::Io(e),
        })
    }

    fn write(
        &self,
        unique_id: &str,
        data: &[u8],
        _record_type: Option<&str>,
    ) -> Result<DataMember, BioappError> {
        self.require_writable()?;
        self.prepare()?;
        let unique_id = self.normalise_id(unique_id)?;
        let path = self.record_path(&unique_id);

        if self.mode == Mode::Write && path.exists() {
            let existing = fs::read(&path)?;
            if existing != data {
                return Err(BioappError::Validation(format!(
                    "'{}' already exists in {} with different content",
                    unique_id,
                    self.source.display()
                )));
            }
        }

        atomic_write(&path, data)?;
        atomic_write(&self.checksum_path(&unique_id), hash_bytes(data).as_bytes())?;
        remove_if_exists(&self.not_completed_path(&unique_id))?;
        debug!(store = %self.source.display(), unique_id = %unique_id, "wrote record");
        Ok(self.make_member(unique_id, Section::Completed))
    }

    fn write_not_completed(
        &self,
        unique_id: &str,
        marker: &NotCompleted,
    ) -> Result<DataMember, BioappError> {
        self.require_writable()?;
        self.prepare()?;
        let unique_id = self.normalise_id(unique_id)?;
        let json = marker.to_json()?;
        atomic_write(&self.not_completed_path(&unique_id), json.as_bytes())?;
        debug!(store = %self.source.display(), unique_id = %unique_id, "wrote not-completed");
        Ok(self.make_member(unique_id, Section::NotCompleted))
    }

    fn prepare(&self) -> Result<(), BioappError> {
        let mut prepared = self
            .prepared
            .lock()
            .map_err(|_| BioappError::Validation("prepare lock poisoned".to_string()))?;
        if *prepared {
            return Ok(());
        }
        if self.source.exists() {
            fs::remove_dir_all(&self.source)?;
        }
        fs::create_dir_all(&self.source)?;
        *prepared = true;
        info!(store = %self.source.display(), "cleared directory for overwrite");
        Ok(())
    }

    fn cleanup(&self) -> Result<usize, BioappError> {
        let mut removed = 0;
        for dir in [
            self.source.clone(),
            self.source.join(NOT_COMPLETED_DIR),
            self.source.join(CHECKSUMS_DIR),
        ] {
            if !dir.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name();
                if name.to_string_lossy().starts_with(PARTIAL_PREFIX)
                    && remove_if_exists(&entry.path())?
                {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            info!(store = %self.source.display(), removed, "removed partial files");
        }
        Ok(removed)
    }

    fn drop_not_completed(&self, unique_id: Option<&str>) -> Result<usize, BioappError> {
        self.require_writable()?;
        let targets = match unique_id {
            Some(id) => vec![self.normalise_id(id)?],
            None => self
                .not_completed()?
                .into_iter()
                .map(|m| m.unique_id)
                .collect(),
        };
        let mut removed = 0;
        for id in targets {
            if remove_if_exists(&self.not_completed_path(&id))? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn checksum(&self, member: &DataMember) -> Result<Option<String>, BioappError> {
        let path = self.checksum_path(&member.unique_id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?.trim().to_string()))
    }
}
