//! Data store abstraction.
//!
//! A data store is an enumerable, indexable collection of persisted records
//! plus a separate log of not-completed records. Two variants share the
//! [`DataStore`] contract:
//! - `DataStoreDirectory`: one file per record under a root directory
//! - `DataStoreSqlite`: keyed rows in a single SQLite file

use crate::core::directory::DataStoreDirectory;
use crate::core::error::BioappError;
use crate::core::not_completed::{FailureCode, NotCompleted};
use crate::core::schemas;
use crate::core::sqlite::DataStoreSqlite;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Weak};

/// Access mode of a data store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Read-only access to existing content.
    #[default]
    Read,
    /// Add records; existing records are never replaced by different content.
    Write,
    /// Clear all prior content on first write, then add records.
    Overwrite,
}

impl Mode {
    pub fn is_writable(self) -> bool {
        !matches!(self, Mode::Read)
    }
}

impl FromStr for Mode {
    type Err = BioappError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "read" => Ok(Mode::Read),
            "w" | "write" => Ok(Mode::Write),
            "o" | "overwrite" => Ok(Mode::Overwrite),
            other => Err(BioappError::Configuration(format!(
                "invalid mode '{}': expected one of r, w, o",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Read => "read",
            Mode::Write => "write",
            Mode::Overwrite => "overwrite",
        };
        f.write_str(s)
    }
}

/// Which log of the store a member belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Completed,
    NotCompleted,
}

/// Handle to one persisted record.
///
/// Holds a non-owning reference back to its store. Reading through a member
/// whose store has been dropped fails with `NotFound`.
#[derive(Clone)]
pub struct DataMember {
    store: Weak<dyn DataStore>,
    source: PathBuf,
    pub unique_id: String,
    pub data_type: Option<String>,
    pub section: Section,
}

impl DataMember {
    pub fn new(
        store: Weak<dyn DataStore>,
        source: PathBuf,
        unique_id: impl Into<String>,
        data_type: Option<String>,
        section: Section,
    ) -> Self {
        Self {
            store,
            source,
            unique_id: unique_id.into(),
            data_type,
            section,
        }
    }

    pub fn data_store(&self) -> Option<Arc<dyn DataStore>> {
        self.store.upgrade()
    }

    /// Location of the owning store.
    pub fn store_source(&self) -> &Path {
        &self.source
    }

    pub fn is_completed(&self) -> bool {
        self.section == Section::Completed
    }

    /// Bytes of the record.
    ///
    /// The member does not keep its store alive: some `Arc` to the store
    /// (the caller's handle, or a writer or pipeline holding one) must
    /// outlive this call, otherwise it fails with `NotFound`.
    pub fn read(&self) -> Result<Vec<u8>, BioappError> {
        let store = self.data_store().ok_or_else(|| {
            BioappError::NotFound(format!(
                "data store {} for '{}' is no longer open",
                self.source.display(),
                self.unique_id
            ))
        })?;
        store.read(self)
    }

    pub fn read_text(&self) -> Result<String, BioappError> {
        String::from_utf8(self.read()?).map_err(|e| {
            BioappError::Validation(format!("'{}' is not valid UTF-8: {}", self.unique_id, e))
        })
    }
}

impl fmt::Debug for DataMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataMember")
            .field("source", &self.source)
            .field("unique_id", &self.unique_id)
            .field("data_type", &self.data_type)
            .field("section", &self.section)
            .finish()
    }
}

impl PartialEq for DataMember {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
            && self.unique_id == other.unique_id
            && self.section == other.section
    }
}

impl Eq for DataMember {}

impl fmt::Display for DataMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source.join(&self.unique_id).display())
    }
}

/// Summary of a store's content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreSummary {
    pub source: String,
    pub mode: Mode,
    pub completed: usize,
    pub not_completed: usize,
    pub record_type: Option<String>,
}

/// Not-completed records sharing the same code, origin and message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotCompletedSummary {
    pub code: FailureCode,
    pub origin: String,
    pub message: String,
    pub count: usize,
    pub sources: Vec<String>,
}

/// Outcome of re-checking stored content against recorded checksums.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub checked: usize,
    pub missing: Vec<String>,
    pub mismatched: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

/// Capability contract shared by all data stores.
pub trait DataStore: Send + Sync + fmt::Debug {
    fn source(&self) -> &Path;

    fn mode(&self) -> Mode;

    /// Completed members in stable order. Re-scans the backing storage.
    fn members(&self) -> Result<Vec<DataMember>, BioappError>;

    /// Members of the not-completed log in stable order.
    fn not_completed(&self) -> Result<Vec<DataMember>, BioappError>;

    fn read(&self, member: &DataMember) -> Result<Vec<u8>, BioappError>;

    /// Persist `data` as a completed record.
    fn write(
        &self,
        unique_id: &str,
        data: &[u8],
        record_type: Option<&str>,
    ) -> Result<DataMember, BioappError>;

    /// Persist a failure marker in the not-completed log.
    fn write_not_completed(
        &self,
        unique_id: &str,
        marker: &NotCompleted,
    ) -> Result<DataMember, BioappError>;

    /// Run the single-writer initialisation (overwrite clear) if not done yet.
    fn prepare(&self) -> Result<(), BioappError>;

    /// Remove scratch artifacts left behind by runs targeting this store.
    /// Returns the number of artifacts removed.
    fn cleanup(&self) -> Result<usize, BioappError>;

    /// Remove one (or, with `None`, all) not-completed records.
    fn drop_not_completed(&self, unique_id: Option<&str>) -> Result<usize, BioappError>;

    /// SHA-256 recorded when the member was written.
    fn checksum(&self, member: &DataMember) -> Result<Option<String>, BioappError>;

    fn record_type(&self) -> Result<Option<String>, BioappError> {
        Ok(None)
    }

    fn len(&self) -> Result<usize, BioappError> {
        Ok(self.members()?.len())
    }

    fn is_empty(&self) -> Result<bool, BioappError> {
        Ok(self.len()? == 0)
    }

    fn member(&self, index: usize) -> Result<DataMember, BioappError> {
        let mut members = self.members()?;
        let len = members.len();
        if index >= len {
            return Err(BioappError::IndexOutOfRange { index, len });
        }
        Ok(members.swap_remove(index))
    }

    fn get(&self, unique_id: &str) -> Result<DataMember, BioappError> {
        self.members()?
            .into_iter()
            .find(|m| m.unique_id == unique_id)
            .ok_or_else(|| {
                BioappError::NotFound(format!(
                    "'{}' not in data store {}",
                    unique_id,
                    self.source().display()
                ))
            })
    }

    fn validate(&self) -> Result<ValidationReport, BioappError> {
        let mut report = ValidationReport::default();
        for member in self.members()? {
            report.checked += 1;
            match self.checksum(&member)? {
                None => report.missing.push(member.unique_id.clone()),
                Some(expected) => {
                    if hash_bytes(&member.read()?) != expected {
                        report.mismatched.push(member.unique_id.clone());
                    }
                }
            }
        }
        Ok(report)
    }

    fn describe(&self) -> Result<StoreSummary, BioappError> {
        Ok(StoreSummary {
            source: self.source().display().to_string(),
            mode: self.mode(),
            completed: self.members()?.len(),
            not_completed: self.not_completed()?.len(),
            record_type: self.record_type()?,
        })
    }

    fn summary_not_completed(&self) -> Result<Vec<NotCompletedSummary>, BioappError> {
        let mut groups: FxHashMap<(FailureCode, String, String), Vec<String>> =
            FxHashMap::default();
        for member in self.not_completed()? {
            let marker = NotCompleted::from_json(&member.read_text()?)?;
            let source = marker.source.clone().unwrap_or(member.unique_id.clone());
            groups
                .entry((marker.code, marker.origin, marker.message))
                .or_default()
                .push(source);
        }
        let mut out: Vec<NotCompletedSummary> = groups
            .into_iter()
            .map(|((code, origin, message), sources)| NotCompletedSummary {
                code,
                origin,
                message,
                count: sources.len(),
                sources,
            })
            .collect();
        out.sort_by(|a, b| {
            (a.code, &a.origin, &a.message).cmp(&(b.code, &b.origin, &b.message))
        });
        Ok(out)
    }
}

pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Filename filter derived from a store suffix.
///
/// Accepts a literal extension (`fasta`, `.fasta`), a glob (`fasta*`), or
/// `*` to match every file.
#[derive(Debug, Clone)]
pub struct SuffixFilter {
    suffix: String,
    pattern: Regex,
}

impl SuffixFilter {
    pub fn new(suffix: &str) -> Result<Self, BioappError> {
        let suffix = suffix.trim().trim_start_matches('.');
        if suffix.is_empty() {
            return Err(BioappError::Configuration(
                "a non-empty suffix is required".to_string(),
            ));
        }
        let glob = if suffix == "*" {
            "*".to_string()
        } else {
            format!("*.{}", suffix)
        };
        let mut re = String::from("^");
        for c in glob.chars() {
            match c {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                other => re.push_str(&regex::escape(&other.to_string())),
            }
        }
        re.push('$');
        let pattern = Regex::new(&re)
            .map_err(|e| BioappError::Configuration(format!("invalid suffix '{}': {}", suffix, e)))?;
        Ok(Self {
            suffix: suffix.to_string(),
            pattern,
        })
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// True when the suffix is a plain extension rather than a pattern.
    pub fn is_literal(&self) -> bool {
        !self.suffix.contains(['*', '?'])
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.pattern.is_match(file_name)
    }

    /// Rewrites the final extension of `unique_id` to this suffix.
    pub fn apply(&self, unique_id: &str) -> String {
        if !self.is_literal() {
            return unique_id.to_string();
        }
        let ext = format!(".{}", self.suffix);
        if unique_id.ends_with(&ext) {
            return unique_id.to_string();
        }
        let stem = match unique_id.rfind('.') {
            Some(pos) if pos > 0 => &unique_id[..pos],
            _ => unique_id,
        };
        format!("{}{}", stem, ext)
    }
}

/// Open a directory or database store depending on `path`.
///
/// Paths ending in `.sqlitedb` open a `DataStoreSqlite`; anything else is a
/// directory store filtered by `suffix`.
pub fn open_data_store(
    path: impl AsRef<Path>,
    suffix: Option<&str>,
    mode: Mode,
    limit: Option<usize>,
) -> Result<Arc<dyn DataStore>, BioappError> {
    let path = path.as_ref();
    let is_db = path
        .extension()
        .is_some_and(|ext| ext == schemas::STORE_DB_SUFFIX);
    if is_db {
        let store: Arc<dyn DataStore> = DataStoreSqlite::open(path, mode, limit)?;
        Ok(store)
    } else {
        let store: Arc<dyn DataStore> = DataStoreDirectory::open(path, suffix, mode, limit)?;
        Ok(store)
    }
}
