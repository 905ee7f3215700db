//! Writer apps: persist data objects to a data store.
//!
//! A writer names the record after the object's source identifier. When it
//! receives a failure instead of an object it stores the marker in the
//! not-completed log and returns the resulting member, so the outcome of
//! every input is recorded. Check [`DataMember::is_completed`] to tell the
//! two apart. A marker without any source identifier cannot be filed and is
//! returned as is.
//!
//! Returned members only hold a weak reference to the store. Keep a clone of
//! the store `Arc` (or the writer) alive for as long as the members are read:
//!
//! ```no_run
//! # use bioapp::apps::{App, WriteJson};
//! # use bioapp::core::directory::DataStoreDirectory;
//! # use bioapp::data::{DataObject, Table};
//! # use bioapp::Mode;
//! # fn main() -> Result<(), bioapp::BioappError> {
//! let store = DataStoreDirectory::open("out", Some("json"), Mode::Write, None)?;
//! let member = WriteJson::new(store.clone())
//!     .run(DataObject::Table(Table::default()).with_source("t1"))
//!     .expect("written");
//! // `store` is still held here, so the member stays readable
//! let text = member.read_text()?;
//! # let _ = text;
//! # Ok(())
//! # }
//! ```

use crate::apps::composable::{App, impl_add};
use crate::core::error::BioappError;
use crate::core::not_completed::{AppResult, NotCompleted};
use crate::core::sqlite::DataStoreSqlite;
use crate::core::store::{DataMember, DataStore};
use crate::data::formats::SeqFormat;
use crate::data::object::DataObject;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// First source identifier found along a failure chain.
fn chain_source(marker: &NotCompleted) -> Option<&str> {
    let mut current = Some(marker);
    while let Some(m) = current {
        if let Some(source) = m.source.as_deref() {
            return Some(source);
        }
        current = m.caused_by.as_deref();
    }
    None
}

fn record_failure(
    origin: &str,
    store: &dyn DataStore,
    marker: NotCompleted,
) -> AppResult<DataMember> {
    let Some(unique_id) = chain_source(&marker).map(str::to_string) else {
        warn!(origin, message = %marker.message, "failure without source identifier not recorded");
        return Err(marker);
    };
    store.write_not_completed(&unique_id, &marker).map_err(|e| {
        NotCompleted::error(origin, format!("could not record failure: {}", e))
            .with_source(Some(unique_id.clone()))
            .with_cause(marker.clone())
    })
}

fn store_record(
    origin: &str,
    store: &dyn DataStore,
    unique_id: &str,
    encoded: Result<Vec<u8>, String>,
    record_type: &str,
) -> AppResult<DataMember> {
    let fail = |message: String| NotCompleted::error(origin, message).with_source(Some(unique_id.to_string()));
    let data = encoded.map_err(fail)?;
    store
        .write(unique_id, &data, Some(record_type))
        .map_err(|e: BioappError| fail(e.to_string()))
}

fn require_source<'a>(origin: &str, obj: &'a DataObject) -> AppResult<&'a str> {
    obj.source().ok_or_else(|| {
        NotCompleted::error(
            origin,
            format!("{} has no source identifier to write under", obj.provenance()),
        )
    })
}

/// Implements the failure-recording `call` and the source-named `main`
/// shared by all writers.
macro_rules! writer_entry_points {
    () => {
        fn main(&self, input: DataObject) -> AppResult<DataMember> {
            let unique_id = require_source(self.name(), &input)?.to_string();
            self.write(&input, &unique_id)
        }

        fn call(&self, input: AppResult<DataObject>) -> AppResult<DataMember> {
            match input {
                Ok(obj) => self.main(obj),
                Err(marker) => record_failure(self.name(), self.store.as_ref(), marker),
            }
        }
    };
}

/// Sequences as text in a sequence format.
#[derive(Debug, Clone)]
pub struct WriteSeqs {
    store: Arc<dyn DataStore>,
    format: SeqFormat,
}

impl WriteSeqs {
    pub fn new(store: Arc<dyn DataStore>, format: &str) -> Result<Self, BioappError> {
        Ok(Self {
            store,
            format: SeqFormat::from_str(format)?,
        })
    }

    pub fn write(&self, data: &DataObject, unique_id: &str) -> AppResult<DataMember> {
        let encoded = match data.as_sequences() {
            Some(seqs) => Ok(self.format.format(seqs).into_bytes()),
            None => Err(format!("cannot write {} as {}", data.provenance(), self.format.name())),
        };
        store_record(self.name(), self.store.as_ref(), unique_id, encoded, data.provenance())
    }
}

impl App for WriteSeqs {
    type Input = DataObject;
    type Output = DataMember;

    fn name(&self) -> &str {
        "write_seqs"
    }

    writer_entry_points!();

    fn data_store(&self) -> Option<Arc<dyn DataStore>> {
        Some(Arc::clone(&self.store))
    }
}

/// Tables as delimited text. Labelled 2-D objects are written in long form.
#[derive(Debug, Clone)]
pub struct WriteTabular {
    store: Arc<dyn DataStore>,
    sep: char,
}

impl WriteTabular {
    pub fn new(store: Arc<dyn DataStore>, format: &str) -> Result<Self, BioappError> {
        let sep = match format.trim_start_matches('.') {
            "tsv" | "tab" => '\t',
            "csv" => ',',
            other => {
                return Err(BioappError::Configuration(format!(
                    "unsupported tabular format '{}'",
                    other
                )));
            }
        };
        Ok(Self { store, sep })
    }

    pub fn write(&self, data: &DataObject, unique_id: &str) -> AppResult<DataMember> {
        let encoded = match (data, data.to_long_form()) {
            (_, Some(long)) => Ok(long.to_delimited(self.sep).into_bytes()),
            (DataObject::Table(table), None) => Ok(table.to_delimited(self.sep).into_bytes()),
            _ => Err(format!("cannot write {} as a table", data.provenance())),
        };
        store_record(self.name(), self.store.as_ref(), unique_id, encoded, data.provenance())
    }
}

impl App for WriteTabular {
    type Input = DataObject;
    type Output = DataMember;

    fn name(&self) -> &str {
        "write_tabular"
    }

    writer_entry_points!();

    fn data_store(&self) -> Option<Arc<dyn DataStore>> {
        Some(Arc::clone(&self.store))
    }
}

/// Any object as its JSON rich dict.
#[derive(Debug, Clone)]
pub struct WriteJson {
    store: Arc<dyn DataStore>,
}

impl WriteJson {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    pub fn write(&self, data: &DataObject, unique_id: &str) -> AppResult<DataMember> {
        let encoded = data.to_json().map(String::into_bytes).map_err(|e| e.to_string());
        store_record(self.name(), self.store.as_ref(), unique_id, encoded, data.provenance())
    }
}

impl App for WriteJson {
    type Input = DataObject;
    type Output = DataMember;

    fn name(&self) -> &str {
        "write_json"
    }

    writer_entry_points!();

    fn data_store(&self) -> Option<Arc<dyn DataStore>> {
        Some(Arc::clone(&self.store))
    }
}

/// Any object as a rich dict record of a database store, typed by its
/// provenance.
#[derive(Debug, Clone)]
pub struct WriteDb {
    store: Arc<DataStoreSqlite>,
}

impl WriteDb {
    pub fn new(store: Arc<DataStoreSqlite>) -> Self {
        Self { store }
    }

    pub fn write(&self, data: &DataObject, unique_id: &str) -> AppResult<DataMember> {
        let encoded = data.to_json().map(String::into_bytes).map_err(|e| e.to_string());
        store_record(self.name(), self.store.as_ref(), unique_id, encoded, data.provenance())
    }
}

impl App for WriteDb {
    type Input = DataObject;
    type Output = DataMember;

    fn name(&self) -> &str {
        "write_db"
    }

    writer_entry_points!();

    fn data_store(&self) -> Option<Arc<dyn DataStore>> {
        let store: Arc<dyn DataStore> = self.store.clone();
        Some(store)
    }
}

impl_add!(WriteSeqs, WriteTabular, WriteJson, WriteDb);
