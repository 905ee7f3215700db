//! Tagged union over all persistable data objects and its rich-dict form.
//!
//! The rich dict of an object is its JSON serialization with a `"type"` key
//! naming the object kind. [`deserialise_object`] dispatches on that key, so
//! adding a variant registers it for loading.

use crate::core::not_completed::{self, AppResult, NotCompleted};
use crate::data::matrix::{DistanceMatrix, MotifCountsArray, MotifFreqsArray, Pssm};
use crate::data::seqs::{Info, SequenceCollection};
use crate::data::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SEQUENCES_TYPE: &str = "bioapp.data.SequenceCollection";
pub const ALIGNMENT_TYPE: &str = "bioapp.data.Alignment";
pub const TABLE_TYPE: &str = "bioapp.data.Table";
pub const MOTIF_COUNTS_TYPE: &str = "bioapp.data.MotifCountsArray";
pub const MOTIF_FREQS_TYPE: &str = "bioapp.data.MotifFreqsArray";
pub const PSSM_TYPE: &str = "bioapp.data.PSSM";
pub const DISTANCES_TYPE: &str = "bioapp.data.DistanceMatrix";
pub const GENERIC_RESULT_TYPE: &str = "bioapp.data.GenericResult";

/// Named collection of nested objects tied to one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericResult {
    pub source: String,
    pub items: BTreeMap<String, DataObject>,
}

impl GenericResult {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            items: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: &str, value: DataObject) {
        self.items.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&DataObject> {
        self.items.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataObject {
    #[serde(rename = "bioapp.data.SequenceCollection")]
    Sequences(SequenceCollection),
    #[serde(rename = "bioapp.data.Alignment")]
    Alignment(SequenceCollection),
    #[serde(rename = "bioapp.data.Table")]
    Table(Table),
    #[serde(rename = "bioapp.data.MotifCountsArray")]
    MotifCounts(MotifCountsArray),
    #[serde(rename = "bioapp.data.MotifFreqsArray")]
    MotifFreqs(MotifFreqsArray),
    #[serde(rename = "bioapp.data.PSSM")]
    Pssm(Pssm),
    #[serde(rename = "bioapp.data.DistanceMatrix")]
    Distances(DistanceMatrix),
    #[serde(rename = "bioapp.data.GenericResult")]
    Result(GenericResult),
}

impl DataObject {
    /// Provenance string recorded as the rich dict `"type"`.
    pub fn provenance(&self) -> &'static str {
        match self {
            DataObject::Sequences(_) => SEQUENCES_TYPE,
            DataObject::Alignment(_) => ALIGNMENT_TYPE,
            DataObject::Table(_) => TABLE_TYPE,
            DataObject::MotifCounts(_) => MOTIF_COUNTS_TYPE,
            DataObject::MotifFreqs(_) => MOTIF_FREQS_TYPE,
            DataObject::Pssm(_) => PSSM_TYPE,
            DataObject::Distances(_) => DISTANCES_TYPE,
            DataObject::Result(_) => GENERIC_RESULT_TYPE,
        }
    }

    fn info(&self) -> Option<&Info> {
        match self {
            DataObject::Sequences(s) | DataObject::Alignment(s) => Some(&s.info),
            DataObject::Table(t) => Some(&t.info),
            DataObject::MotifCounts(m) => Some(&m.info),
            DataObject::MotifFreqs(m) => Some(&m.info),
            DataObject::Pssm(m) => Some(&m.info),
            DataObject::Distances(m) => Some(&m.info),
            DataObject::Result(_) => None,
        }
    }

    fn info_mut(&mut self) -> Option<&mut Info> {
        match self {
            DataObject::Sequences(s) | DataObject::Alignment(s) => Some(&mut s.info),
            DataObject::Table(t) => Some(&mut t.info),
            DataObject::MotifCounts(m) => Some(&mut m.info),
            DataObject::MotifFreqs(m) => Some(&mut m.info),
            DataObject::Pssm(m) => Some(&mut m.info),
            DataObject::Distances(m) => Some(&mut m.info),
            DataObject::Result(_) => None,
        }
    }

    /// Identifier of the record this object derives from.
    pub fn source(&self) -> Option<&str> {
        match self {
            DataObject::Result(r) => Some(r.source.as_str()),
            other => other.info().and_then(|i| i.source.as_deref()),
        }
    }

    pub fn set_source(&mut self, source: Option<String>) {
        match self {
            DataObject::Result(r) => r.source = source.unwrap_or_default(),
            other => {
                if let Some(info) = other.info_mut() {
                    info.source = source;
                }
            }
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.set_source(Some(source.to_string()));
        self
    }

    pub fn as_sequences(&self) -> Option<&SequenceCollection> {
        match self {
            DataObject::Sequences(s) | DataObject::Alignment(s) => Some(s),
            _ => None,
        }
    }

    /// Long-format table for 2-D labelled objects, `None` for everything else.
    pub fn to_long_form(&self) -> Option<Table> {
        match self {
            DataObject::MotifCounts(m) => Some(m.to_long_form()),
            DataObject::MotifFreqs(m) => Some(m.to_long_form()),
            DataObject::Pssm(m) => Some(m.to_long_form()),
            DataObject::Distances(m) => Some(m.to_long_form()),
            _ => None,
        }
    }

    pub fn to_rich_dict(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Reconstruct an object from its rich dict.
///
/// A `"NotCompleted"` record comes back as the `Err` it describes, so a
/// persisted failure keeps flowing as a failure.
pub fn deserialise_object(value: serde_json::Value) -> AppResult<DataObject> {
    const ORIGIN: &str = "deserialise_object";
    let kind = value.get("type").and_then(|t| t.as_str()).map(str::to_string);
    match kind.as_deref() {
        Some(not_completed::RICH_DICT_TYPE) => match NotCompleted::from_rich_dict(value) {
            Ok(marker) => Err(marker),
            Err(e) => Err(NotCompleted::error(ORIGIN, e)),
        },
        Some(_) => serde_json::from_value(value).map_err(|e| NotCompleted::error(ORIGIN, e)),
        None => Err(NotCompleted::error(
            ORIGIN,
            "record has no 'type' key",
        )),
    }
}

/// Parse JSON text and reconstruct the object it describes.
pub fn deserialise_json(raw: &str) -> AppResult<DataObject> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| NotCompleted::error("deserialise_object", e))?;
    deserialise_object(value)
}
