//! Loader apps: resolve a record reference to a data object.
//!
//! Every loader takes a [`Source`] and returns a [`DataObject`] or a
//! [`NotCompleted`]. Handing a loader an object that is already in memory
//! is a failure, not a panic. Reading a member of a store's not-completed
//! log returns the failure recorded there.

use crate::apps::composable::{App, impl_add};
use crate::core::error::BioappError;
use crate::core::not_completed::{AppResult, NotCompleted};
use crate::core::store::{DataMember, Section};
use crate::data::formats::SeqFormat;
use crate::data::matrix::{DistanceMatrix, MotifCountsArray, MotifFreqsArray, Pssm};
use crate::data::object::{self, DataObject};
use crate::data::seqs::SequenceCollection;
use crate::data::table::Table;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// A reference to loadable content.
#[derive(Debug, Clone)]
pub enum Source {
    Path(PathBuf),
    Member(DataMember),
    Bytes {
        identifier: Option<String>,
        data: Vec<u8>,
    },
    /// An object already in memory. Never loadable.
    Object(Box<DataObject>),
}

impl Source {
    pub fn bytes(identifier: &str, data: impl Into<Vec<u8>>) -> Self {
        Source::Bytes {
            identifier: Some(identifier.to_string()),
            data: data.into(),
        }
    }

    /// Identifier recorded as the loaded object's source.
    pub fn identifier(&self) -> Option<String> {
        match self {
            Source::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            Source::Member(member) => Some(member.unique_id.clone()),
            Source::Bytes { identifier, .. } => identifier.clone(),
            Source::Object(obj) => obj.source().map(str::to_string),
        }
    }

    /// Raw content plus identifier.
    fn read(&self, origin: &str) -> AppResult<(Option<String>, Vec<u8>)> {
        let identifier = self.identifier();
        let data = match self {
            Source::Path(path) => fs::read(path)
                .map_err(|e| format!("cannot read {}: {}", path.display(), e)),
            Source::Member(member) => match member.read() {
                Ok(data) if member.section == Section::NotCompleted => {
                    return Err(recorded_failure(origin, &data, identifier));
                }
                Ok(data) => Ok(data),
                Err(e) => Err(e.to_string()),
            },
            Source::Bytes { data, .. } => Ok(data.clone()),
            Source::Object(obj) => Err(format!(
                "not a loadable identifier: got an in-memory {}",
                obj.provenance()
            )),
        };
        match data {
            Ok(data) => Ok((identifier, data)),
            Err(message) => Err(NotCompleted::error(origin, message).with_source(identifier)),
        }
    }

    fn read_text(&self, origin: &str) -> AppResult<(Option<String>, String)> {
        let (identifier, data) = self.read(origin)?;
        match String::from_utf8(data) {
            Ok(text) => Ok((identifier, text)),
            Err(e) => Err(NotCompleted::error(origin, e).with_source(identifier)),
        }
    }
}

/// The marker stored in a not-completed record, or a failure describing
/// why it could not be decoded.
fn recorded_failure(origin: &str, data: &[u8], identifier: Option<String>) -> NotCompleted {
    let parsed = std::str::from_utf8(data)
        .map_err(|e| e.to_string())
        .and_then(|raw| NotCompleted::from_json(raw).map_err(|e| e.to_string()));
    match parsed {
        Ok(marker) => marker,
        Err(e) => NotCompleted::error(origin, format!("corrupt not-completed record: {}", e))
            .with_source(identifier),
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::Path(PathBuf::from(path))
    }
}

impl From<DataMember> for Source {
    fn from(member: DataMember) -> Self {
        Source::Member(member)
    }
}

impl From<&DataMember> for Source {
    fn from(member: &DataMember) -> Self {
        Source::Member(member.clone())
    }
}

impl From<DataObject> for Source {
    fn from(obj: DataObject) -> Self {
        Source::Object(Box::new(obj))
    }
}

fn parse_seqs(
    origin: &str,
    format: SeqFormat,
    input: &Source,
) -> AppResult<(Option<String>, SequenceCollection)> {
    let (identifier, text) = input.read_text(origin)?;
    match format.parse(&text) {
        Ok(seqs) => Ok((identifier, seqs)),
        Err(e) => Err(NotCompleted::error(origin, e).with_source(identifier)),
    }
}

/// Sequences whose lengths must all agree.
#[derive(Debug, Clone)]
pub struct LoadAligned {
    format: SeqFormat,
    moltype: Option<String>,
}

impl LoadAligned {
    pub fn new(format: &str) -> Result<Self, BioappError> {
        Ok(Self {
            format: SeqFormat::from_str(format)?,
            moltype: None,
        })
    }

    pub fn with_moltype(mut self, moltype: &str) -> Self {
        self.moltype = Some(moltype.to_string());
        self
    }
}

impl App for LoadAligned {
    type Input = Source;
    type Output = DataObject;

    fn name(&self) -> &str {
        "load_aligned"
    }

    fn main(&self, input: Source) -> AppResult<DataObject> {
        let (identifier, mut seqs) = parse_seqs(self.name(), self.format, &input)?;
        if seqs.aligned_length().is_none() {
            return Err(NotCompleted::fail(
                self.name(),
                "sequences are not all the same length",
            )
            .with_source(identifier));
        }
        if self.moltype.is_some() {
            seqs.moltype = self.moltype.clone();
        }
        seqs.info.source = identifier;
        Ok(DataObject::Alignment(seqs))
    }
}

/// Sequences with gaps removed.
#[derive(Debug, Clone)]
pub struct LoadUnaligned {
    format: SeqFormat,
    moltype: Option<String>,
}

impl LoadUnaligned {
    pub fn new(format: &str) -> Result<Self, BioappError> {
        Ok(Self {
            format: SeqFormat::from_str(format)?,
            moltype: None,
        })
    }

    pub fn with_moltype(mut self, moltype: &str) -> Self {
        self.moltype = Some(moltype.to_string());
        self
    }
}

impl App for LoadUnaligned {
    type Input = Source;
    type Output = DataObject;

    fn name(&self) -> &str {
        "load_unaligned"
    }

    fn main(&self, input: Source) -> AppResult<DataObject> {
        let (identifier, seqs) = parse_seqs(self.name(), self.format, &input)?;
        let mut seqs = seqs.degap();
        if self.moltype.is_some() {
            seqs.moltype = self.moltype.clone();
        }
        seqs.info.source = identifier;
        Ok(DataObject::Sequences(seqs))
    }
}

/// Shape a delimited file is loaded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsType {
    #[default]
    Table,
    MotifCounts,
    MotifFreqs,
    Pssm,
    Distances,
}

impl FromStr for AsType {
    type Err = BioappError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(AsType::Table),
            "motif_counts" => Ok(AsType::MotifCounts),
            "motif_freqs" => Ok(AsType::MotifFreqs),
            "pssm" => Ok(AsType::Pssm),
            "distances" => Ok(AsType::Distances),
            other => Err(BioappError::Configuration(format!(
                "unknown tabular type '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadTabular {
    sep: char,
    with_header: bool,
    as_type: AsType,
}

impl LoadTabular {
    pub fn new(sep: char, with_header: bool, as_type: AsType) -> Self {
        Self {
            sep,
            with_header,
            as_type,
        }
    }

    pub fn tsv(as_type: AsType) -> Self {
        Self::new('\t', true, as_type)
    }

    pub fn csv(as_type: AsType) -> Self {
        Self::new(',', true, as_type)
    }

    fn reshape(&self, table: Table) -> Result<DataObject, String> {
        let obj = match self.as_type {
            AsType::Table => DataObject::Table(table),
            AsType::MotifCounts => DataObject::MotifCounts(MotifCountsArray::from_long_form(&table)?),
            AsType::MotifFreqs => DataObject::MotifFreqs(MotifFreqsArray::from_long_form(&table)?),
            AsType::Pssm => DataObject::Pssm(Pssm::from_long_form(&table)?),
            AsType::Distances => DataObject::Distances(DistanceMatrix::from_long_form(&table)?),
        };
        Ok(obj)
    }
}

impl Default for LoadTabular {
    fn default() -> Self {
        Self::tsv(AsType::Table)
    }
}

impl App for LoadTabular {
    type Input = Source;
    type Output = DataObject;

    fn name(&self) -> &str {
        "load_tabular"
    }

    fn main(&self, input: Source) -> AppResult<DataObject> {
        let (identifier, text) = input.read_text(self.name())?;
        let table = Table::from_delimited(&text, self.sep, self.with_header)
            .map_err(|e| NotCompleted::error(self.name(), e).with_source(identifier.clone()))?;
        let mut obj = self
            .reshape(table)
            .map_err(|e| NotCompleted::error(self.name(), e).with_source(identifier.clone()))?;
        obj.set_source(identifier);
        Ok(obj)
    }
}

/// JSON rich dict to its object.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadJson;

impl App for LoadJson {
    type Input = Source;
    type Output = DataObject;

    fn name(&self) -> &str {
        "load_json"
    }

    fn main(&self, input: Source) -> AppResult<DataObject> {
        let (identifier, text) = input.read_text(self.name())?;
        object::deserialise_json(&text).map_err(|e| {
            if e.source.is_some() {
                e
            } else {
                e.with_source(identifier)
            }
        })
    }
}

/// A record of a database store, including not-completed records, which
/// come back as the failure they hold.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadDb;

impl App for LoadDb {
    type Input = Source;
    type Output = DataObject;

    fn name(&self) -> &str {
        "load_db"
    }

    fn main(&self, input: Source) -> AppResult<DataObject> {
        if let Source::Bytes { .. } = input {
            return LoadJson.main(input);
        }
        let Source::Member(member) = &input else {
            return Err(NotCompleted::error(
                self.name(),
                "not a loadable identifier: expected a data store member",
            )
            .with_source(input.identifier()));
        };
        debug!(unique_id = %member.unique_id, section = ?member.section, "loading db record");
        let (identifier, text) = input.read_text(self.name())?;
        let mut obj = object::deserialise_json(&text)?;
        if obj.source().is_none() {
            obj.set_source(identifier);
        }
        Ok(obj)
    }
}

impl_add!(LoadAligned, LoadUnaligned, LoadTabular, LoadJson, LoadDb);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_is_configuration_error() {
        assert!(matches!(
            LoadAligned::new("nexus"),
            Err(BioappError::Configuration(_))
        ));
        assert!(LoadUnaligned::new("fasta").is_ok());
    }

    #[test]
    fn test_source_identifier() {
        assert_eq!(Source::from("data/brca1.fasta").identifier().as_deref(), Some("brca1.fasta"));
        assert_eq!(Source::bytes("x", "ACGT").identifier().as_deref(), Some("x"));
    }

    #[test]
    fn test_load_aligned_from_bytes() {
        let app = LoadAligned::new("fasta").unwrap().with_moltype("dna");
        let got = app.run(Source::bytes("x.fa", ">a\nAC-T\n>b\nACGT\n")).unwrap();
        let DataObject::Alignment(seqs) = got else {
            panic!("expected alignment");
        };
        assert_eq!(seqs.info.source.as_deref(), Some("x.fa"));
        assert_eq!(seqs.moltype.as_deref(), Some("dna"));
        assert_eq!(seqs.get("a"), Some("AC-T"));
    }

    #[test]
    fn test_load_aligned_rejects_ragged() {
        let err = LoadAligned::new("fasta")
            .unwrap()
            .run(Source::bytes("x.fa", ">a\nACG\n>b\nACGT\n"))
            .unwrap_err();
        assert_eq!(err.source.as_deref(), Some("x.fa"));
    }

    #[test]
    fn test_load_unaligned_degaps() {
        let got = LoadUnaligned::new("fasta")
            .unwrap()
            .run(Source::bytes("x.fa", ">a\nAC--GT\n"))
            .unwrap();
        assert_eq!(got.as_sequences().and_then(|s| s.get("a")), Some("ACGT"));
        assert_eq!(got.source(), Some("x.fa"));
    }

    #[test]
    fn test_in_memory_object_is_not_loadable() {
        let obj = DataObject::Sequences(SequenceCollection::new([("a", "AC")]));
        let err = LoadAligned::new("fasta").unwrap().run(obj.clone().into()).unwrap_err();
        assert!(err.message.contains("not a loadable identifier"));
        assert!(LoadJson.run(obj.clone().into()).is_err());
        assert!(LoadDb.run(obj.into()).is_err());
    }

    #[test]
    fn test_load_tabular_column_mismatch() {
        let err = LoadTabular::tsv(AsType::Table)
            .run(Source::bytes("t.tsv", "a\tb\n1\t2\t3\n"))
            .unwrap_err();
        assert_eq!(err.origin, "load_tabular");
    }

    #[test]
    fn test_load_tabular_distances() {
        let text = "dim-1\tdim-2\tvalue\na\tb\t1.5\nb\ta\t1.5\n";
        let got = LoadTabular::tsv(AsType::Distances)
            .run(Source::bytes("d.tsv", text))
            .unwrap();
        let DataObject::Distances(dm) = got else {
            panic!("expected distance matrix");
        };
        assert_eq!(dm.get("a", "b"), Some(1.5));
        assert_eq!(dm.info.source.as_deref(), Some("d.tsv"));
    }

    #[test]
    fn test_missing_path_is_not_completed() {
        let err = LoadJson.run(Source::from("/no/such/file.json")).unwrap_err();
        assert_eq!(err.source.as_deref(), Some("file.json"));
    }

    #[test]
    fn test_as_type_from_str() {
        assert_eq!("pssm".parse::<AsType>().unwrap(), AsType::Pssm);
        assert!("matrix".parse::<AsType>().is_err());
    }
}
