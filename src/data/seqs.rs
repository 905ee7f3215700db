//! Named sequence collections.

use serde::{Deserialize, Serialize};

/// Provenance carried by every data object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    /// Identifier of the record the object was loaded from.
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub name: String,
    pub seq: String,
}

impl Sequence {
    /// Number of positions (characters, not bytes).
    pub fn len(&self) -> usize {
        self.seq.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

/// Ordered, named sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCollection {
    pub seqs: Vec<Sequence>,
    #[serde(default)]
    pub moltype: Option<String>,
    #[serde(default)]
    pub info: Info,
}

impl SequenceCollection {
    pub fn new<N, S>(pairs: impl IntoIterator<Item = (N, S)>) -> Self
    where
        N: Into<String>,
        S: Into<String>,
    {
        Self {
            seqs: pairs
                .into_iter()
                .map(|(name, seq)| Sequence {
                    name: name.into(),
                    seq: seq.into(),
                })
                .collect(),
            moltype: None,
            info: Info::default(),
        }
    }

    pub fn with_moltype(mut self, moltype: &str) -> Self {
        self.moltype = Some(moltype.to_string());
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.seqs.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn num_seqs(&self) -> usize {
        self.seqs.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.seqs
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.seq.as_str())
    }

    /// Length shared by all sequences, `None` when lengths differ or empty.
    pub fn aligned_length(&self) -> Option<usize> {
        let first = self.seqs.first()?.len();
        self.seqs
            .iter()
            .all(|s| s.len() == first)
            .then_some(first)
    }

    /// Copy with gap characters removed.
    pub fn degap(&self) -> Self {
        let mut out = self.clone();
        for s in &mut out.seqs {
            s.seq.retain(|c| c != '-' && c != '?');
        }
        out
    }
}
