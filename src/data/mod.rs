//! Minimal data object model consumed and produced by the I/O apps.

pub mod formats;
pub mod matrix;
pub mod object;
pub mod seqs;
pub mod table;

pub use matrix::{DistanceMatrix, MotifCountsArray, MotifFreqsArray, Pssm};
pub use object::{DataObject, GenericResult, deserialise_json, deserialise_object};
pub use seqs::{Info, Sequence, SequenceCollection};
pub use table::{Cell, Table};
