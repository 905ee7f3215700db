//! bioapp: composable apps over persistent data stores
//!
//! Small, independently testable units of work ("apps") are chained into
//! pipelines that load records, transform them and write results back to a
//! data store. A record that cannot be processed never aborts a batch: it
//! becomes a [`NotCompleted`] value that flows through the rest of the
//! pipeline and is filed in the output store's not-completed log.
//!
//! # Architecture
//!
//! ## Data Stores
//!
//! - **Directory** (`core::directory`): one file per record, filtered by
//!   suffix, with `not_completed/` and `checksums/` alongside
//! - **Database** (`core::sqlite`): one SQLite file with `records`,
//!   `not_completed` and `state` tables, writes serialized per store
//!
//! Both implement [`DataStore`]; [`open_data_store`] picks one from the path.
//!
//! ## Apps
//!
//! - `apps::loaders`: identifier to data object
//! - `apps::writers`: data object (or failure) to store record
//! - `apps::serialise`: object, primitive, pickled bytes and compressed bytes
//! - `apps::composable`: chaining and batch execution (`apply_to`)
//!
//! # Examples
//!
//! ```no_run
//! use bioapp::apps::{App, LoadAligned, WriteSeqs};
//! use bioapp::core::config::ApplyOptions;
//! use bioapp::{DataStore, Mode, open_data_store};
//!
//! # fn main() -> Result<(), bioapp::BioappError> {
//! let input = open_data_store("raw", Some("fasta"), Mode::Read, None)?;
//! let output = open_data_store("aligned", Some("fasta"), Mode::Overwrite, None)?;
//! let pipeline = LoadAligned::new("fasta")? + WriteSeqs::new(output, "fasta")?;
//! let results = pipeline.apply_to(input.members()?, &ApplyOptions::serial())?;
//! println!("{} inputs processed", results.len());
//! # Ok(())
//! # }
//! ```

pub mod apps;
pub mod core;
pub mod data;

pub use crate::core::error::BioappError;
pub use crate::core::not_completed::{AppResult, FailureCode, NotCompleted};
pub use crate::core::store::{DataMember, DataStore, Mode, open_data_store};
pub use crate::data::object::DataObject;
