//! Composable apps: loaders, writers and serialization stages.

pub mod composable;
pub mod loaders;
pub mod serialise;
pub mod writers;

pub use composable::{App, Compose, FnApp, RunStatus, app_fn, run_status};
pub use loaders::{AsType, LoadAligned, LoadDb, LoadJson, LoadTabular, LoadUnaligned, Source};
pub use serialise::{Compress, Decompress, FromPrimitive, PickleIt, ToPrimitive, UnpickleIt};
pub use writers::{WriteDb, WriteJson, WriteSeqs, WriteTabular};
