//! Core infrastructure: failure markers, data stores and batch execution.

pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod logging;
pub mod not_completed;
pub mod parallel;
pub mod schemas;
pub mod sqlite;
pub mod store;
