//! Local SQLite storage.

mod sqlite;
pub mod tables;

pub use sqlite::{Database, DatabaseStats, TableStats};
