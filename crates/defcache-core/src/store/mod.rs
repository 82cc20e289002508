//! Local definition store.
//!
//! This module provides the `DefinitionStore`, a SQLite database holding
//! every fetched definition keyed by (table name, hash), with a second
//! lookup path by (table name, position in the fetched document).
//!
//! Data is never refreshed once stored: a table with any rows is treated
//! as fully cached.

pub mod definitions;
pub mod error;

pub use definitions::{default_path, DefinitionStore, DB_FILE, SCHEMA_VERSION};
pub use error::StoreError;
