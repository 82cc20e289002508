//! Data models for cached definitions.
//!
//! - `StoredDefinition`: one row of the definition store
//! - `TableCount`: per-table record count, in catalog order
//! - `DefinitionSummary`: display name and icon pulled from a definition

pub mod definition;
pub mod summary;

pub use definition::{StoredDefinition, TableCount};
pub use summary::{DefinitionSummary, DisplayProperties};
