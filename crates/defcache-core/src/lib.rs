//! Core library for defcache.
//!
//! defcache downloads game definition tables from a content API, keeps them
//! in a local SQLite store, and serves single definitions on demand to a
//! virtualized grid. Modules, leaves first:
//!
//! - `store`: the definition store (SQLite)
//! - `api`: content client and the `TableSource` trait
//! - `catalog`: the ordered table list
//! - `populate`: fetch-or-reuse population at startup
//! - `index`: global grid index -> (table, offset)
//! - `resolver`: per-cell asynchronous definition lookups
//! - `grid`: grid geometry
//! - `config`, `models`, `utils`

pub mod api;
pub mod catalog;
pub mod config;
pub mod grid;
pub mod index;
pub mod models;
pub mod populate;
pub mod resolver;
pub mod store;
pub mod utils;

pub use api::{ContentClient, FetchError, TableSource};
pub use catalog::{Catalog, CatalogEntry};
pub use config::Config;
pub use grid::GridLayout;
pub use index::{resolve_index, BoundaryRule, Slot};
pub use models::{DefinitionSummary, StoredDefinition, TableCount};
pub use populate::{stored_counts, PopulateEvent, Populator, TableOutcome, TableReport};
pub use resolver::{Lookup, RecordResolver};
pub use store::{DefinitionStore, StoreError};
