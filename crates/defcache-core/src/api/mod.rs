//! HTTP client module for the content API.
//!
//! This module provides the `ContentClient` for downloading definition
//! tables from the content origin, and the `TableSource` trait the
//! population engine fetches through.
//!
//! The content API needs no authentication; every table is a single
//! JSON object whose values are the table's definitions.

pub mod client;
pub mod error;

pub use client::{ContentClient, DefinitionMap, TableSource};
pub use error::FetchError;
