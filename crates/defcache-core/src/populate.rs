//! Startup population of the definition store.
//!
//! Every catalog table is checked against the store. Tables that already
//! have rows are reused as-is; empty tables are downloaded and written in
//! one batch. A table that fails is logged, reported with a count of 0,
//! and never stops the others.

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::TableSource;
use crate::catalog::{Catalog, CatalogEntry};
use crate::models::TableCount;
use crate::store::{DefinitionStore, StoreError};

// ============================================================================
// Constants
// ============================================================================

/// Default number of tables downloaded at once.
/// The big tables are tens of megabytes; a handful in flight keeps memory
/// bounded while still overlapping network and disk work.
pub const MAX_CONCURRENT_FETCHES: usize = 4;

/// What happened to one table during population
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    /// Rows were already stored; nothing fetched
    Cached,
    /// Downloaded and stored during this run
    Fetched,
    /// Fetch, decode or write failed; the message says which
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table_name: String,
    pub count: u64,
    pub outcome: TableOutcome,
}

impl TableReport {
    fn new(entry: &CatalogEntry, count: u64, outcome: TableOutcome) -> Self {
        Self {
            table_name: entry.table_name.clone(),
            count,
            outcome,
        }
    }

    pub fn to_count(&self) -> TableCount {
        TableCount::new(self.table_name.clone(), self.count)
    }
}

/// Progress messages sent while population runs
#[derive(Debug, Clone)]
pub enum PopulateEvent {
    Fetching(String),
    Finished(TableReport),
}

pub struct Populator<S> {
    store: DefinitionStore,
    source: S,
    concurrency: usize,
    progress: Option<mpsc::Sender<PopulateEvent>>,
}

impl<S: TableSource> Populator<S> {
    pub fn new(store: DefinitionStore, source: S) -> Self {
        Self {
            store,
            source,
            concurrency: MAX_CONCURRENT_FETCHES,
            progress: None,
        }
    }

    /// Number of tables processed at once (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Send progress events to `tx` as tables are processed
    pub fn with_progress(mut self, tx: mpsc::Sender<PopulateEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Populate every table, returning counts in catalog order
    pub async fn populate(&self, catalog: &Catalog) -> Vec<TableCount> {
        self.run(catalog)
            .await
            .iter()
            .map(TableReport::to_count)
            .collect()
    }

    /// Populate every table, returning a report per table in catalog order.
    /// Only returns once every table has settled.
    pub async fn run(&self, catalog: &Catalog) -> Vec<TableReport> {
        // Futures are built up front so the stream holds no closure; this
        // keeps `run` usable from `tokio::spawn`.
        let tables: Vec<_> = catalog
            .entries()
            .iter()
            .map(|entry| self.populate_table(entry))
            .collect();
        let reports: Vec<TableReport> = stream::iter(tables)
            .buffered(self.concurrency)
            .collect()
            .await;

        let total = reports.iter().map(|r| r.count).sum::<u64>();
        let failed = reports
            .iter()
            .filter(|r| matches!(r.outcome, TableOutcome::Failed(_)))
            .count();
        info!(tables = reports.len(), total, failed, "Loaded all tables");

        reports
    }

    async fn notify(&self, event: PopulateEvent) {
        if let Some(ref tx) = self.progress {
            if tx.send(event).await.is_err() {
                debug!("Progress receiver dropped");
            }
        }
    }

    async fn populate_table(&self, entry: &CatalogEntry) -> TableReport {
        let report = self.populate_table_inner(entry).await;
        self.notify(PopulateEvent::Finished(report.clone())).await;
        report
    }

    async fn populate_table_inner(&self, entry: &CatalogEntry) -> TableReport {
        let table = entry.table_name.as_str();

        match self.store.count_by_table_async(table).await {
            Ok(count) if count > 0 => {
                debug!(table, count, "Table already cached");
                return TableReport::new(entry, count, TableOutcome::Cached);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(table, error = %e, "Failed to count stored definitions, skipping table");
                return TableReport::new(entry, 0, TableOutcome::Failed(e.to_string()));
            }
        }

        info!(table, path = %entry.path, "Fetching");
        self.notify(PopulateEvent::Fetching(entry.table_name.clone())).await;

        let document = match self.source.fetch_table(&entry.path).await {
            Ok(document) => document,
            Err(e) => {
                warn!(table, error = %e, "Failed to fetch table, skipping past that error");
                return TableReport::new(entry, 0, TableOutcome::Failed(e.to_string()));
            }
        };

        // Document order defines each definition's position.
        let definitions: Vec<Value> = document.into_iter().map(|(_, def)| def).collect();
        info!(table, definitions = definitions.len(), "Storing");

        match self
            .store
            .put_batch_async(entry.table_name.clone(), definitions)
            .await
        {
            Ok(stored) => {
                info!(table, stored, "Done");
                TableReport::new(entry, stored, TableOutcome::Fetched)
            }
            Err(e) => {
                warn!(table, error = %e, "Failed to store table, skipping past that error");
                TableReport::new(entry, 0, TableOutcome::Failed(e.to_string()))
            }
        }
    }
}

/// Per-table counts of what is already stored, without fetching anything
pub async fn stored_counts(
    store: &DefinitionStore,
    catalog: &Catalog,
) -> Result<Vec<TableCount>, StoreError> {
    let mut counts = Vec::with_capacity(catalog.len());
    for entry in catalog.entries() {
        let count = store.count_by_table_async(&entry.table_name).await?;
        counts.push(TableCount::new(entry.table_name.clone(), count));
    }
    Ok(counts)
}

// ============================================================================
// Tests
// ============================================================================
