//! Application state management for defcache.
//!
//! This module contains the `App` struct: the table counts produced by
//! population, the grid selection and viewport, one `RecordResolver` per
//! visible cell, and the channels the background population task reports
//! through.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use ratatui::layout::Rect;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use defcache_core::grid::{scroll_to_show, GridLayout};
use defcache_core::index::table_start;
use defcache_core::utils::age_display;
use defcache_core::{
    resolve_index, Config, ContentClient, DefinitionStore, DefinitionSummary, Lookup,
    PopulateEvent, Populator, RecordResolver, Slot, TableCount, TableOutcome, TableReport,
};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the population progress channel.
/// Two events per table; the main loop drains it every tick.
const CHANNEL_BUFFER_SIZE: usize = 64;

/// Terminal lines each grid row takes
pub const CELL_HEIGHT: u16 = 3;

/// Number of rows to scroll on page up/down
pub const PAGE_SCROLL_ROWS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    ShowingHelp,
    Quitting,
}

/// Where startup population stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Population {
    Running {
        finished: usize,
        total: usize,
        current: Option<String>,
    },
    Done {
        failed: Vec<String>,
    },
}

pub struct App {
    pub config: Config,
    store: DefinitionStore,
    pub state: AppState,

    /// Per-table counts in catalog order; empty until population completes
    pub counts: Vec<TableCount>,
    pub total: u64,
    pub population: Population,

    pub layout: GridLayout,
    pub first_row: u64,
    pub visible_rows: u64,
    /// Global index of the selected cell
    pub selected: u64,

    /// One resolver per visible cell, row-major from the top-left
    cells: Vec<RecordResolver>,

    /// populated_at display per table, filled lazily for the status bar
    table_ages: HashMap<String, String>,
    /// Age of the selected cell's table
    pub selected_age: Option<String>,

    pub status_message: Option<String>,

    progress_rx: mpsc::Receiver<PopulateEvent>,
    progress_tx: mpsc::Sender<PopulateEvent>,
    done_rx: Option<oneshot::Receiver<Vec<TableReport>>>,
}

impl App {
    pub fn new(config: Config, store: DefinitionStore) -> Self {
        let (progress_tx, progress_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let tables = config.catalog().len();

        Self {
            layout: GridLayout::new(0, config.column_width, 0),
            config,
            store,
            state: AppState::Normal,
            counts: Vec::new(),
            total: 0,
            population: Population::Running {
                finished: 0,
                total: tables,
                current: None,
            },
            first_row: 0,
            visible_rows: 0,
            selected: 0,
            cells: Vec::new(),
            table_ages: HashMap::new(),
            selected_age: None,
            status_message: None,
            progress_rx,
            progress_tx,
            done_rx: None,
        }
    }

    /// Spawn startup population in the background
    pub fn start_population(&mut self) -> Result<()> {
        let client = ContentClient::new(self.config.origin.clone(), self.config.request_timeout_secs)
            .context("Failed to create content client")?;
        let populator = Populator::new(self.store.clone(), client)
            .with_concurrency(self.config.concurrency)
            .with_progress(self.progress_tx.clone());
        let catalog = self.config.catalog();

        let (done_tx, done_rx) = oneshot::channel();
        self.done_rx = Some(done_rx);

        info!(tables = catalog.len(), origin = %self.config.origin, "Starting population");
        tokio::spawn(async move {
            let reports = populator.run(&catalog).await;
            if done_tx.send(reports).is_err() {
                debug!("App went away before population finished");
            }
        });
        Ok(())
    }

    /// Drain progress events and pick up the final counts once population completes
    pub fn check_background_tasks(&mut self) {
        while let Ok(event) = self.progress_rx.try_recv() {
            if let Population::Running {
                ref mut finished,
                ref mut current,
                ..
            } = self.population
            {
                match event {
                    PopulateEvent::Fetching(table) => *current = Some(table),
                    PopulateEvent::Finished(_) => *finished += 1,
                }
            }
        }

        let Some(ref mut rx) = self.done_rx else {
            return;
        };
        match rx.try_recv() {
            Ok(reports) => {
                self.done_rx = None;
                self.finish_population(reports);
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                warn!("Population task ended without a result");
                self.done_rx = None;
                self.finish_population(Vec::new());
            }
        }
    }

    fn finish_population(&mut self, reports: Vec<TableReport>) {
        let failed: Vec<String> = reports
            .iter()
            .filter(|r| matches!(r.outcome, TableOutcome::Failed(_)))
            .map(|r| r.table_name.clone())
            .collect();

        self.counts = reports.iter().map(TableReport::to_count).collect();
        self.total = TableCount::total(&self.counts);
        self.selected = 0;
        self.first_row = 0;

        if !failed.is_empty() {
            self.status_message = Some(format!(
                "{} table(s) failed to load: {}",
                failed.len(),
                failed.join(", ")
            ));
        }
        info!(total = self.total, failed = failed.len(), "Population finished");
        self.population = Population::Done { failed };
    }

    /// Fit the grid to `area` and point every visible cell at its slot.
    /// Called once per frame before drawing.
    pub fn sync_viewport(&mut self, area: Rect) {
        self.layout = GridLayout::new(area.width, self.config.column_width, self.total);
        self.visible_rows = u64::from(area.height / CELL_HEIGHT);

        let (selected_row, _) = self.layout.position_of(self.selected);
        self.first_row = scroll_to_show(self.first_row, self.visible_rows, selected_row);

        let cell_count = (self.visible_rows * self.layout.columns) as usize;
        self.cells.truncate(cell_count);
        while self.cells.len() < cell_count {
            self.cells.push(RecordResolver::new(self.store.clone()));
        }

        let first_index = self.first_row * self.layout.columns;
        let slots: Vec<Slot> = (0..cell_count as u64)
            .map(|i| self.slot_for(first_index + i))
            .collect();
        for (cell, slot) in self.cells.iter_mut().zip(slots) {
            cell.request(slot);
        }

        self.selected_age = match self.slot_for(self.selected) {
            Slot::Record { table_name, .. } => self.table_age(&table_name),
            Slot::Unknown => None,
        };
    }

    /// Slot shown at a global index
    pub fn slot_for(&self, index: u64) -> Slot {
        if index >= self.total {
            return Slot::Unknown;
        }
        match i64::try_from(index) {
            Ok(index) => resolve_index(&self.counts, index, self.config.boundary_rule),
            Err(_) => Slot::Unknown,
        }
    }

    /// Slot and load state of a visible cell, by viewport position
    pub fn cell(&self, row: u64, col: u64) -> Option<(Slot, Lookup)> {
        let i = (row * self.layout.columns + col) as usize;
        self.cells
            .get(i)
            .map(|cell| (cell.slot().cloned().unwrap_or(Slot::Unknown), cell.state()))
    }

    /// "cached 2d ago" for a table, read from the store once per table
    pub fn table_age(&mut self, table_name: &str) -> Option<String> {
        if let Some(age) = self.table_ages.get(table_name) {
            return Some(age.clone());
        }
        match self.store.populated_at(table_name) {
            Ok(Some(at)) => {
                let age = age_display(at, Utc::now());
                self.table_ages.insert(table_name.to_string(), age.clone());
                Some(age)
            }
            Ok(None) => None,
            Err(e) => {
                debug!(table = table_name, error = %e, "Failed to read table age");
                None
            }
        }
    }

    // ===== Navigation =====

    fn select(&mut self, index: u64) {
        if self.total == 0 {
            self.selected = 0;
        } else {
            self.selected = index.min(self.total - 1);
        }
    }

    pub fn move_left(&mut self) {
        self.select(self.selected.saturating_sub(1));
    }

    pub fn move_right(&mut self) {
        self.select(self.selected.saturating_add(1));
    }

    pub fn move_up(&mut self) {
        self.select(self.selected.saturating_sub(self.layout.columns));
    }

    pub fn move_down(&mut self) {
        let next = self.selected.saturating_add(self.layout.columns);
        if next < self.total {
            self.select(next);
        }
    }

    fn page_step(&self) -> u64 {
        let rows = if self.visible_rows > 0 {
            self.visible_rows
        } else {
            PAGE_SCROLL_ROWS
        };
        self.layout.columns * rows
    }

    pub fn page_up(&mut self) {
        self.select(self.selected.saturating_sub(self.page_step()));
    }

    pub fn page_down(&mut self) {
        self.select(self.selected.saturating_add(self.page_step()));
    }

    pub fn select_first(&mut self) {
        self.select(0);
    }

    pub fn select_last(&mut self) {
        self.select(u64::MAX);
    }

    /// First global index of every table with rows, in catalog order
    fn table_starts(&self) -> Vec<u64> {
        self.counts
            .iter()
            .filter(|table| table.count > 0)
            .filter_map(|table| table_start(&self.counts, &table.table_name))
            .collect()
    }

    /// Jump to the first cell of the next table with any rows
    pub fn next_table(&mut self) {
        if let Some(start) = self.table_starts().into_iter().find(|&s| s > self.selected) {
            self.select(start);
        }
    }

    /// Jump to the first cell of the current table, or the previous one
    /// when already there
    pub fn prev_table(&mut self) {
        if let Some(start) = self.table_starts().into_iter().rev().find(|&s| s < self.selected) {
            self.select(start);
        }
    }

    /// Icon URL of the selected definition, once its cell has loaded
    pub fn selected_icon_url(&self) -> Option<String> {
        if self.layout.columns == 0 {
            return None;
        }
        let (row, col) = self.layout.position_of(self.selected);
        let view_row = row.checked_sub(self.first_row)?;
        let (_, lookup) = self.cell(view_row, col)?;
        DefinitionSummary::from_value(lookup.value()?).icon_url(&self.config.origin)
    }
}

// ============================================================================
// Tests
// ============================================================================
