//! On-demand loading of single definitions for grid cells.
//!
//! Each visible cell owns a `RecordResolver`. When the cell scrolls to a new
//! coordinate the resolver cancels the lookup in flight and starts a new
//! one; a generation counter makes sure a late result for an old coordinate
//! is never published.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::index::Slot;
use crate::store::DefinitionStore;

/// Load state of one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Nothing settled yet (or nothing to look up)
    Pending,
    Loaded(Value),
    /// Lookup finished without a definition
    Absent,
}

impl Lookup {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Lookup::Pending)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Lookup::Loaded(value) => Some(value),
            _ => None,
        }
    }
}

/// Fetch one definition by position, folding every failure into `Absent`
pub async fn lookup(store: &DefinitionStore, table_name: &str, offset: u64) -> Lookup {
    match store.get_by_offset_async(table_name, offset).await {
        Ok(Some(row)) => Lookup::Loaded(row.definition),
        Ok(None) => Lookup::Absent,
        Err(e) => {
            debug!(table = table_name, offset, error = %e, "Definition lookup failed");
            Lookup::Absent
        }
    }
}

pub struct RecordResolver {
    store: DefinitionStore,
    current: Option<Slot>,
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<Lookup>>,
    task: Option<JoinHandle<()>>,
}

impl RecordResolver {
    pub fn new(store: DefinitionStore) -> Self {
        let (state, _) = watch::channel(Lookup::Pending);
        Self {
            store,
            current: None,
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
            task: None,
        }
    }

    /// Point this resolver at a new coordinate.
    ///
    /// Must be called from inside a Tokio runtime. Requesting the coordinate
    /// already requested does nothing; `Slot::Unknown` leaves the state
    /// `Pending` without touching the store.
    pub fn request(&mut self, slot: Slot) {
        if self.current.as_ref() == Some(&slot) {
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.state.send_replace(Lookup::Pending);
        self.current = Some(slot.clone());

        let Slot::Record { table_name, offset } = slot else {
            return;
        };

        let store = self.store.clone();
        let state = Arc::clone(&self.state);
        let latest = Arc::clone(&self.generation);

        self.task = Some(tokio::spawn(async move {
            let result = lookup(&store, &table_name, offset).await;
            if !publish_if_current(&state, &latest, generation, result) {
                debug!(table = %table_name, offset, "Discarding superseded lookup");
            }
        }));
    }

    /// Current load state
    pub fn state(&self) -> Lookup {
        self.state.borrow().clone()
    }

    /// Watch the load state
    pub fn subscribe(&self) -> watch::Receiver<Lookup> {
        self.state.subscribe()
    }

    /// Coordinate most recently requested
    pub fn slot(&self) -> Option<&Slot> {
        self.current.as_ref()
    }
}

/// Store `result` only if `generation` is still the latest request.
/// Checked under the channel's write lock so a newer request can't slip in
/// between the check and the store.
fn publish_if_current(
    state: &watch::Sender<Lookup>,
    latest: &AtomicU64,
    generation: u64,
    result: Lookup,
) -> bool {
    state.send_if_modified(|current| {
        if latest.load(Ordering::SeqCst) == generation {
            *current = result;
            true
        } else {
            false
        }
    })
}

impl Drop for RecordResolver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    fn store_with(table: &str, n: u64) -> DefinitionStore {
        let store = DefinitionStore::open_in_memory().unwrap();
        let defs: Vec<Value> = (0..n).map(|i| json!({"hash": 500 + i, "index": i})).collect();
        store.put_batch(table, &defs).unwrap();
        store
    }

    async fn settled(resolver: &RecordResolver) -> Lookup {
        let mut rx = resolver.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|l| l.is_settled()))
            .await
            .expect("lookup never settled")
            .unwrap()
            .clone();
        state
    }

    #[tokio::test]
    async fn test_starts_pending() {
        let resolver = RecordResolver::new(DefinitionStore::open_in_memory().unwrap());
        assert_eq!(resolver.state(), Lookup::Pending);
        assert!(!resolver.state().is_settled());
        assert!(resolver.state().value().is_none());
        assert!(resolver.slot().is_none());
    }

    #[tokio::test]
    async fn test_found_record_loads() {
        let mut resolver = RecordResolver::new(store_with("T", 3));
        resolver.request(Slot::record("T", 1));

        let state = settled(&resolver).await;
        assert_eq!(state.value().unwrap()["index"], 1);
        assert_eq!(state, Lookup::Loaded(json!({"hash": 501, "index": 1})));
    }

    #[tokio::test]
    async fn test_missing_record_settles_absent() {
        let mut resolver = RecordResolver::new(store_with("T", 3));
        resolver.request(Slot::record("T", 99));

        let state = settled(&resolver).await;
        assert_eq!(state, Lookup::Absent);
        assert!(state.is_settled());
        assert!(state.value().is_none());
    }

    #[tokio::test]
    async fn test_unknown_slot_stays_pending() {
        let mut resolver = RecordResolver::new(store_with("T", 3));
        resolver.request(Slot::Unknown);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(resolver.state(), Lookup::Pending);
        assert_eq!(resolver.slot(), Some(&Slot::Unknown));
    }

    #[tokio::test]
    async fn test_newer_request_wins() {
        let mut resolver = RecordResolver::new(store_with("T", 12));
        resolver.request(Slot::record("T", 5));
        resolver.request(Slot::record("T", 9));

        let state = settled(&resolver).await;
        assert_eq!(state.value().unwrap()["index"], 9);

        // Give any straggler a chance to run; it must not overwrite.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(resolver.state().value().unwrap()["index"], 9);
    }

    #[tokio::test]
    async fn test_late_result_for_old_slot_is_discarded() {
        let mut resolver = RecordResolver::new(store_with("T", 12));
        resolver.request(Slot::record("T", 5));
        let first_generation = resolver.generation.load(Ordering::SeqCst);
        resolver.request(Slot::record("T", 9));
        assert_eq!(settled(&resolver).await.value().unwrap()["index"], 9);

        // The lookup for offset 5 finishing after offset 9 has settled
        let late = lookup(&resolver.store, "T", 5).await;
        assert_eq!(late.value().unwrap()["index"], 5);
        let published = publish_if_current(
            &resolver.state,
            &resolver.generation,
            first_generation,
            late,
        );

        assert!(!published);
        assert_eq!(resolver.state().value().unwrap()["index"], 9);
    }

    #[tokio::test]
    async fn test_current_generation_publishes() {
        let resolver = RecordResolver::new(store_with("T", 1));
        let generation = resolver.generation.load(Ordering::SeqCst);
        let mut rx = resolver.subscribe();

        assert!(publish_if_current(
            &resolver.state,
            &resolver.generation,
            generation,
            Lookup::Absent
        ));
        assert!(rx.has_changed().unwrap());
        assert_eq!(resolver.state(), Lookup::Absent);
    }

    #[tokio::test]
    async fn test_switching_to_unknown_clears_previous_value() {
        let mut resolver = RecordResolver::new(store_with("T", 3));
        resolver.request(Slot::record("T", 0));
        assert!(settled(&resolver).await.value().is_some());

        resolver.request(Slot::Unknown);
        assert_eq!(resolver.state(), Lookup::Pending);
    }

    #[tokio::test]
    async fn test_same_slot_is_not_reloaded() {
        let mut resolver = RecordResolver::new(store_with("T", 3));
        resolver.request(Slot::record("T", 2));
        settled(&resolver).await;

        resolver.request(Slot::record("T", 2));
        assert!(resolver.state().is_settled());
        assert_eq!(resolver.state().value().unwrap()["index"], 2);
    }

    #[tokio::test]
    async fn test_lookup_helper() {
        let store = store_with("T", 2);
        assert!(matches!(lookup(&store, "T", 0).await, Lookup::Loaded(_)));
        assert_eq!(lookup(&store, "T", 2).await, Lookup::Absent);
        assert_eq!(lookup(&store, "Other", 0).await, Lookup::Absent);
    }
}
