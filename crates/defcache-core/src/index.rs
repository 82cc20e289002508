//! Mapping from a global grid index to a (table, offset) pair.
//!
//! The grid shows every table back to back in catalog order. A cell's
//! global index is resolved by walking the per-table counts.

use serde::{Deserialize, Serialize};

use crate::models::TableCount;

/// Where a global index lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Record { table_name: String, offset: u64 },
    /// Past the end of all tables, or negative
    Unknown,
}

impl Slot {
    pub fn record(table_name: impl Into<String>, offset: u64) -> Self {
        Slot::Record {
            table_name: table_name.into(),
            offset,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Slot::Unknown)
    }
}

/// How an index sitting exactly on a table's cumulative end is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryRule {
    /// The boundary index belongs to the next table. Offsets are always
    /// inside their table.
    #[default]
    Exclusive,
    /// The boundary index stays in the current table at offset == count.
    /// Legacy grid behavior: one phantom cell at the end of every table.
    Inclusive,
}

/// Resolve a global index against ordered per-table counts
pub fn resolve_index(counts: &[TableCount], global_index: i64, rule: BoundaryRule) -> Slot {
    let Ok(index) = u64::try_from(global_index) else {
        return Slot::Unknown;
    };

    let mut acc: u64 = 0;
    for table in counts {
        let new_acc = acc.saturating_add(table.count);
        let past_table = match rule {
            BoundaryRule::Exclusive => index >= new_acc,
            BoundaryRule::Inclusive => index > new_acc,
        };

        if past_table {
            acc = new_acc;
        } else {
            return Slot::record(table.table_name.clone(), index - acc);
        }
    }

    Slot::Unknown
}

/// First global index of a table, if it is in `counts`
pub fn table_start(counts: &[TableCount], table_name: &str) -> Option<u64> {
    let mut acc = 0u64;
    for table in counts {
        if table.table_name == table_name {
            return Some(acc);
        }
        acc = acc.saturating_add(table.count);
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
