use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field inside every definition that carries its stable numeric identifier.
pub const KEY_FIELD: &str = "hash";

/// A definition as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDefinition {
    pub table_name: String,
    /// Stable identifier taken from the definition's `hash` field.
    pub key: i64,
    /// Ordinal position within the table's fetched document.
    pub position: u64,
    pub definition: Value,
}

impl StoredDefinition {
    /// Extract the record key from a raw definition.
    ///
    /// Hashes are unsigned 32-bit values in practice; anything that fits
    /// an `i64` is accepted.
    pub fn key_of(definition: &Value) -> Option<i64> {
        let field = definition.get(KEY_FIELD)?;
        field
            .as_i64()
            .or_else(|| field.as_u64().and_then(|v| i64::try_from(v).ok()))
    }
}

/// Number of stored records for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCount {
    pub table_name: String,
    pub count: u64,
}

impl TableCount {
    pub fn new(table_name: impl Into<String>, count: u64) -> Self {
        Self {
            table_name: table_name.into(),
            count,
        }
    }

    /// Sum of all counts in a sequence
    pub fn total(counts: &[TableCount]) -> u64 {
        counts.iter().map(|c| c.count).sum()
    }
}
