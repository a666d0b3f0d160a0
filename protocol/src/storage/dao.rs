//! Row-level persistence contract for confirmed transactions and their
//! asset rows.

use thiserror::Error;

use super::scope::Scope;

/// A flat persisted row: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate row in {table}: {key}")]
    Duplicate { table: String, key: String },

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Data access object used by the engine and the asset plugins.
pub trait TransactionStore: Send + Sync {
    /// Insert `row` into `table` as part of `scope`.
    fn insert(&self, table: &str, row: Row, scope: &mut Scope) -> Result<(), StoreError>;

    /// Number of rows in `table` whose columns equal every entry of
    /// `filter`.
    fn count(&self, table: &str, filter: &Row) -> Result<usize, StoreError>;

    /// Rows in `table` matching `filter`, in insertion order.
    fn find(&self, table: &str, filter: &Row) -> Result<Vec<Row>, StoreError>;
}

/// Build a single-column equality filter.
pub fn filter(column: &str, value: impl Into<serde_json::Value>) -> Row {
    let mut row = Row::new();
    row.insert(column.to_string(), value.into());
    row
}

/// `true` if every column in `filter` has the same value in `row`.
pub fn row_matches(row: &Row, filter: &Row) -> bool {
    filter.iter().all(|(k, v)| row.get(k) == Some(v))
}
