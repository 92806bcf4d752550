//! Destination storage for envelope rows
//!
//! The [`EnvelopeStore`] trait is the seam between the loader and the
//! warehouse. Each backend implements existence lookups and append-only
//! writes; the loader owns the dedup decisions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{IngestError, Result};
use crate::loader::EnvelopeRow;

pub mod memory;
pub mod postgres;

pub use memory::MemoryEnvelopeStore;
pub use postgres::PgEnvelopeStore;

/// Schema-qualified destination table
///
/// Names are interpolated into SQL, so only lowercase ASCII letters, digits
/// and underscores are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    schema: String,
    table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Result<Self> {
        let schema = schema.into();
        let table = table.into();

        for name in [&schema, &table] {
            if !is_identifier(name) {
                return Err(IngestError::config(format!(
                    "Invalid SQL identifier '{name}': use lowercase letters, digits and underscores"
                )));
            }
        }

        Ok(Self { schema, table })
    }

    /// Built-in names known to be valid identifiers
    pub(crate) fn trusted(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `schema.table`
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63
}

/// Append-only persistence for envelope rows
#[async_trait]
pub trait EnvelopeStore: Send + Sync {
    /// Which of `ids` are already present in `table`.
    ///
    /// Fails when the table is missing or the query errors; callers decide
    /// how to react.
    async fn existing_ids(&self, table: &TableRef, ids: &[String]) -> Result<HashSet<String>>;

    /// Append every row, creating the table if needed. Returns rows written.
    async fn append(&self, table: &TableRef, rows: &[EnvelopeRow]) -> Result<u64>;

    /// Append only rows whose id is not yet stored, atomically per row.
    /// Returns rows written.
    async fn insert_if_absent(&self, table: &TableRef, rows: &[EnvelopeRow]) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ref_validation() {
        let table = TableRef::new("raw", "qb_invoices").unwrap();
        assert_eq!(table.qualified(), "raw.qb_invoices");
        assert_eq!(table.to_string(), "raw.qb_invoices");

        assert!(TableRef::new("raw", "qb-invoices").is_err());
        assert!(TableRef::new("raw; drop table x", "t").is_err());
        assert!(TableRef::new("Raw", "t").is_err());
        assert!(TableRef::new("raw", "").is_err());
        assert!(TableRef::new("raw", "1table").is_err());
    }
}
