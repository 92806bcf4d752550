//! In-process envelope store
//!
//! Backs `--dry-run` and the loader tests. Tables spring into existence on
//! first write; an unknown table reads as empty.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{EnvelopeStore, TableRef};
use crate::error::{IngestError, Result};
use crate::loader::EnvelopeRow;

#[derive(Default)]
pub struct MemoryEnvelopeStore {
    tables: Mutex<HashMap<TableRef, Vec<EnvelopeRow>>>,
    fail_existence_checks: AtomicBool,
}

impl MemoryEnvelopeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent existence check fail (or succeed again).
    pub fn fail_existence_checks(&self, fail: bool) {
        self.fail_existence_checks.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the rows stored in `table`, in insertion order
    pub fn rows(&self, table: &TableRef) -> Vec<EnvelopeRow> {
        self.tables().get(table).cloned().unwrap_or_default()
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<TableRef, Vec<EnvelopeRow>>> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EnvelopeStore for MemoryEnvelopeStore {
    async fn existing_ids(&self, table: &TableRef, ids: &[String]) -> Result<HashSet<String>> {
        if self.fail_existence_checks.load(Ordering::SeqCst) {
            return Err(IngestError::Database(sqlx::Error::Protocol(format!(
                "existence check against {table} unavailable"
            ))));
        }

        let tables = self.tables();
        let Some(rows) = tables.get(table) else {
            return Ok(HashSet::new());
        };

        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(rows
            .iter()
            .filter(|row| wanted.contains(row.id.as_str()))
            .map(|row| row.id.clone())
            .collect())
    }

    async fn append(&self, table: &TableRef, rows: &[EnvelopeRow]) -> Result<u64> {
        self.tables()
            .entry(table.clone())
            .or_default()
            .extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn insert_if_absent(&self, table: &TableRef, rows: &[EnvelopeRow]) -> Result<u64> {
        let mut tables = self.tables();
        let stored = tables.entry(table.clone()).or_default();
        let mut present: HashSet<String> = stored.iter().map(|row| row.id.clone()).collect();

        let mut inserted = 0;
        for row in rows {
            if present.insert(row.id.clone()) {
                stored.push(row.clone());
                inserted += 1;
            }
        }

        Ok(inserted)
    }
}
