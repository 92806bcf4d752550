//! Envelope loading with identifier dedup
//!
//! The default strategy is check-then-append: ask the store which ids it
//! already holds, append the rest. The two steps are not atomic, so two
//! concurrent runs over the same window can both append the same id; the
//! scheduler must serialize runs per entity. [`LoadStrategy::InsertIfAbsent`]
//! moves the check into the store as a single conditional insert.

use chrono::{DateTime, Utc};
use qbx_common::types::ExtractionWindow;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::envelope::Envelope;
use crate::error::{IngestError, Result};
use crate::store::{EnvelopeStore, TableRef};

/// How new rows are reconciled against stored ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// Existence query, then append of unseen ids; blind append if the query fails
    #[default]
    CheckThenAppend,
    /// Conditional insert guarded by a unique index on `id`
    InsertIfAbsent,
}

impl std::str::FromStr for LoadStrategy {
    type Err = IngestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "check_then_append" => Ok(LoadStrategy::CheckThenAppend),
            "insert_if_absent" => Ok(LoadStrategy::InsertIfAbsent),
            other => Err(IngestError::config(format!(
                "Invalid load strategy '{other}': expected 'check_then_append' or 'insert_if_absent'"
            ))),
        }
    }
}

/// Row as written to the destination table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnvelopeRow {
    pub id: String,
    pub payload: String,
    pub ingested_at_utc: DateTime<Utc>,
    pub extract_window_start_utc: DateTime<Utc>,
    pub extract_window_end_utc: DateTime<Utc>,
    pub page_number: i32,
    pub page_size: i32,
    pub request_payload: String,
}

/// Rows ready to write plus what was dropped getting there
#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub rows: Vec<EnvelopeRow>,
    pub dropped_null_ids: usize,
    pub dropped_duplicates: usize,
}

/// Drop id-less envelopes and in-batch duplicates (first occurrence wins),
/// stamping each row with `loaded_at` and the window bounds.
pub fn prepare_batch(
    envelopes: Vec<Envelope>,
    window: &ExtractionWindow,
    loaded_at: DateTime<Utc>,
) -> PreparedBatch {
    let mut batch = PreparedBatch::default();
    let mut seen = HashSet::new();

    for envelope in envelopes {
        let Some(id) = envelope.id else {
            batch.dropped_null_ids += 1;
            continue;
        };

        if !seen.insert(id.clone()) {
            batch.dropped_duplicates += 1;
            continue;
        }

        batch.rows.push(EnvelopeRow {
            id,
            payload: envelope.payload,
            ingested_at_utc: loaded_at,
            extract_window_start_utc: window.start_utc(),
            extract_window_end_utc: window.end_utc(),
            page_number: envelope.page_number,
            page_size: envelope.page_size,
            request_payload: envelope.request_payload,
        });
    }

    batch
}

/// Structured result of one load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub inserted: u64,
    pub skipped_existing: u64,
    pub dropped_null_ids: usize,
    pub dropped_duplicates: usize,
    /// The existence check failed and the whole batch was appended
    pub fallback_used: bool,
}

/// Reconciles envelope batches against an [`EnvelopeStore`]
pub struct Loader {
    store: Arc<dyn EnvelopeStore>,
    strategy: LoadStrategy,
}

impl Loader {
    pub fn new(store: Arc<dyn EnvelopeStore>, strategy: LoadStrategy) -> Self {
        Self { store, strategy }
    }

    /// Persist `envelopes` into `table` without duplicating stored ids.
    #[instrument(skip(self, table, envelopes, window), fields(table = %table, batch = envelopes.len()))]
    pub async fn load(
        &self,
        table: &TableRef,
        envelopes: Vec<Envelope>,
        window: &ExtractionWindow,
    ) -> Result<LoadOutcome> {
        if envelopes.is_empty() {
            info!("No records to process");
            return Ok(LoadOutcome::default());
        }

        let batch = prepare_batch(envelopes, window, Utc::now());
        let mut outcome = LoadOutcome {
            dropped_null_ids: batch.dropped_null_ids,
            dropped_duplicates: batch.dropped_duplicates,
            ..LoadOutcome::default()
        };

        if batch.rows.is_empty() {
            warn!(
                dropped_null_ids = outcome.dropped_null_ids,
                "Batch had no identifiable records"
            );
            return Ok(outcome);
        }

        let total = batch.rows.len() as u64;

        match self.strategy {
            LoadStrategy::CheckThenAppend => {
                self.check_then_append(table, batch.rows, &mut outcome).await?
            },
            LoadStrategy::InsertIfAbsent => {
                outcome.inserted = self.store.insert_if_absent(table, &batch.rows).await?;
                outcome.skipped_existing = total.saturating_sub(outcome.inserted);
            },
        }

        info!(
            inserted = outcome.inserted,
            skipped_existing = outcome.skipped_existing,
            dropped_null_ids = outcome.dropped_null_ids,
            dropped_duplicates = outcome.dropped_duplicates,
            fallback_used = outcome.fallback_used,
            "Load finished"
        );

        Ok(outcome)
    }

    async fn check_then_append(
        &self,
        table: &TableRef,
        rows: Vec<EnvelopeRow>,
        outcome: &mut LoadOutcome,
    ) -> Result<()> {
        let ids: Vec<String> = rows.iter().map(|row| row.id.clone()).collect();

        let existing = match self.store.existing_ids(table, &ids).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(error = %e, rows = rows.len(), "Existence check failed; appending full batch");
                outcome.inserted = self.store.append(table, &rows).await?;
                outcome.fallback_used = true;
                return Ok(());
            },
        };

        let total = rows.len() as u64;
        let new_rows: Vec<EnvelopeRow> = rows
            .into_iter()
            .filter(|row| !existing.contains(&row.id))
            .collect();
        outcome.skipped_existing = total - new_rows.len() as u64;

        if new_rows.is_empty() {
            info!("All records already exist");
            return Ok(());
        }

        outcome.inserted = self.store.append(table, &new_rows).await?;
        Ok(())
    }
}
