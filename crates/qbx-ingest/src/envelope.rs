//! Record envelope shaping
//!
//! Wraps each filtered remote record with the metadata of the run that
//! produced it.

use chrono::{DateTime, NaiveDate, Utc};
use qbx_common::types::{Environment, ExtractionWindow};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntitySpec;
use crate::error::Result;

/// Batch page number; envelopes are built from one materialized batch
pub const ENVELOPE_PAGE_NUMBER: i32 = 1;

/// Normalized unit persisted downstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Remote `Id`; `None` when the record had none
    pub id: Option<String>,
    /// Serialized remote record
    pub payload: String,
    pub ingested_at_utc: DateTime<Utc>,
    pub extract_window_start_utc: NaiveDate,
    pub extract_window_end_utc: NaiveDate,
    /// Always [`ENVELOPE_PAGE_NUMBER`]
    pub page_number: i32,
    /// Number of filtered records in the batch, not the remote page size
    pub page_size: i32,
    /// Serialized [`RequestPayload`]
    pub request_payload: String,
}

/// Extraction parameters recorded alongside every envelope
///
/// Field names match rows already stored in the landing tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    pub entity_type: String,
    #[serde(rename = "fecha_inicio")]
    pub window_start: String,
    #[serde(rename = "fecha_fin")]
    pub window_end: String,
    pub environment: String,
}

impl RequestPayload {
    pub fn new(spec: &EntitySpec, window: &ExtractionWindow, environment: Environment) -> Self {
        Self {
            entity_type: spec.label.clone(),
            window_start: window.start_key(),
            window_end: window.end_key(),
            environment: environment.as_str().to_string(),
        }
    }
}

/// Remote identifier as a string; numeric ids are stringified.
pub fn record_id(record: &Value) -> Option<String> {
    match record.get("Id") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    }
}

/// One envelope per record, all sharing `ingested_at` and the window.
pub fn build_envelopes(
    spec: &EntitySpec,
    window: &ExtractionWindow,
    environment: Environment,
    records: &[Value],
    ingested_at: DateTime<Utc>,
) -> Result<Vec<Envelope>> {
    let request_payload = serde_json::to_string(&RequestPayload::new(spec, window, environment))?;
    let page_size = i32::try_from(records.len()).unwrap_or(i32::MAX);

    records
        .iter()
        .map(|record| -> Result<Envelope> {
            Ok(Envelope {
                id: record_id(record),
                payload: serde_json::to_string(record)?,
                ingested_at_utc: ingested_at,
                extract_window_start_utc: window.start(),
                extract_window_end_utc: window.end(),
                page_number: ENVELOPE_PAGE_NUMBER,
                page_size,
                request_payload: request_payload.clone(),
            })
        })
        .collect()
}
