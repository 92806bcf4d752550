//! QBX Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental extraction of accounting records (customers, invoices, items)
//! from the QuickBooks Online REST API into raw warehouse landing tables.
//!
//! # Overview
//!
//! - **Extractor**: authenticates, pages through `SELECT * FROM <Entity>`,
//!   filters by the extraction window and wraps records in envelopes
//! - **Loader**: drops unidentifiable and duplicate records, then appends
//!   only ids not already present in the destination table
//! - **Stores**: PostgreSQL via SQLx, plus an in-memory store for dry runs
//! - **Pipeline**: one parameterized flow shared by every entity type
//!
//! # Example
//!
//! ```no_run
//! use qbx_ingest::{
//!     auth::OAuthTokenClient, config::IngestConfig, entity::EntityKind, extractor::Extractor,
//!     loader::Loader, pipeline::Pipeline, store::PgEnvelopeStore,
//! };
//! use qbx_common::types::ExtractionWindow;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let tokens = Arc::new(OAuthTokenClient::new(&config.api, config.credentials.clone())?);
//!     let extractor = Extractor::new(&config.api, tokens, config.extractor.clone())?;
//!     let store = Arc::new(PgEnvelopeStore::connect(&config.database).await?);
//!     let pipeline = Pipeline::new(extractor, Loader::new(store, config.load_strategy));
//!
//!     let report = pipeline
//!         .run(&EntityKind::Invoice.spec(), &ExtractionWindow::default())
//!         .await?;
//!     println!("inserted {}", report.load.inserted);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod config;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod loader;
pub mod pipeline;
pub mod retry;
pub mod store;

// Re-export commonly used types
pub use entity::{EntityKind, EntitySpec};
pub use error::{IngestError, Result};
pub use pipeline::{Pipeline, PipelineReport};
