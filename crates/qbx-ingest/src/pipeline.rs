//! Per-entity ingestion pipeline
//!
//! Extracts one entity type for a window and loads the result into the
//! entity's landing table. `run_all` walks the built-in entities in order.

use qbx_common::types::ExtractionWindow;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::entity::{EntityKind, EntitySpec};
use crate::error::Result;
use crate::extractor::Extractor;
use crate::loader::{LoadOutcome, Loader};

/// Summary of one entity run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub entity: String,
    pub window: String,
    /// Records returned by the remote API before filtering
    pub fetched: usize,
    /// Records inside the window, handed to the loader
    pub matched: usize,
    pub pages: u32,
    /// Pagination stopped early and only part of the data was loaded
    pub partial: bool,
    pub extraction_error: Option<String>,
    pub load: LoadOutcome,
}

impl PipelineReport {
    /// Whether the run covered every page the remote API had
    pub fn is_complete(&self) -> bool {
        !self.partial
    }
}

/// Extractor and loader wired together
pub struct Pipeline {
    extractor: Extractor,
    loader: Loader,
}

impl Pipeline {
    pub fn new(extractor: Extractor, loader: Loader) -> Self {
        Self { extractor, loader }
    }

    /// Extract `spec` inside `window` and load it into `spec.destination`.
    #[instrument(skip(self, spec, window), fields(entity = %spec.label))]
    pub async fn run(&self, spec: &EntitySpec, window: &ExtractionWindow) -> Result<PipelineReport> {
        info!(window = %window, destination = %spec.destination, "Starting pipeline");

        let outcome = self.extractor.extract(spec, window).await?;
        let matched = outcome.envelopes.len();

        if outcome.partial {
            warn!(
                error = outcome.error.as_deref().unwrap_or("unknown"),
                matched,
                "Loading partial extraction"
            );
        }

        let load = self
            .loader
            .load(&spec.destination, outcome.envelopes, window)
            .await?;

        Ok(PipelineReport {
            entity: spec.label.clone(),
            window: window.to_string(),
            fetched: outcome.fetched,
            matched,
            pages: outcome.pages,
            partial: outcome.partial,
            extraction_error: outcome.error,
            load,
        })
    }

    /// Run every built-in entity sequentially.
    ///
    /// A failure stops only that entity; the remaining ones still run.
    pub async fn run_all(
        &self,
        window: &ExtractionWindow,
    ) -> Vec<(EntityKind, Result<PipelineReport>)> {
        let mut results = Vec::with_capacity(EntityKind::ALL.len());

        for kind in EntityKind::ALL {
            let result = self.run(&kind.spec(), window).await;

            if let Err(e) = &result {
                error!(entity = %kind, error = %e, "Pipeline failed");
            }

            results.push((kind, result));
        }

        results
    }
}
