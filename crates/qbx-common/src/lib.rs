//! QBX Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the QBX workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`QbxError`] and the [`Result`] alias
//! - **Logging**: centralized `tracing` subscriber setup
//! - **Types**: the extraction window and remote environment selector
//!
//! # Example
//!
//! ```no_run
//! use qbx_common::types::ExtractionWindow;
//!
//! fn main() -> qbx_common::Result<()> {
//!     let window = ExtractionWindow::parse("2025-01-01", "2025-09-16")?;
//!     assert!(window.contains("2025-03-15"));
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{QbxError, Result};
