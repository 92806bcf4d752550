//! Common types used across QBX

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QbxError, Result};

/// Default inclusive window start when the caller supplies none.
pub const DEFAULT_WINDOW_START: &str = "2025-01-01";

/// Default inclusive window end when the caller supplies none.
pub const DEFAULT_WINDOW_END: &str = "2025-09-16";

const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Extraction Window
// ============================================================================

/// Inclusive date range used to filter remote records before load.
///
/// Comparison is done on fixed-width `YYYY-MM-DD` strings, which orders
/// correctly only because the format is zero-padded ISO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl ExtractionWindow {
    /// Build a window from two dates, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(QbxError::InvalidWindow {
                start: start.format(DATE_FORMAT).to_string(),
                end: end.format(DATE_FORMAT).to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse a window from two ISO date strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    /// Parse a window where either bound may be absent, falling back to the defaults.
    pub fn parse_or_default(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        Self::parse(
            start.unwrap_or(DEFAULT_WINDOW_START),
            end.unwrap_or(DEFAULT_WINDOW_END),
        )
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// `YYYY-MM-DD` rendering of the start bound.
    pub fn start_key(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    /// `YYYY-MM-DD` rendering of the end bound.
    pub fn end_key(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }

    /// Start bound as midnight UTC.
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// End bound as midnight UTC.
    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Inclusive lexicographic check of a `YYYY-MM-DD` string.
    pub fn contains(&self, date: &str) -> bool {
        self.start_key().as_str() <= date && date <= self.end_key().as_str()
    }
}

impl Default for ExtractionWindow {
    fn default() -> Self {
        Self::parse(DEFAULT_WINDOW_START, DEFAULT_WINDOW_END)
            .unwrap_or_else(|_| unreachable!("default window bounds are valid dates"))
    }
}

impl std::fmt::Display for ExtractionWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start_key(), self.end_key())
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| QbxError::InvalidDate {
        value: value.to_string(),
    })
}

// ============================================================================
// Remote Environment
// ============================================================================

/// Which remote deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sandbox,
    #[default]
    Production,
}

impl Environment {
    /// `sandbox` (any case) selects the sandbox; every other value is production.
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("sandbox") {
            Environment::Sandbox
        } else {
            Environment::Production
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }

    /// API host for this environment.
    pub fn api_host(&self) -> &'static str {
        match self {
            Environment::Sandbox => "https://sandbox-quickbooks.api.intuit.com",
            Environment::Production => "https://quickbooks.api.intuit.com",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
