//! Paginated extraction from the remote accounting API
//!
//! The extractor authenticates, walks `startPosition` forward one page at a
//! time until a short or empty page, filters the collected records by the
//! extraction window, and wraps the survivors in envelopes.
//!
//! Requests are strictly sequential. The only waits are the pause between
//! full pages and the rate-limit backoff.

use async_trait::async_trait;
use chrono::Utc;
use qbx_common::types::{Environment, ExtractionWindow};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::auth::TokenProvider;
use crate::config::{ApiConfig, ExtractorConfig};
use crate::entity::EntitySpec;
use crate::envelope::{build_envelopes, Envelope};
use crate::error::{IngestError, Result};
use crate::filter::filter_by_window;

/// First `startPosition` accepted by the query endpoint
pub const FIRST_START_POSITION: u32 = 1;

/// What to do when pagination fails partway through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log, stop paging, and continue with the records already collected
    #[default]
    ReturnPartial,
    /// Fail the whole extraction
    Propagate,
}

impl std::str::FromStr for FailurePolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "partial" | "return_partial" | "return-partial" => Ok(FailurePolicy::ReturnPartial),
            "propagate" | "fail" => Ok(FailurePolicy::Propagate),
            other => Err(IngestError::config(format!(
                "Invalid failure policy '{other}': expected 'partial' or 'propagate'"
            ))),
        }
    }
}

/// Outcome of a single page request
#[derive(Debug, Clone, PartialEq)]
pub enum PageResponse {
    Records(Vec<Value>),
    RateLimited,
}

/// Source of query pages for the extractor
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Request one page of `spec`'s query.
    async fn query_page(
        &self,
        token: &str,
        spec: &EntitySpec,
        start_position: u32,
        max_results: u32,
    ) -> Result<PageResponse>;
}

/// Thin client for the remote `query` endpoint
pub struct QuickBooksClient {
    http: Client,
    base_url: String,
}

impl QuickBooksClient {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let http = Client::builder().timeout(api.request_timeout).build()?;

        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PageSource for QuickBooksClient {
    async fn query_page(
        &self,
        token: &str,
        spec: &EntitySpec,
        start_position: u32,
        max_results: u32,
    ) -> Result<PageResponse> {
        let url = format!("{}/query", self.base_url);
        let start_position = start_position.to_string();
        let max_results = max_results.to_string();

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .query(&[
                ("query", spec.query.as_str()),
                ("startPosition", start_position.as_str()),
                ("maxResults", max_results.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Ok(PageResponse::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IngestError::decode(format!("response is not JSON: {e}")))?;

        page_records(body, &spec.remote_name).map(PageResponse::Records)
    }
}

/// Pull `QueryResponse.<entity>` out of a response body.
///
/// A missing key means an empty page.
fn page_records(mut body: Value, remote_name: &str) -> Result<Vec<Value>> {
    match body
        .get_mut("QueryResponse")
        .and_then(|response| response.get_mut(remote_name))
        .map(Value::take)
    {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(records)) => Ok(records),
        Some(other) => Err(IngestError::decode(format!(
            "QueryResponse.{remote_name} is not an array: {other}"
        ))),
    }
}

/// Records collected by walking every page
#[derive(Debug, Default)]
pub struct PageWalk {
    pub records: Vec<Value>,
    /// Successful page responses, including the terminating one
    pub pages: u32,
    /// Failure that cut pagination short under [`FailurePolicy::ReturnPartial`]
    pub failure: Option<IngestError>,
}

/// Result of extracting one entity
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub envelopes: Vec<Envelope>,
    /// Records returned by the remote API before filtering
    pub fetched: usize,
    pub pages: u32,
    /// Pagination stopped early; `envelopes` covers only the pages seen
    pub partial: bool,
    pub error: Option<String>,
}

/// Paginated extractor for any [`EntitySpec`]
pub struct Extractor {
    source: Box<dyn PageSource>,
    tokens: Arc<dyn TokenProvider>,
    environment: Environment,
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(
        api: &ApiConfig,
        tokens: Arc<dyn TokenProvider>,
        config: ExtractorConfig,
    ) -> Result<Self> {
        let source = Box::new(QuickBooksClient::new(api)?);
        Self::with_source(source, tokens, api.environment, config)
    }

    /// Extractor reading pages from an arbitrary [`PageSource`]
    pub fn with_source(
        source: Box<dyn PageSource>,
        tokens: Arc<dyn TokenProvider>,
        environment: Environment,
        config: ExtractorConfig,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            source,
            tokens,
            environment,
            config,
        })
    }

    /// Extract, filter and envelope every record of `spec` inside `window`.
    ///
    /// Authentication failures always propagate; pagination failures follow
    /// the configured [`FailurePolicy`].
    #[instrument(skip(self, spec, window), fields(entity = %spec.label, window = %window))]
    pub async fn extract(
        &self,
        spec: &EntitySpec,
        window: &ExtractionWindow,
    ) -> Result<ExtractionOutcome> {
        let token = self.tokens.access_token().await?;

        let walk = self.fetch_all(&token, spec).await?;
        let fetched = walk.records.len();

        let filtered = filter_by_window(walk.records, window, &spec.date_fields);
        info!(
            fetched,
            matched = filtered.len(),
            pages = walk.pages,
            "Filtered records by extraction window"
        );

        let envelopes = build_envelopes(spec, window, self.environment, &filtered, Utc::now())?;

        Ok(ExtractionOutcome {
            envelopes,
            fetched,
            pages: walk.pages,
            partial: walk.failure.is_some(),
            error: walk.failure.map(|e| e.to_string()),
        })
    }

    /// Walk pages until a short or empty one.
    pub async fn fetch_all(&self, token: &str, spec: &EntitySpec) -> Result<PageWalk> {
        let page_size = self.config.page_size;
        let page_size_len = usize::try_from(page_size).unwrap_or(usize::MAX);
        let mut walk = PageWalk::default();
        let mut start_position = FIRST_START_POSITION;

        loop {
            let page = match self.fetch_page(token, spec, start_position).await {
                Ok(page) => page,
                Err(e) if e.is_pagination_failure() => match self.config.failure_policy {
                    FailurePolicy::Propagate => return Err(e),
                    FailurePolicy::ReturnPartial => {
                        warn!(
                            error = %e,
                            start_position,
                            collected = walk.records.len(),
                            "Pagination failed; continuing with records collected so far"
                        );
                        walk.failure = Some(e);
                        break;
                    },
                },
                Err(e) => return Err(e),
            };

            walk.pages += 1;
            let returned = page.len();
            debug!(start_position, returned, "Fetched page");

            if returned == 0 {
                break;
            }

            walk.records.extend(page);

            if returned < page_size_len {
                break;
            }

            start_position = start_position.saturating_add(page_size);
            pause(self.config.page_delay).await;
        }

        Ok(walk)
    }

    /// One page, retrying on HTTP 429 per the rate-limit policy.
    async fn fetch_page(
        &self,
        token: &str,
        spec: &EntitySpec,
        start_position: u32,
    ) -> Result<Vec<Value>> {
        let policy = &self.config.rate_limit;
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            match self
                .source
                .query_page(token, spec, start_position, self.config.page_size)
                .await?
            {
                PageResponse::Records(records) => return Ok(records),
                PageResponse::RateLimited => {
                    if !policy.allows_retry(attempts) {
                        return Err(IngestError::RateLimitExhausted { attempts });
                    }

                    let delay = policy.delay_for(attempts);
                    warn!(
                        start_position,
                        attempt = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Rate limited; retrying page"
                    );
                    pause(delay).await;
                },
            }
        }
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
