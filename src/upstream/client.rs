//! HTTP client for the image-search provider.
//!
//! # Responsibilities
//! - Search for images by term (one GET, bounded body)
//! - Open an image download and hand back a capped chunk stream
//! - Take a rate-limit token before every HTTP attempt
//! - Classify failures and retry the transient ones
//!
//! # Failure classes
//! - connect error, timeout, 5xx → `UpstreamUnavailable` (retried)
//! - 4xx → `UpstreamRejected`
//! - anything we cannot interpret → `UpstreamMalformed`

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use url::Url;

use crate::config::{RelayConfig, RetryConfig};
use crate::config::validation::MAX_SEARCH_LIMIT;
use crate::error::{RelayError, RelayResult};
use crate::observability::metrics;
use crate::resilience::retries::retry_with_backoff;
use crate::resilience::timeouts::deadline;
use crate::security::{ByteBudget, RateLimiter};
use crate::upstream::types::{parse_search_response, ImageRecord};

/// Search responses larger than this are treated as malformed.
const MAX_SEARCH_BODY_BYTES: u64 = 2 * 1024 * 1024;

/// Client for the upstream provider. Cheap to share behind an `Arc`.
pub struct UpstreamClient {
    http: reqwest::Client,
    search_url: Url,
    authorization: HeaderValue,
    image_variant: String,
    max_image_bytes: u64,
    request_timeout: Duration,
    chunk_timeout: Duration,
    retry: RetryConfig,
    limiter: Arc<RateLimiter>,
}

impl UpstreamClient {
    /// Build a client from validated configuration.
    pub fn new(config: &RelayConfig, limiter: Arc<RateLimiter>) -> RelayResult<Self> {
        let upstream = &config.upstream;

        let base = Url::parse(&upstream.base_url)
            .map_err(|e| RelayError::Internal(format!("invalid upstream base_url: {}", e)))?;
        let search_url = base
            .join(&upstream.search_path)
            .map_err(|e| RelayError::Internal(format!("invalid upstream search_path: {}", e)))?;

        let mut authorization =
            HeaderValue::from_str(&format!("{} {}", upstream.auth_scheme, upstream.access_key))
                .map_err(|e| RelayError::Internal(format!("invalid upstream credential: {}", e)))?;
        authorization.set_sensitive(true);

        let http = reqwest::Client::builder()
            .connect_timeout(config.timeouts.upstream_connect())
            .user_agent(upstream.user_agent.clone())
            .build()
            .map_err(|e| RelayError::Internal(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(search_url = %search_url, variant = %upstream.image_variant, "Upstream client ready");

        Ok(Self {
            http,
            search_url,
            authorization,
            image_variant: upstream.image_variant.clone(),
            max_image_bytes: upstream.max_image_bytes,
            request_timeout: config.timeouts.upstream_request(),
            chunk_timeout: config.timeouts.upstream_chunk(),
            retry: config.retries.clone(),
            limiter,
        })
    }

    /// Search for `term`, returning at most `limit` records in upstream order.
    pub async fn search(&self, term: &str, limit: u32) -> RelayResult<Vec<ImageRecord>> {
        let term = term.trim();
        if term.is_empty() {
            return Err(RelayError::BadRequest("search term is empty".into()));
        }
        if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
            return Err(RelayError::BadRequest(format!(
                "limit {} outside 1..={}",
                limit, MAX_SEARCH_LIMIT
            )));
        }

        let mut records =
            retry_with_backoff(&self.retry, "search", |attempt| self.search_once(term, limit, attempt))
                .await?;
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn search_once(&self, term: &str, limit: u32, attempt: u32) -> RelayResult<Vec<ImageRecord>> {
        self.limiter.acquire().await?;
        tracing::debug!(term, limit, attempt, tokens_left = self.limiter.available(), "Searching upstream");

        let per_page = limit.to_string();
        let request = self
            .http
            .get(self.search_url.clone())
            .query(&[("query", term), ("per_page", per_page.as_str())])
            .header(AUTHORIZATION, self.authorization.clone())
            .header(ACCEPT, "application/json")
            .header("Accept-Version", "v1")
            .timeout(self.request_timeout)
            .send();

        let result = async {
            let response = request.await.map_err(classify_transport)?;
            check_status(response.status())?;
            let body = read_bounded(response, MAX_SEARCH_BODY_BYTES).await?;
            parse_search_response(&body, &self.image_variant)
        }
        .await;

        metrics::record_upstream_call("search", result_label(&result));
        result
    }

    /// Start downloading `url`. Retries stop once response headers arrive.
    pub async fn fetch_image(&self, url: &str) -> RelayResult<ImageStream> {
        let url = Url::parse(url)
            .map_err(|e| RelayError::UpstreamMalformed(format!("invalid image url: {}", e)))?;

        let response =
            retry_with_backoff(&self.retry, "fetch", |attempt| self.fetch_once(&url, attempt)).await?;

        let budget = ByteBudget::new(self.max_image_bytes);
        if let Some(declared) = response.content_length() {
            if !budget.admits(declared) {
                tracing::warn!(url = %url, declared, limit = self.max_image_bytes, "Image too large");
                return Err(RelayError::PayloadTooLarge {
                    limit: self.max_image_bytes,
                });
            }
        }

        Ok(ImageStream {
            response,
            budget,
            chunk_timeout: self.chunk_timeout,
        })
    }

    async fn fetch_once(&self, url: &Url, attempt: u32) -> RelayResult<Response> {
        self.limiter.acquire().await?;
        tracing::debug!(url = %url, attempt, "Fetching image");

        let request = self.http.get(url.clone()).send();
        let result = deadline(
            self.request_timeout,
            async {
                let response = request.await.map_err(classify_transport)?;
                check_status(response.status())?;
                Ok(response)
            },
            || RelayError::UpstreamUnavailable("timed out waiting for image response".into()),
        )
        .await;

        metrics::record_upstream_call("fetch", result_label(&result));
        result
    }
}

/// An image body being downloaded, enforcing the byte cap chunk by chunk.
///
/// Dropping the stream releases the upstream connection.
pub struct ImageStream {
    response: Response,
    budget: ByteBudget,
    chunk_timeout: Duration,
}

impl ImageStream {
    /// Next piece of the body, or `None` at the end.
    pub async fn next_chunk(&mut self) -> RelayResult<Option<Bytes>> {
        let response = &mut self.response;
        let chunk = deadline(
            self.chunk_timeout,
            async { response.chunk().await.map_err(classify_transport) },
            || RelayError::UpstreamUnavailable("image body stalled".into()),
        )
        .await?;

        if let Some(bytes) = &chunk {
            if !self.budget.consume(bytes.len()) {
                return Err(RelayError::PayloadTooLarge {
                    limit: self.budget.limit(),
                });
            }
        }
        Ok(chunk)
    }

    /// Length announced by the upstream, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    pub fn bytes_read(&self) -> u64 {
        self.budget.used()
    }
}

/// Read a whole (small) body, refusing anything past `limit`.
async fn read_bounded(mut response: Response, limit: u64) -> RelayResult<Vec<u8>> {
    let mut budget = ByteBudget::new(limit);
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(classify_transport)? {
        if !budget.consume(chunk.len()) {
            return Err(RelayError::UpstreamMalformed(format!(
                "search response exceeds {} bytes",
                limit
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn check_status(status: StatusCode) -> RelayResult<()> {
    if status.is_success() {
        Ok(())
    } else if status.is_client_error() {
        Err(RelayError::UpstreamRejected {
            status: status.as_u16(),
        })
    } else if status.is_server_error() {
        Err(RelayError::UpstreamUnavailable(format!("status {}", status)))
    } else {
        Err(RelayError::UpstreamMalformed(format!("unexpected status {}", status)))
    }
}

fn classify_transport(err: reqwest::Error) -> RelayError {
    if err.is_decode() {
        RelayError::UpstreamMalformed(err.to_string())
    } else if err.is_builder() {
        RelayError::Internal(err.to_string())
    } else {
        RelayError::UpstreamUnavailable(err.to_string())
    }
}

fn result_label<T>(result: &RelayResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    }
}
