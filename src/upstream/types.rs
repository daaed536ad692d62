//! Upstream response shapes.
//!
//! The provider returns either `{"results": [...]}` or a bare array. Each
//! record carries an `id` and either a `urls` object keyed by size variant or a
//! flat `url`. Only the fields the relay needs survive parsing.
//!
//! Records are decoded one by one. A record without a usable URL is skipped;
//! the response is malformed only if the envelope is wrong or every record is.

use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

use crate::error::{RelayError, RelayResult};

/// One search hit: where to fetch the image, and its provider ID for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchEnvelope {
    Wrapped { results: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    urls: Option<HashMap<String, String>>,
    #[serde(default)]
    url: Option<String>,
}

impl RawRecord {
    fn into_record(self, variant: &str) -> RelayResult<ImageRecord> {
        let id = match self.id {
            Some(serde_json::Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        };

        let url = self
            .urls
            .and_then(|mut urls| urls.remove(variant))
            .or(self.url)
            .ok_or_else(|| {
                RelayError::UpstreamMalformed(format!("record '{}' has no '{}' url", id, variant))
            })?;

        Url::parse(&url).map_err(|e| {
            RelayError::UpstreamMalformed(format!("record '{}' has invalid url: {}", id, e))
        })?;

        Ok(ImageRecord { id, url })
    }
}

/// Decode a search response body, keeping upstream order.
pub fn parse_search_response(body: &[u8], variant: &str) -> RelayResult<Vec<ImageRecord>> {
    let envelope: SearchEnvelope = serde_json::from_slice(body)
        .map_err(|e| RelayError::UpstreamMalformed(format!("unexpected search response: {}", e)))?;

    let records = match envelope {
        SearchEnvelope::Wrapped { results } => results,
        SearchEnvelope::Bare(records) => records,
    };

    let total = records.len();
    let mut usable = Vec::with_capacity(total);
    let mut last_error = None;
    for (position, value) in records.into_iter().enumerate() {
        let record = serde_json::from_value::<RawRecord>(value)
            .map_err(|e| RelayError::UpstreamMalformed(format!("record {}: {}", position, e)))
            .and_then(|raw| raw.into_record(variant));
        match record {
            Ok(record) => usable.push(record),
            Err(e) => {
                tracing::debug!(position, error = %e, "Skipping unusable search record");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if usable.is_empty() => Err(e),
        _ => Ok(usable),
    }
}
