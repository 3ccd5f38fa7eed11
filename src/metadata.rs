//! Published file details lookup
//!
//! Details are best-effort: every failure (network, status, shape) yields
//! `None` and is logged at debug level, so a missing lookup never blocks a
//! download that the local cache can satisfy.

use crate::types::{AppId, ItemDetails, PublishedFileId};
use chrono::DateTime;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Client for the `GetPublishedFileDetails` endpoint
#[derive(Clone, Debug)]
pub struct DetailsClient {
    http: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl DetailsClient {
    /// Create a client posting to `endpoint` over a shared HTTP client
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            timeout,
        }
    }

    /// Fetch details for one item, or `None` if they cannot be obtained
    pub async fn fetch(
        &self,
        published_file_id: PublishedFileId,
        cancel: &CancellationToken,
    ) -> Option<ItemDetails> {
        tokio::select! {
            details = self.try_fetch(published_file_id) => match details {
                Ok(details) => details,
                Err(e) => {
                    tracing::debug!(%published_file_id, error = %e, "details lookup failed");
                    None
                }
            },
            _ = cancel.cancelled() => None,
        }
    }

    async fn try_fetch(
        &self,
        published_file_id: PublishedFileId,
    ) -> Result<Option<ItemDetails>, reqwest::Error> {
        let id = published_file_id.to_string();
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .form(&[("itemcount", "1"), ("publishedfileids[0]", id.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!(%published_file_id, status = %response.status(), "details lookup rejected");
            return Ok(None);
        }

        let body: Value = response.json().await?;
        Ok(parse_details(&body, published_file_id))
    }
}

/// Extract the first item from a `GetPublishedFileDetails` response body
pub fn parse_details(body: &Value, published_file_id: PublishedFileId) -> Option<ItemDetails> {
    let details = body
        .get("response")?
        .get("publishedfiledetails")?
        .as_array()?
        .first()?
        .as_object()?;

    Some(ItemDetails {
        published_file_id,
        title: details
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string),
        updated_at: positive_u64(details, "time_updated")
            .and_then(|s| i64::try_from(s).ok())
            .and_then(|s| DateTime::from_timestamp(s, 0)),
        consumer_app_id: positive_u64(details, "consumer_app_id")
            .and_then(|v| u32::try_from(v).ok())
            .map(AppId),
        file_url: non_blank_str(details, "file_url"),
        file_name: non_blank_str(details, "filename"),
        file_size: positive_u64(details, "file_size"),
    })
}

/// A number or numeric string; zero counts as absent
fn positive_u64(details: &Map<String, Value>, key: &str) -> Option<u64> {
    let value = match details.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (value > 0).then_some(value)
}

fn non_blank_str(details: &Map<String, Value>, key: &str) -> Option<String> {
    details
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}
