//! Direct HTTP download of legacy single-file items

use crate::error::{Error, Result};
use crate::progress::EventSink;
use crate::utils::remove_path_best_effort;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// File name for a direct download: the item's original name, else the URL's last segment
pub fn web_file_name(file_name: Option<&str>, url: &str) -> Option<String> {
    let from_details = file_name
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .filter(|name| !name.trim().is_empty());
    if let Some(name) = from_details {
        return Some(name.to_string());
    }

    let parsed = url::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
}

/// Stream `url` into `destination`, which must not exist yet
///
/// Progress is reported against `size_hint`, or the response's content length
/// when no hint is known. A failed or cancelled transfer leaves no partial
/// file behind. Returns the number of bytes written.
pub async fn download_to_file(
    http: &reqwest::Client,
    url: &str,
    destination: &Path,
    size_hint: Option<u64>,
    timeout: Duration,
    events: &EventSink,
    cancel: &CancellationToken,
) -> Result<u64> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let response = tokio::select! {
        response = http.get(url).timeout(timeout).send() => response?.error_for_status()?,
        _ = cancel.cancelled() => return Err(Error::Cancelled),
    };

    let total = size_hint
        .filter(|size| *size > 0)
        .or_else(|| response.content_length().filter(|len| *len > 0))
        .unwrap_or(0);
    tracing::debug!(url, total, destination = ?destination, "direct download started");

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await?;

    let result = stream_body(response, file, total, destination, events, cancel).await;
    if result.is_err() {
        remove_path_best_effort(destination).await;
    }
    result
}

async fn stream_body(
    mut response: reqwest::Response,
    mut file: tokio::fs::File,
    total: u64,
    destination: &Path,
    events: &EventSink,
    cancel: &CancellationToken,
) -> Result<u64> {
    let mut reporter = events.progress(super::DOWNLOAD_OPERATION, total);
    if let Some(name) = destination.file_name() {
        reporter.set_current_item(name.to_string_lossy());
    }
    reporter.set(0, total, Some("Downloading via web...".into()));

    loop {
        let chunk = tokio::select! {
            chunk = response.chunk() => chunk?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };
        let Some(chunk) = chunk else {
            break;
        };
        file.write_all(&chunk).await?;
        reporter.advance(chunk.len() as u64);
    }

    file.flush().await?;
    reporter.finish("Download complete.");
    Ok(reporter.completed_bytes())
}
