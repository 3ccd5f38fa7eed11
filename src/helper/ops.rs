//! Typed helper operations: download, publish, delete, list, quota

use super::HelperClient;
use super::protocol::{read_string, read_u32, read_u64};
use crate::error::{Error, Result};
use crate::progress::EventSink;
use crate::types::{
    AppId, ListResult, PublishRequest, PublishResult, PublishedFileId, PublishedItem,
    QuotaResult, Visibility,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

const DOWNLOAD_PROGRESS_LABEL: &str = "Workshop Download (helper)";
const PUBLISH_PROGRESS_LABEL: &str = "Workshop Publish (helper)";

/// Where the helper placed a downloaded item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelperDownload {
    /// Owning scope reported by the helper
    pub app_id: AppId,
    /// Item id reported by the helper
    pub published_file_id: PublishedFileId,
    /// Folder holding the item's content
    pub install_folder: PathBuf,
}

fn os_args<const N: usize>(args: [&str; N]) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}

fn unix_time(seconds: Option<u64>) -> Option<DateTime<Utc>> {
    seconds
        .filter(|s| *s > 0)
        .and_then(|s| i64::try_from(s).ok())
        .and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Progress handler that maps `<op>_progress` events onto [`Event::Progress`](crate::Event::Progress)
fn progress_handler(
    events: &EventSink,
    event_type: &'static str,
    label: &'static str,
    completed_key: &'static str,
    default_message: &'static str,
) -> impl FnMut(&str, &Map<String, Value>) + Send + 'static {
    let mut reporter = events.progress(label, 0);
    move |kind, payload| {
        if kind != event_type {
            return;
        }
        let completed = read_u64(payload, completed_key).unwrap_or(0);
        let total = read_u64(payload, "bytesTotal").unwrap_or(0);
        let message = match read_string(payload, "status").filter(|s| !s.trim().is_empty()) {
            Some(status) => format!("{default_message} ({status})"),
            None => default_message.to_string(),
        };
        reporter.set(completed, total, Some(message));
    }
}

fn ignore_events(_: &str, _: &Map<String, Value>) {}

impl HelperClient {
    /// Download one item; the result names the folder the helper filled
    pub async fn download(
        &self,
        app_id: AppId,
        published_file_id: PublishedFileId,
        cancel: &CancellationToken,
    ) -> Result<HelperDownload> {
        let args = os_args([
            "download",
            "--appid",
            &app_id.to_string(),
            "--published-id",
            &published_file_id.to_string(),
        ]);

        self.invoke(
            args,
            "download_result",
            move |payload| {
                let install_folder = read_string(payload, "installFolder")
                    .filter(|f| !f.trim().is_empty())
                    .ok_or_else(|| {
                        Error::ProtocolViolation("helper returned an empty install folder".into())
                    })?;
                Ok(HelperDownload {
                    app_id: read_u32(payload, "appId").map(AppId).unwrap_or(app_id),
                    published_file_id: read_u64(payload, "publishedFileId")
                        .map(PublishedFileId)
                        .unwrap_or(published_file_id),
                    install_folder: PathBuf::from(install_folder),
                })
            },
            progress_handler(
                &self.events,
                "download_progress",
                DOWNLOAD_PROGRESS_LABEL,
                "bytesDownloaded",
                "Downloading via helper...",
            ),
            cancel,
        )
        .await
    }

    /// Create or update an item from `content_folder`
    pub async fn publish(
        &self,
        request: &PublishRequest,
        content_folder: &Path,
        cancel: &CancellationToken,
    ) -> Result<PublishResult> {
        let mut args: Vec<OsString> = os_args(["publish", "--appid", &request.app_id.to_string()]);
        args.push("--content".into());
        args.push(std::path::absolute(content_folder)?.into_os_string());
        args.push("--preview".into());
        args.push(std::path::absolute(&request.preview_file)?.into_os_string());
        args.extend(os_args([
            "--title",
            &request.title,
            "--description",
            &request.description,
            "--change-note",
            &request.change_note,
            "--visibility",
            request.visibility.cli_value(),
        ]));
        if !request.published_file_id.is_unset() {
            args.extend(os_args([
                "--published-id",
                &request.published_file_id.to_string(),
            ]));
        }
        if !request.tags.is_empty() {
            args.extend(os_args(["--tags", &request.tags.join(",")]));
        }

        let app_id = request.app_id;
        let requested_id = request.published_file_id;
        self.invoke(
            args,
            "publish_result",
            move |payload| {
                let published_file_id = read_u64(payload, "publishedFileId")
                    .map(PublishedFileId)
                    .unwrap_or(requested_id);
                if published_file_id.is_unset() {
                    return Err(Error::ProtocolViolation(
                        "helper returned published file id 0".into(),
                    ));
                }
                Ok(PublishResult {
                    app_id: read_u32(payload, "appId").map(AppId).unwrap_or(app_id),
                    published_file_id,
                    vdf_path: None,
                })
            },
            progress_handler(
                &self.events,
                "publish_progress",
                PUBLISH_PROGRESS_LABEL,
                "bytesProcessed",
                "Uploading via helper...",
            ),
            cancel,
        )
        .await
    }

    /// Delete a published item
    pub async fn delete(
        &self,
        app_id: AppId,
        published_file_id: PublishedFileId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let args = os_args([
            "delete",
            "--appid",
            &app_id.to_string(),
            "--published-id",
            &published_file_id.to_string(),
        ]);
        self.invoke(args, "delete_result", |_| Ok(()), ignore_events, cancel)
            .await
    }

    /// One page (1-based) of the caller's published items
    pub async fn list(
        &self,
        app_id: AppId,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<ListResult> {
        if page == 0 {
            return Err(Error::invalid("page must be >= 1"));
        }
        let args = os_args([
            "list",
            "--appid",
            &app_id.to_string(),
            "--page",
            &page.to_string(),
        ]);

        self.invoke(
            args,
            "list_result",
            move |payload| Ok(parse_list(payload, app_id, page)),
            ignore_events,
            cancel,
        )
        .await
    }

    /// Cloud storage quota for a scope
    pub async fn quota(&self, app_id: AppId, cancel: &CancellationToken) -> Result<QuotaResult> {
        let args = os_args(["quota", "--appid", &app_id.to_string()]);
        self.invoke(
            args,
            "quota_result",
            move |payload| {
                let total_bytes = read_u64(payload, "totalBytes").unwrap_or(0);
                let available_bytes = read_u64(payload, "availableBytes").unwrap_or(0);
                Ok(QuotaResult {
                    app_id: read_u32(payload, "appId").map(AppId).unwrap_or(app_id),
                    total_bytes,
                    available_bytes,
                    used_bytes: read_u64(payload, "usedBytes")
                        .unwrap_or(total_bytes.saturating_sub(available_bytes)),
                })
            },
            ignore_events,
            cancel,
        )
        .await
    }
}

fn parse_list(payload: &Map<String, Value>, app_id: AppId, page: u32) -> ListResult {
    let items = payload
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(parse_item)
                .collect()
        })
        .unwrap_or_default();

    ListResult {
        app_id: read_u32(payload, "appId").map(AppId).unwrap_or(app_id),
        page: read_u32(payload, "page").unwrap_or(page),
        returned: read_u32(payload, "returned").unwrap_or(0),
        total_matching: read_u32(payload, "totalMatching").unwrap_or(0),
        items,
    }
}

fn parse_item(item: &Map<String, Value>) -> Option<PublishedItem> {
    let published_file_id = read_u64(item, "publishedFileId").filter(|id| *id != 0)?;
    let tags = item
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(PublishedItem {
        published_file_id: PublishedFileId(published_file_id),
        title: read_string(item, "title"),
        description: read_string(item, "description"),
        created_at: unix_time(read_u64(item, "createdAt")),
        updated_at: unix_time(read_u64(item, "updatedAt")),
        visibility: read_string(item, "visibility")
            .as_deref()
            .and_then(Visibility::parse_loose),
        tags,
    })
}
