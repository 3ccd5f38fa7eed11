//! Acquisition orchestrator
//!
//! A download tries its strategies in a fixed order and stops at the first
//! one that yields content:
//! 1. the local cache under the requested scope, then under the scope the
//!    item's metadata names, then under any scope
//! 2. a direct HTTP download when the metadata carries a file URL
//! 3. the helper, when enabled and a scope is known
//! 4. SteamCMD, when enabled and found
//!
//! Content from the cache or a backend then goes through payload selection,
//! output naming, the collision check, a copy to the output directory and
//! (for single files) post-processing.

pub mod convert;
pub mod payload;
pub mod web;

pub use convert::convert_downloaded_file;
pub use payload::{Payload, classify_payload};
pub use web::{download_to_file, web_file_name};

use crate::Workshop;
use crate::cache::{CacheHit, CacheLocator, find_in_root};
use crate::error::{Error, Result};
use crate::ids::parse_published_file_id;
use crate::naming::build_output_base_name;
use crate::session::PromptLimits;
use crate::steamcmd::{SteamCmd, locate_steamcmd};
use crate::types::{
    AppId, DownloadRequest, ItemDetails, OutputKind, PublishedFileId, TransferResult,
};
use crate::utils::{
    copy_dir_with_progress, copy_file_with_progress, directory_size, ensure_output_absent,
    remove_path_best_effort,
};
use payload::dotted_extension;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Progress label for downloads
pub(crate) const DOWNLOAD_OPERATION: &str = "Workshop Download";

/// Where the content of a download was found
enum Source {
    /// A local directory (cache hit or backend install folder)
    Local(CacheHit),
    /// Already written to the output directory by the web strategy
    Transferred(TransferResult),
}

impl Workshop {
    /// Acquire one workshop item into `request.output_dir`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No id can be parsed from `request.id_or_link` ([`Error::InvalidInput`])
    /// - No strategy produced the item ([`Error::NotFound`])
    /// - The destination exists and overwriting is off ([`Error::OutputExists`])
    /// - An attempted backend fails, or the operation is cancelled
    pub async fn download(
        &self,
        request: &DownloadRequest,
        cancel: &CancellationToken,
    ) -> Result<TransferResult> {
        let published_file_id = parse_published_file_id(&request.id_or_link).ok_or_else(|| {
            Error::invalid(format!(
                "could not parse a workshop item id from {:?}",
                request.id_or_link
            ))
        })?;
        if request.output_dir.as_os_str().is_empty() {
            return Err(Error::invalid("output directory is required"));
        }

        tracing::info!(
            %published_file_id,
            app_id = %request.app_id,
            output_dir = ?request.output_dir,
            "workshop download started"
        );

        let mut details = None;
        let result = match self
            .locate_content(request, published_file_id, &mut details, cancel)
            .await?
        {
            Source::Transferred(result) => result,
            Source::Local(hit) => {
                self.deliver_local(request, published_file_id, hit, details, cancel)
                    .await?
            }
        };

        tracing::info!(
            %published_file_id,
            app_id = %result.app_id,
            output = ?result.output_path,
            kind = ?result.output_kind,
            "workshop download complete"
        );
        Ok(result)
    }

    async fn fetch_details(
        &self,
        published_file_id: PublishedFileId,
        cancel: &CancellationToken,
    ) -> Result<Option<ItemDetails>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.status("Fetching details...");
        let details = self.details.fetch(published_file_id, cancel).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(details)
    }

    fn status(&self, message: &str) {
        self.events
            .progress(DOWNLOAD_OPERATION, 0)
            .set(0, 0, Some(message.to_string()));
    }

    async fn locate_content(
        &self,
        request: &DownloadRequest,
        published_file_id: PublishedFileId,
        details: &mut Option<ItemDetails>,
        cancel: &CancellationToken,
    ) -> Result<Source> {
        if let Some(hit) = self.cache.find(request.app_id, published_file_id).await {
            tracing::debug!(content = ?hit.content_dir, "cache hit under requested scope");
            return Ok(Source::Local(hit));
        }

        if request.fetch_details {
            *details = self.fetch_details(published_file_id, cancel).await?;
            let consumer = details
                .as_ref()
                .and_then(|d| d.consumer_app_id)
                .filter(|app| !app.is_unset() && *app != request.app_id);
            if let Some(consumer) = consumer
                && let Some(hit) = self.cache.find(consumer, published_file_id).await
            {
                tracing::debug!(content = ?hit.content_dir, %consumer, "cache hit under owning scope");
                return Ok(Source::Local(hit));
            }
        }

        if let Some(hit) = self.cache.find_any_app(published_file_id).await {
            tracing::debug!(content = ?hit.content_dir, app_id = %hit.app_id, "cache hit under other scope");
            return Ok(Source::Local(hit));
        }

        if details.is_none() {
            *details = self.fetch_details(published_file_id, cancel).await?;
        }

        if let Some(item) = details.as_ref()
            && let Some(url) = item.file_url.as_deref().filter(|u| !u.trim().is_empty())
        {
            let result = self
                .download_from_web(request, published_file_id, item, url, cancel)
                .await?;
            return Ok(Source::Transferred(result));
        }

        let target_app = details
            .as_ref()
            .and_then(|d| d.consumer_app_id)
            .filter(|app| !app.is_unset())
            .unwrap_or(request.app_id);

        if request.use_helper && !target_app.is_unset() {
            self.status("Downloading via helper...");
            let downloaded = self
                .helper
                .download(target_app, published_file_id, cancel)
                .await?;
            return Ok(Source::Local(CacheHit {
                app_id: downloaded.app_id,
                content_dir: downloaded.install_folder,
            }));
        }

        if request.use_steamcmd
            && !target_app.is_unset()
            && let Some(hit) = self
                .download_with_steamcmd(request, target_app, published_file_id, cancel)
                .await?
        {
            return Ok(Source::Local(hit));
        }

        Err(Error::NotFound {
            app_id: target_app,
            published_file_id,
        })
    }

    async fn download_with_steamcmd(
        &self,
        request: &DownloadRequest,
        app_id: AppId,
        published_file_id: PublishedFileId,
        cancel: &CancellationToken,
    ) -> Result<Option<CacheHit>> {
        let Some(path) = locate_steamcmd(&self.config.tools) else {
            tracing::warn!("SteamCMD fallback enabled but no SteamCMD executable was found");
            return Ok(None);
        };

        let install_dir = self.config.steamcmd_install_dir();
        tokio::fs::create_dir_all(&install_dir).await?;

        self.status("Downloading via SteamCMD...");
        let username = request
            .steamcmd_username
            .as_deref()
            .or(self.config.tools.steamcmd_username.as_deref());
        SteamCmd::new(path, PromptLimits::from(&self.config.prompts))
            .download_item(
                &install_dir,
                username,
                app_id,
                published_file_id,
                &self.events,
                self.prompts.as_ref(),
                cancel,
            )
            .await?;

        if let Some(hit) = find_in_root(&install_dir, app_id, published_file_id).await {
            return Ok(Some(hit));
        }
        Ok(CacheLocator::new(vec![install_dir])
            .find_any_app(published_file_id)
            .await)
    }

    async fn download_from_web(
        &self,
        request: &DownloadRequest,
        published_file_id: PublishedFileId,
        details: &ItemDetails,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<TransferResult> {
        let file_name = web_file_name(details.file_name.as_deref(), url).ok_or_else(|| {
            Error::invalid(format!("cannot derive a file name from download URL {url}"))
        })?;
        let file_path = Path::new(&file_name);
        let content_name_base = file_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
        let base_name = build_output_base_name(
            published_file_id,
            Some(details),
            &request.naming,
            content_name_base.as_deref(),
        );

        tokio::fs::create_dir_all(&request.output_dir).await?;
        let output_dir = std::path::absolute(&request.output_dir)?;
        let output_path = output_dir.join(format!("{base_name}{}", dotted_extension(file_path)));
        ensure_output_absent(&output_path, request.overwrite).await?;

        download_to_file(
            &self.http,
            url,
            &output_path,
            details.file_size,
            self.config.network.download_timeout,
            &self.events,
            cancel,
        )
        .await?;

        let app_id = details
            .consumer_app_id
            .filter(|app| !app.is_unset())
            .unwrap_or(request.app_id);
        let (output_path, output_kind) = if request.convert_payload {
            convert_downloaded_file(&output_path, app_id, request.overwrite, &self.events, cancel)
                .await?
        } else {
            (output_path, OutputKind::File)
        };

        Ok(TransferResult {
            published_file_id,
            app_id,
            source: url.to_string(),
            output_path,
            output_kind,
            details: Some(details.clone()),
        })
    }

    async fn deliver_local(
        &self,
        request: &DownloadRequest,
        published_file_id: PublishedFileId,
        hit: CacheHit,
        mut details: Option<ItemDetails>,
        cancel: &CancellationToken,
    ) -> Result<TransferResult> {
        let payload = classify_payload(&hit.content_dir, request.convert_payload).await?;

        if request.fetch_details && details.is_none() {
            details = self.fetch_details(published_file_id, cancel).await?;
        }

        let content_name_base = payload.content_name_base();
        let base_name = build_output_base_name(
            published_file_id,
            details.as_ref(),
            &request.naming,
            content_name_base.as_deref(),
        );

        tokio::fs::create_dir_all(&request.output_dir).await?;
        let output_dir = std::path::absolute(&request.output_dir)?;
        let output_path = payload.output_path(&output_dir, &base_name);
        ensure_output_absent(&output_path, request.overwrite).await?;

        let source = payload.source().to_path_buf();
        let mut reporter = self.events.progress(DOWNLOAD_OPERATION, 0);
        let copied = match &payload {
            Payload::Directory(dir) => {
                let total = directory_size(dir).await?;
                reporter.set(0, total, Some("Copying from cache...".into()));
                copy_dir_with_progress(dir, &output_path, &mut reporter, cancel).await
            }
            Payload::File { path, .. } => {
                let total = tokio::fs::metadata(path).await?.len();
                if let Some(name) = output_path.file_name() {
                    reporter.set_current_item(name.to_string_lossy());
                }
                reporter.set(0, total, Some("Copying from cache...".into()));
                copy_file_with_progress(path, &output_path, &mut reporter, cancel).await
            }
        };
        if let Err(e) = copied {
            remove_path_best_effort(&output_path).await;
            return Err(e);
        }
        reporter.finish("Copy complete.");

        let (output_path, output_kind) = match payload {
            Payload::Directory(_) => (output_path, OutputKind::Directory),
            Payload::File { .. } if request.convert_payload => {
                convert_downloaded_file(
                    &output_path,
                    hit.app_id,
                    request.overwrite,
                    &self.events,
                    cancel,
                )
                .await?
            }
            Payload::File { .. } => (output_path, OutputKind::File),
        };

        Ok(TransferResult {
            published_file_id,
            app_id: hit.app_id,
            source: source.to_string_lossy().into_owned(),
            output_path,
            output_kind,
            details,
        })
    }
}
