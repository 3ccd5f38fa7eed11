//! Publish payload pipeline
//!
//! A publish runs in three phases:
//! 1. Validation of the request (nothing touches disk yet)
//! 2. Staging into scratch roots: single-file payload folders, clean copies,
//!    `addon.json` synthesis and GMA/VPK packing (see [`staging`])
//! 3. Upload through SteamCMD (with a `workshopitem` VDF) or the helper
//!
//! Scratch roots are removed after every run, whether it succeeded, failed or
//! was cancelled.

pub mod manifest;
pub mod packer;
pub mod staging;
pub mod vdf;

pub use packer::{ContainerFormat, ContainerPacker, GmadPacker, NoOpPacker, VpkToolPacker};
pub use staging::StagedPayload;

use crate::Workshop;
use crate::error::{Error, Result};
use crate::session::PromptLimits;
use crate::steamcmd::{SteamCmd, locate_steamcmd};
use crate::types::{PublishBackend, PublishRequest, PublishResult};
use staging::StageContext;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Progress label for the publish pipeline
pub(crate) const PUBLISH_OPERATION: &str = "Workshop Publish";

/// Reject requests that cannot be published, before any staging happens
pub fn validate_request(request: &PublishRequest) -> Result<()> {
    if request.app_id.is_unset() {
        return Err(Error::invalid("app id is required"));
    }
    if request.content_path.as_os_str().is_empty() {
        return Err(Error::invalid("content path is required"));
    }
    if !request.preview_file.is_file() {
        return Err(Error::invalid(format!(
            "preview file not found: {}",
            request.preview_file.display()
        )));
    }
    for (field, value) in [
        ("title", &request.title),
        ("description", &request.description),
        ("change note", &request.change_note),
    ] {
        if value.trim().is_empty() {
            return Err(Error::invalid(format!("{field} is required")));
        }
    }
    if request.backend == PublishBackend::SteamCmd
        && request
            .steamcmd_username
            .as_deref()
            .is_none_or(|name| name.trim().is_empty())
    {
        return Err(Error::invalid(
            "a SteamCMD username is required to publish with SteamCMD",
        ));
    }
    Ok(())
}

impl Workshop {
    /// Stage `request.content_path` and upload it as a workshop item
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The request is invalid ([`Error::InvalidInput`])
    /// - SteamCMD is selected but cannot be located ([`Error::ToolNotFound`])
    /// - Staging, manifest handling or packing fails
    /// - The backend fails or is cancelled
    pub async fn publish(
        &self,
        request: &PublishRequest,
        cancel: &CancellationToken,
    ) -> Result<PublishResult> {
        validate_request(request)?;

        let steamcmd = match request.backend {
            PublishBackend::SteamCmd => {
                let path = locate_steamcmd(&self.config.tools).ok_or_else(|| {
                    Error::ToolNotFound(
                        "SteamCMD (set tools.steamcmd_path or add it to PATH)".into(),
                    )
                })?;
                Some(SteamCmd::new(path, PromptLimits::from(&self.config.prompts)))
            }
            PublishBackend::Helper => None,
        };

        tracing::info!(
            app_id = %request.app_id,
            published_file_id = %request.published_file_id,
            backend = ?request.backend,
            content = ?request.content_path,
            "publishing workshop item"
        );

        let mut staged = StagedPayload::new(&request.content_path, &self.config.publish.scratch_dir);
        let result = self
            .publish_staged(request, &mut staged, steamcmd.as_ref(), cancel)
            .await;
        staged.cleanup().await;

        match &result {
            Ok(published) => tracing::info!(
                app_id = %published.app_id,
                published_file_id = %published.published_file_id,
                "publish complete"
            ),
            Err(e) if e.is_cancelled() => tracing::info!("publish cancelled"),
            Err(e) => tracing::warn!(error = %e, "publish failed"),
        }
        result
    }

    async fn publish_staged(
        &self,
        request: &PublishRequest,
        staged: &mut StagedPayload,
        steamcmd: Option<&SteamCmd>,
        cancel: &CancellationToken,
    ) -> Result<PublishResult> {
        let mut reporter = self.events.progress(PUBLISH_OPERATION, 0);
        staging::stage(
            staged,
            StageContext {
                request,
                gma_packer: self.gma_packer.as_ref(),
                vpk_packer: self.vpk_packer.as_ref(),
                reporter: &mut reporter,
                events: &self.events,
                cancel,
            },
        )
        .await?;

        let payload = staged.root().to_path_buf();
        tracing::debug!(payload = ?payload, scratch_roots = staged.scratch_roots().len(), "payload staged");

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match steamcmd {
            Some(steamcmd) => {
                reporter.set(0, 0, Some("Publishing via SteamCMD...".into()));
                let result = self
                    .publish_with_steamcmd(steamcmd, request, &payload, cancel)
                    .await?;
                reporter.finish("Publish complete.");
                Ok(result)
            }
            None => {
                reporter.set(0, 0, Some("Publishing via helper...".into()));
                let result = self.helper.publish(request, &payload, cancel).await?;
                reporter.finish("Publish complete.");
                Ok(result)
            }
        }
    }

    async fn publish_with_steamcmd(
        &self,
        steamcmd: &SteamCmd,
        request: &PublishRequest,
        payload: &Path,
        cancel: &CancellationToken,
    ) -> Result<PublishResult> {
        let vdf_path: PathBuf = request
            .vdf_path
            .clone()
            .unwrap_or_else(|| vdf::default_vdf_path(request.app_id, request.published_file_id));
        vdf::write_vdf(&vdf_path, request, payload).await?;
        self.events
            .line(format!("Wrote workshop manifest: {}", vdf_path.display()));

        let username = request
            .steamcmd_username
            .as_deref()
            .map(str::trim)
            .unwrap_or_default();
        steamcmd
            .build_item(username, &vdf_path, &self.events, self.prompts.as_ref(), cancel)
            .await?;

        // SteamCMD writes the id of a newly created item back into the manifest.
        let published_file_id = vdf::read_published_file_id(&vdf_path)
            .await
            .unwrap_or(request.published_file_id);
        if published_file_id.is_unset() {
            return Err(Error::ProtocolViolation(format!(
                "SteamCMD finished without recording a published file id in {}",
                vdf_path.display()
            )));
        }

        Ok(PublishResult {
            app_id: request.app_id,
            published_file_id,
            vdf_path: Some(vdf_path),
        })
    }
}
