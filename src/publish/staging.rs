//! Payload staging: scratch roots, clean copies, container packing
//!
//! Every scratch root is created through [`StagedPayload::create_root`] and
//! recorded there, so the pipeline can delete all of them whatever happens.

use super::manifest::{self, MANIFEST_FILE_NAME};
use super::packer::{ContainerFormat, ContainerPacker, MULTI_FILE_DIRECTORY_SUFFIX};
use crate::error::{Error, Result};
use crate::naming::sanitize_file_name;
use crate::progress::{EventSink, ProgressReporter};
use crate::types::{AppId, PublishRequest, VpkOptions};
use crate::utils::{copy_file_with_progress, directory_size, has_extension, remove_path_best_effort};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Directory names left out of clean copies
pub const JUNK_DIRECTORY_NAMES: &[&str] = &[
    ".git",
    ".github",
    ".vs",
    ".vscode",
    ".idea",
    ".svn",
    ".hg",
    "bin",
    "obj",
    "node_modules",
    "__pycache__",
    ".venv",
    ".pytest_cache",
];

/// File names left out of clean copies (compared case-insensitively)
pub const JUNK_FILE_NAMES: &[&str] = &[
    ".ds_store",
    "thumbs.db",
    "desktop.ini",
    ".gitignore",
    ".gitattributes",
    ".gitmodules",
];

/// Maximum length of a packed container's base name
const MAX_CONTAINER_BASE_CHARS: usize = 80;

/// Sub-folder of a scratch root that holds the payload
const PAYLOAD_DIR: &str = "payload";

/// The payload handed to a backend, plus every scratch root made for it
#[derive(Debug)]
pub struct StagedPayload {
    root: PathBuf,
    scratch_dir: PathBuf,
    scratch_roots: Vec<PathBuf>,
}

impl StagedPayload {
    /// Start from `input`, with scratch roots created below `scratch_dir`
    pub fn new(input: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: input.into(),
            scratch_dir: scratch_dir.into(),
            scratch_roots: Vec::new(),
        }
    }

    /// Current payload path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch roots created so far
    pub fn scratch_roots(&self) -> &[PathBuf] {
        &self.scratch_roots
    }

    /// Create and record `<scratch_dir>/<prefix>_<uuid>`
    pub async fn create_root(&mut self, prefix: &str) -> Result<PathBuf> {
        let root = self
            .scratch_dir
            .join(format!("{prefix}_{}", uuid::Uuid::new_v4().simple()));
        // Recorded before creation so a partially created root is still removed.
        self.scratch_roots.push(root.clone());
        tokio::fs::create_dir_all(root.join(PAYLOAD_DIR)).await?;
        Ok(root)
    }

    fn set_root(&mut self, root: PathBuf) {
        self.root = root;
    }

    /// Delete every recorded scratch root; failures are only logged
    pub async fn cleanup(&mut self) {
        for root in std::mem::take(&mut self.scratch_roots) {
            remove_path_best_effort(&root).await;
        }
    }
}

impl Drop for StagedPayload {
    fn drop(&mut self) {
        // Reached when the pipeline future is dropped before cleanup ran.
        for root in self.scratch_roots.drain(..) {
            if let Err(e) = std::fs::remove_dir_all(&root)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = ?root, error = %e, "failed to delete scratch root");
            }
        }
    }
}

/// Inputs shared by the staging steps
pub(crate) struct StageContext<'a> {
    pub request: &'a PublishRequest,
    pub gma_packer: &'a dyn ContainerPacker,
    pub vpk_packer: &'a dyn ContainerPacker,
    pub reporter: &'a mut ProgressReporter,
    pub events: &'a EventSink,
    pub cancel: &'a CancellationToken,
}

/// Turn the request's content path into a backend-ready payload folder
pub(crate) async fn stage(staged: &mut StagedPayload, ctx: StageContext<'_>) -> Result<()> {
    let request = ctx.request;
    let input = std::path::absolute(&request.content_path)?;
    let metadata = tokio::fs::metadata(&input).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::invalid(format!("content path not found: {}", input.display()))
        } else {
            e.into()
        }
    })?;
    let is_gmod = request.app_id == AppId::GARRYS_MOD;

    if metadata.is_file() {
        if is_gmod && !has_extension(&input, "gma") {
            return Err(Error::invalid(
                "Garry's Mod Workshop content must be a folder or a .gma file",
            ));
        }
        ctx.reporter
            .set(0, 0, Some("Preparing single-file payload folder...".into()));
        let payload = stage_single_file(staged, &input, ctx.reporter, ctx.cancel).await?;
        staged.set_root(payload);
        return Ok(());
    }

    if request.stage_clean_payload && !is_gmod && !is_vpk_payload_folder(staged.root()).await? {
        ctx.reporter
            .set(0, 0, Some("Staging clean payload folder...".into()));
        let root = staged.create_root("stage").await?;
        let payload = root.join(PAYLOAD_DIR);
        copy_tree(staged.root(), &payload, true, ctx.reporter, ctx.cancel).await?;
        staged.set_root(payload);
    }

    let base_name = container_base_name(&request.title, &input);

    if is_gmod && !is_gma_payload_folder(staged.root()).await? {
        ctx.reporter
            .set(0, 0, Some("Packing .gma for Garry's Mod...".into()));
        let payload = stage_gma(staged, &base_name, &ctx).await?;
        staged.set_root(payload);
    }

    if let Some(options) = request.pack_vpk
        && !is_gmod
        && !is_vpk_payload_folder(staged.root()).await?
    {
        ctx.reporter
            .set(0, 0, Some("Packing .vpk (workshop payload)...".into()));
        let payload = stage_vpk(staged, &base_name, options, &ctx).await?;
        staged.set_root(payload);
    }

    Ok(())
}

/// Sanitized title, else the input folder name, else `addon`; at most 80 chars
pub fn container_base_name(title: &str, input: &Path) -> String {
    let source = if title.trim().is_empty() {
        input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        title.to_string()
    };
    let name: String = sanitize_file_name(&source, false)
        .chars()
        .take(MAX_CONTAINER_BASE_CHARS)
        .collect();
    if name.trim().is_empty() {
        "addon".to_string()
    } else {
        name
    }
}

async fn top_level_entries(dir: &Path) -> Result<(Vec<PathBuf>, bool)> {
    let mut files = Vec::new();
    let mut has_directory = false;
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            has_directory = true;
        } else if file_type.is_file() {
            files.push(entry.path());
        }
    }
    Ok((files, has_directory))
}

/// Exactly one top-level `.gma` file and no subdirectories
pub async fn is_gma_payload_folder(dir: &Path) -> Result<bool> {
    let (files, has_directory) = top_level_entries(dir).await?;
    Ok(!has_directory && matches!(files.as_slice(), [only] if has_extension(only, "gma")))
}

/// Only `.vpk`/`.fpx` files at the top level, at least one, no subdirectories
pub async fn is_vpk_payload_folder(dir: &Path) -> Result<bool> {
    let (files, has_directory) = top_level_entries(dir).await?;
    Ok(!has_directory
        && !files.is_empty()
        && files
            .iter()
            .all(|file| has_extension(file, "vpk") || has_extension(file, "fpx")))
}

/// The full file set of a multi-part VPK archive `input` belongs to, if any
///
/// `pak01_dir.vpk` (or `pak01_fdr.fpx`) and `pak01_NNN.vpk` both expand to the
/// directory file plus every numbered part, sorted.
pub async fn multi_part_files(input: &Path) -> Result<Option<Vec<PathBuf>>> {
    let (Some(dir), Some(stem), Some(ext)) = (
        input.parent(),
        input.file_stem().and_then(|s| s.to_str()),
        input.extension().and_then(|e| e.to_str()),
    ) else {
        return Ok(None);
    };
    let directory_suffix = if ext.eq_ignore_ascii_case("fpx") {
        "_fdr"
    } else if ext.eq_ignore_ascii_case("vpk") {
        MULTI_FILE_DIRECTORY_SUFFIX
    } else {
        return Ok(None);
    };

    let (prefix, directory_file) = if let Some(prefix) = strip_suffix_ignore_case(stem, directory_suffix) {
        (prefix, input.to_path_buf())
    } else {
        let Some((prefix, index)) = stem.rsplit_once('_') else {
            return Ok(None);
        };
        if prefix.is_empty() || !is_part_index(index) {
            return Ok(None);
        }
        let directory_file = dir.join(format!("{prefix}{directory_suffix}.{ext}"));
        if !tokio::fs::try_exists(&directory_file).await? {
            return Ok(None);
        }
        (prefix, directory_file)
    };
    if prefix.is_empty() {
        return Ok(None);
    }

    let mut files = vec![directory_file];
    let part_prefix = format!("{prefix}_");
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        let Some(candidate) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let is_part = has_extension(&path, ext)
            && candidate
                .get(..part_prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(&part_prefix))
            && candidate.get(part_prefix.len()..).is_some_and(is_part_index);
        if is_part {
            files.push(path);
        }
    }
    files.sort();
    files.dedup();
    Ok(Some(files))
}

fn strip_suffix_ignore_case<'a>(value: &'a str, suffix: &str) -> Option<&'a str> {
    let split = value.len().checked_sub(suffix.len())?;
    let tail = value.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &value[..split])
}

fn is_part_index(index: &str) -> bool {
    index.len() == 3 && index.bytes().all(|b| b.is_ascii_digit())
}

async fn stage_single_file(
    staged: &mut StagedPayload,
    input: &Path,
    reporter: &mut ProgressReporter,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let root = staged.create_root("file").await?;
    let payload = root.join(PAYLOAD_DIR);

    let files = multi_part_files(input)
        .await?
        .unwrap_or_else(|| vec![input.to_path_buf()]);
    for file in files {
        let Some(name) = file.file_name() else {
            return Err(Error::invalid(format!(
                "content file name could not be determined: {}",
                file.display()
            )));
        };
        reporter.set_current_item(name.to_string_lossy());
        copy_file_with_progress(&file, &payload.join(name), reporter, cancel).await?;
    }
    Ok(payload)
}

fn is_junk(name: &str, is_dir: bool) -> bool {
    if is_dir {
        JUNK_DIRECTORY_NAMES.contains(&name)
    } else {
        let lower = name.to_lowercase();
        JUNK_FILE_NAMES.contains(&lower.as_str())
    }
}

/// Copy `source` into `destination`, optionally leaving out junk names
pub(crate) async fn copy_tree(
    source: &Path,
    destination: &Path,
    exclude_junk: bool,
    reporter: &mut ProgressReporter,
    cancel: &CancellationToken,
) -> Result<()> {
    let total = directory_size(source).await?;
    reporter.set(0, total, None);

    let mut pending = vec![(source.to_path_buf(), destination.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::fs::create_dir_all(&to).await?;

        let mut read_dir = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let name = entry.file_name();
            if exclude_junk && is_junk(&name.to_string_lossy(), file_type.is_dir()) {
                continue;
            }
            if file_type.is_dir() {
                pending.push((entry.path(), to.join(&name)));
            } else if file_type.is_file() {
                reporter.set_current_item(name.to_string_lossy());
                copy_file_with_progress(&entry.path(), &to.join(&name), reporter, cancel).await?;
            }
        }
    }
    Ok(())
}

async fn stage_gma(
    staged: &mut StagedPayload,
    base_name: &str,
    ctx: &StageContext<'_>,
) -> Result<PathBuf> {
    let request = ctx.request;
    let root = staged.create_root("gmod").await?;
    let payload = root.join(PAYLOAD_DIR);
    let output = payload.join(format!("{base_name}.gma"));
    let content_tags = request.content_tags.as_deref().unwrap_or(&request.tags);

    let mut pack_input = staged.root().to_path_buf();
    let found = manifest::locate_manifest(&pack_input).await?;
    let ready_as_is = match found.as_deref() {
        Some(path) if manifest::is_canonical_name(path) => {
            manifest_is_complete(path, request, content_tags).await?
        }
        _ => false,
    };

    // Manifests are only ever written inside the staged copy.
    if request.stage_clean_payload || !ready_as_is {
        let stage_dir = root.join("stage");
        let mut reporter = ctx.events.progress(super::PUBLISH_OPERATION, 0);
        copy_tree(&pack_input, &stage_dir, true, &mut reporter, ctx.cancel).await?;

        let staged_manifest = stage_dir.join(MANIFEST_FILE_NAME);
        if let Some(name) = found.as_deref().and_then(Path::file_name)
            && !tokio::fs::try_exists(&staged_manifest).await?
        {
            let staged_source = stage_dir.join(name);
            if tokio::fs::try_exists(&staged_source).await? {
                tokio::fs::copy(&staged_source, &staged_manifest).await?;
                remove_path_best_effort(&staged_source).await;
            }
        }

        if tokio::fs::try_exists(&staged_manifest).await? {
            manifest::patch_manifest_file(
                &staged_manifest,
                &request.title,
                &request.description,
                request.content_type.as_deref(),
                content_tags,
            )
            .await?;
        } else {
            let text = manifest::new_manifest(
                &request.title,
                &request.description,
                request.content_type.as_deref(),
                content_tags,
            )?;
            tokio::fs::write(&staged_manifest, text).await?;
        }
        pack_input = stage_dir;
    }

    ctx.gma_packer
        .pack(&pack_input, &output, ContainerFormat::Gma, ctx.events, ctx.cancel)
        .await?;
    if !tokio::fs::try_exists(&output).await? {
        return Err(Error::OperationFailed(
            "failed to create GMA payload for publish".into(),
        ));
    }
    Ok(payload)
}

/// Whether an existing manifest already carries everything a patch would add
async fn manifest_is_complete(
    path: &Path,
    request: &PublishRequest,
    content_tags: &[String],
) -> Result<bool> {
    let text = tokio::fs::read_to_string(path).await?;
    let patched = manifest::patch_manifest(
        &text,
        &request.title,
        &request.description,
        request.content_type.as_deref(),
        content_tags,
    );
    Ok(matches!(patched, Ok(None)))
}

async fn stage_vpk(
    staged: &mut StagedPayload,
    base_name: &str,
    options: VpkOptions,
    ctx: &StageContext<'_>,
) -> Result<PathBuf> {
    if !matches!(options.version, 1 | 2) {
        return Err(Error::invalid(format!(
            "VPK version must be 1 or 2 (got {})",
            options.version
        )));
    }
    let options = VpkOptions {
        version: if options.include_md5_sections { 2 } else { options.version },
        ..options
    };

    let root = staged.create_root("vpk").await?;
    let payload = root.join(PAYLOAD_DIR);
    let file_name = if options.multi_file {
        format!("{base_name}{MULTI_FILE_DIRECTORY_SUFFIX}.vpk")
    } else {
        format!("{base_name}.vpk")
    };
    let output = payload.join(file_name);

    ctx.vpk_packer
        .pack(
            staged.root(),
            &output,
            ContainerFormat::Vpk(options),
            ctx.events,
            ctx.cancel,
        )
        .await?;
    if !tokio::fs::try_exists(&output).await? {
        return Err(Error::OperationFailed(
            "failed to create VPK payload for publish".into(),
        ));
    }
    Ok(payload)
}
