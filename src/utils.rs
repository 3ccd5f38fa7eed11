//! Utility functions for file operations, collision policy and tool lookup

use crate::error::{Error, Result};
use crate::progress::ProgressReporter;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Copy buffer size
const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Apply the output-collision policy to `path`
///
/// If nothing exists at `path` this is a no-op. Otherwise the call fails with
/// [`Error::OutputExists`] unless `overwrite` is set, in which case the existing
/// file or directory tree is deleted.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> workshop_dl::Result<()> {
/// use workshop_dl::utils::ensure_output_absent;
///
/// let dir = std::env::temp_dir().join("workshop-dl-doc-ensure");
/// std::fs::create_dir_all(&dir)?;
/// let target = dir.join("out.gma");
/// std::fs::write(&target, b"x")?;
///
/// assert!(ensure_output_absent(&target, false).await.is_err());
/// ensure_output_absent(&target, true).await?;
/// assert!(!target.exists());
/// # Ok(())
/// # }
/// ```
pub async fn ensure_output_absent(path: &Path, overwrite: bool) -> Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if !overwrite {
        return Err(Error::OutputExists {
            path: path.to_path_buf(),
        });
    }

    tracing::debug!(path = ?path, "removing existing output");
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await?;
    } else {
        tokio::fs::remove_file(path).await?;
    }
    Ok(())
}

/// Copy one file into a destination that must not exist yet
pub async fn copy_file_with_progress(
    source: &Path,
    destination: &Path,
    reporter: &mut ProgressReporter,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut input = tokio::fs::File::open(source).await?;
    let mut output = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await?;

    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let read = input.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        output.write_all(&buffer[..read]).await?;
        reporter.advance(read as u64);
    }
    output.flush().await?;
    Ok(())
}

/// Recursively copy a directory tree, reporting bytes across all files
///
/// The reporter's total should already cover the tree (see [`directory_size`]).
pub async fn copy_dir_with_progress(
    source: &Path,
    destination: &Path,
    reporter: &mut ProgressReporter,
    cancel: &CancellationToken,
) -> Result<()> {
    tokio::fs::create_dir_all(destination).await?;

    for file in list_files_recursive(source).await? {
        let Ok(relative) = file.strip_prefix(source) else {
            continue;
        };
        reporter.set_current_item(relative.to_string_lossy());
        copy_file_with_progress(&file, &destination.join(relative), reporter, cancel).await?;
    }
    Ok(())
}

/// All regular files below `root`, depth-first, in name order per directory
pub async fn list_files_recursive(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.file_name());

        // Reverse so the stack pops subdirectories in name order.
        for entry in entries.into_iter().rev() {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Total size in bytes of the regular files below `root`
pub async fn directory_size(root: &Path) -> Result<u64> {
    let mut total = 0u64;
    for file in list_files_recursive(root).await? {
        if let Ok(metadata) = tokio::fs::metadata(&file).await {
            total = total.saturating_add(metadata.len());
        }
    }
    Ok(total)
}

/// Delete a file or directory tree, logging instead of failing
pub async fn remove_path_best_effort(path: &Path) {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        tracing::warn!(path = ?path, error = %e, "failed to delete temporary path");
    }
}

/// Case-insensitive extension check (`ext` without the dot)
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use workshop_dl::utils::has_extension;
///
/// assert!(has_extension(Path::new("addon.GMA"), "gma"));
/// assert!(!has_extension(Path::new("addon.gma.zip"), "gma"));
/// ```
#[must_use]
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Locate an executable from an override and a list of file-name candidates
///
/// The override may name the file itself or a directory containing one of the
/// candidates. Without a usable override, PATH is searched (when
/// `search_path` is set) for each candidate in order.
pub fn find_executable(
    override_path: Option<&Path>,
    candidates: &[&str],
    search_path: bool,
) -> Option<PathBuf> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        if path.is_dir() {
            let nested = candidates
                .iter()
                .map(|candidate| path.join(candidate))
                .find(|candidate| candidate.is_file());
            if nested.is_some() {
                return nested;
            }
        }
    }

    if !search_path {
        return None;
    }

    candidates
        .iter()
        .find_map(|candidate| which::which(candidate).ok())
}
