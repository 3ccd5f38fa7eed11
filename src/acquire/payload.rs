//! Payload classification for an established content source

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// What gets copied to the output location
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// A single file, with its extension (including the dot, possibly empty)
    File {
        /// Source file
        path: PathBuf,
        /// Extension carried over to the output name, e.g. `".gma"`
        extension: String,
    },
    /// A whole directory tree
    Directory(PathBuf),
}

impl Payload {
    /// Source path of the payload
    pub fn source(&self) -> &Path {
        match self {
            Payload::File { path, .. } => path,
            Payload::Directory(path) => path,
        }
    }

    /// The file stem, used for naming when the id is excluded
    pub fn content_name_base(&self) -> Option<String> {
        match self {
            Payload::File { path, .. } => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned()),
            Payload::Directory(_) => None,
        }
    }

    /// Output location for this payload given the computed base name
    pub fn output_path(&self, output_dir: &Path, base_name: &str) -> PathBuf {
        match self {
            Payload::File { extension, .. } => output_dir.join(format!("{base_name}{extension}")),
            Payload::Directory(_) => output_dir.join(base_name),
        }
    }
}

/// Extension of `path` with its leading dot, or an empty string
pub(crate) fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Decide whether `content` is delivered as a single file or as a folder
///
/// A directory holding exactly one top-level file and no subdirectories is a
/// file payload; any other directory is copied whole. Without `select_file`
/// a directory is always copied whole.
pub async fn classify_payload(content: &Path, select_file: bool) -> Result<Payload> {
    let metadata = tokio::fs::metadata(content).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::OperationFailed(format!(
                "workshop content not found at {}",
                content.display()
            ))
        } else {
            e.into()
        }
    })?;

    if metadata.is_file() {
        return Ok(Payload::File {
            path: content.to_path_buf(),
            extension: dotted_extension(content),
        });
    }

    if !select_file {
        return Ok(Payload::Directory(content.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut has_subdirectory = false;
    let mut read_dir = tokio::fs::read_dir(content).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            has_subdirectory = true;
            break;
        }
        if file_type.is_file() {
            files.push(entry.path());
        }
    }

    match files.as_slice() {
        [single] if !has_subdirectory => Ok(Payload::File {
            extension: dotted_extension(single),
            path: single.clone(),
        }),
        _ => Ok(Payload::Directory(content.to_path_buf())),
    }
}
