//! Post-processing of downloaded files
//!
//! Formats are recognized by content, not by trusting the name, except for
//! zip archives which are recognized by extension like the archives they
//! usually are. Conversion failures keep the original file and are logged;
//! cancellation always propagates.

use crate::error::{Error, Result};
use crate::progress::{EventSink, ProgressRead};
use crate::types::{AppId, OutputKind};
use crate::utils::{ensure_output_absent, has_extension, remove_path_best_effort};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Magic bytes at the start of a GMA container
pub const GMA_MAGIC: &[u8; 4] = b"GMAD";

/// Size of an LZMA-alone header (props, dictionary size, uncompressed size)
const LZMA_HEADER_LEN: u64 = 13;

/// Largest valid LZMA properties byte (`9 * 5 * 5 - 1`)
const LZMA_MAX_PROPS: u8 = 9 * 5 * 5 - 1;

/// Convert a downloaded file into its expected final form
///
/// Returns the final output path and its kind. Unrecognized files are left
/// as they are.
pub async fn convert_downloaded_file(
    path: &Path,
    app_id: AppId,
    overwrite: bool,
    events: &EventSink,
    cancel: &CancellationToken,
) -> Result<(PathBuf, OutputKind)> {
    let unchanged = (path.to_path_buf(), OutputKind::File);

    if has_extension(path, "zip") {
        match extract_zip(path, overwrite, events, cancel).await {
            Ok(folder) => return Ok((folder, OutputKind::Directory)),
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "zip extraction failed, keeping archive");
            }
        }
    }

    if app_id != AppId::GARRYS_MOD {
        return Ok(unchanged);
    }

    let sniff_path = path.to_path_buf();
    let (is_gma, is_lzma) = tokio::task::spawn_blocking(move || {
        (looks_like_gma(&sniff_path), looks_like_lzma(&sniff_path))
    })
    .await
    .map_err(|e| Error::OperationFailed(format!("format sniffing task failed: {e}")))?;

    if is_gma || !is_lzma {
        return Ok(unchanged);
    }

    let gma_path = decompressed_gma_path(path);
    match decompress_lzma(path, &gma_path, overwrite, events, cancel).await {
        Ok(()) => {
            remove_path_best_effort(path).await;
            Ok((gma_path, OutputKind::File))
        }
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "LZMA decompression failed, keeping original");
            Ok(unchanged)
        }
    }
}

/// Whether the file starts with the GMA magic
pub fn looks_like_gma(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    std::fs::File::open(path)
        .and_then(|mut file| file.read_exact(&mut magic))
        .is_ok_and(|()| &magic == GMA_MAGIC)
}

/// Whether the file starts with a plausible LZMA-alone header
///
/// Requires a complete header, a properties byte in range and a non-zero
/// dictionary size.
pub fn looks_like_lzma(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    if file.metadata().map(|m| m.len()).unwrap_or(0) < LZMA_HEADER_LEN {
        return false;
    }
    let mut header = [0u8; 5];
    if file.read_exact(&mut header).is_err() {
        return false;
    }
    let dictionary_size = u32::from_le_bytes([header[1], header[2], header[3], header[4]]);
    header[0] <= LZMA_MAX_PROPS && dictionary_size != 0
}

/// `<stem>.gma`, or `<stem>_decompressed.gma` when the source already is a `.gma`
pub fn decompressed_gma_path(source: &Path) -> PathBuf {
    let candidate = source.with_extension("gma");
    if candidate != source {
        return candidate;
    }
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}_decompressed.gma"))
}

async fn extract_zip(
    archive: &Path,
    overwrite: bool,
    events: &EventSink,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let folder = archive.with_file_name(stem);
    ensure_output_absent(&folder, overwrite).await?;
    let total = tokio::fs::metadata(archive).await?.len();
    tokio::fs::create_dir_all(&folder).await?;

    let mut reporter = events.progress(super::DOWNLOAD_OPERATION, total);
    if let Some(name) = archive.file_name() {
        reporter.set_current_item(name.to_string_lossy());
    }
    reporter.set(0, total, Some("Extracting .zip...".into()));

    let (archive_owned, folder_owned, token) =
        (archive.to_path_buf(), folder.clone(), cancel.clone());
    let extracted = tokio::task::spawn_blocking(move || {
        extract_zip_blocking(&archive_owned, &folder_owned, &token)
    })
    .await
    .map_err(|e| Error::OperationFailed(format!("zip extraction task failed: {e}")))
    .and_then(|result| result);

    match extracted {
        Ok(count) => {
            reporter.set(total, total, None);
            reporter.finish("Extraction complete.");
            tracing::info!(archive = ?archive, files = count, "zip payload extracted");
            remove_path_best_effort(archive).await;
            Ok(folder)
        }
        Err(e) => {
            remove_path_best_effort(&folder).await;
            Err(e)
        }
    }
}

fn extract_zip_blocking(archive: &Path, folder: &Path, cancel: &CancellationToken) -> Result<usize> {
    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut extracted = 0;

    for index in 0..zip.len() {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut entry = zip.by_index(index)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            tracing::warn!(name = entry.name(), "skipping zip entry with unsafe path");
            continue;
        };
        let target = folder.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut output = std::fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut output)?;
        extracted += 1;
    }
    Ok(extracted)
}

async fn decompress_lzma(
    source: &Path,
    destination: &Path,
    overwrite: bool,
    events: &EventSink,
    cancel: &CancellationToken,
) -> Result<()> {
    ensure_output_absent(destination, overwrite).await?;

    let total = tokio::fs::metadata(source).await?.len();
    let mut reporter = events.progress(super::DOWNLOAD_OPERATION, total);
    if let Some(name) = source.file_name() {
        reporter.set_current_item(name.to_string_lossy());
    }
    reporter.set(0, total, Some("Decompressing .lzma -> .gma...".into()));

    let (source_owned, destination_owned, token) =
        (source.to_path_buf(), destination.to_path_buf(), cancel.clone());
    let outcome = tokio::task::spawn_blocking(move || {
        let result = decompress_lzma_blocking(&source_owned, &destination_owned, &mut reporter, &token);
        (result, reporter)
    })
    .await;

    let result = match outcome {
        Ok((result, mut reporter)) => {
            if result.is_ok() {
                reporter.finish("Decompression complete.");
            }
            result
        }
        Err(e) => Err(Error::OperationFailed(format!("decompression task failed: {e}"))),
    };

    if result.is_err() {
        remove_path_best_effort(destination).await;
    }
    result
}

fn decompress_lzma_blocking(
    source: &Path,
    destination: &Path,
    reporter: &mut crate::progress::ProgressReporter,
    cancel: &CancellationToken,
) -> Result<()> {
    let input = std::fs::File::open(source)?;
    let output = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    let mut reader = BufReader::new(ProgressRead::new(
        CancellableRead {
            inner: input,
            cancel,
        },
        reporter,
    ));
    let mut writer = BufWriter::new(output);

    let decoded = lzma_rs::lzma_decompress(&mut reader, &mut writer);
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    decoded.map_err(|e| Error::OperationFailed(format!("LZMA stream is invalid: {e}")))?;
    writer.flush()?;
    Ok(())
}

/// Fails reads once the token is cancelled
struct CancellableRead<'a, R> {
    inner: R,
    cancel: &'a CancellationToken,
}

impl<R: Read> Read for CancellableRead<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(std::io::Error::other("cancelled"));
        }
        self.inner.read(buf)
    }
}
