//! Container packers used to build upload payloads
//!
//! Packing is delegated to the game's own command-line tools (`gmad` for GMA,
//! `vpk` for VPK archives). A [`NoOpPacker`] stands in when a tool cannot be
//! found, so the publish pipeline only fails when packing is actually needed.

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use crate::progress::EventSink;
use crate::session::InteractiveSession;
use crate::types::VpkOptions;
use crate::utils::{find_executable, list_files_recursive, remove_path_best_effort};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Suffix of the directory file of a multi-file VPK set
pub const MULTI_FILE_DIRECTORY_SUFFIX: &str = "_dir";

/// Container produced by a packer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFormat {
    /// Garry's Mod addon archive
    Gma,
    /// Valve pak archive
    Vpk(VpkOptions),
}

impl ContainerFormat {
    /// Short name for messages
    pub fn name(&self) -> &'static str {
        match self {
            ContainerFormat::Gma => "GMA",
            ContainerFormat::Vpk(_) => "VPK",
        }
    }
}

/// Trait for building a container file from a folder
///
/// Implementations can wrap an external tool or report that packing is not
/// available.
#[async_trait]
pub trait ContainerPacker: Send + Sync {
    /// Pack `input_dir` into `output_path`
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The format is not handled by this packer
    /// - The tool cannot be launched or exits with a non-zero code
    /// - The tool exits cleanly but the expected output is missing
    /// - The operation is cancelled
    async fn pack(
        &self,
        input_dir: &Path,
        output_path: &Path,
        format: ContainerFormat,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

fn gmad_candidates() -> &'static [&'static str] {
    if cfg!(windows) {
        &["gmad.exe"]
    } else {
        &["gmad_linux", "gmad"]
    }
}

fn vpk_candidates() -> &'static [&'static str] {
    if cfg!(windows) {
        &["vpk.exe"]
    } else {
        &["vpk_linux32", "vpk"]
    }
}

async fn run_tool(
    program: &Path,
    label: &str,
    args: Vec<OsString>,
    working_dir: Option<&Path>,
    events: &EventSink,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut session = InteractiveSession::new(program).args(args).label(label);
    if let Some(dir) = working_dir {
        session = session.working_dir(dir);
    }
    let code = session.run(events, None, cancel).await?;
    if code != 0 {
        return Err(Error::OperationFailed(format!(
            "{label} failed with exit code {code}"
        )));
    }
    Ok(())
}

async fn require_output(label: &str, output_path: &Path) -> Result<()> {
    if tokio::fs::try_exists(output_path).await? {
        Ok(())
    } else {
        Err(Error::OperationFailed(format!(
            "{label} did not produce {}",
            output_path.display()
        )))
    }
}

/// Move a file, replacing the target, falling back to copy across devices
async fn move_file_overwrite(source: &Path, target: &Path) -> Result<()> {
    if source == target {
        return Ok(());
    }
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::try_exists(target).await? {
        tokio::fs::remove_file(target).await?;
    }
    if tokio::fs::rename(source, target).await.is_err() {
        tokio::fs::copy(source, target).await?;
        tokio::fs::remove_file(source).await?;
    }
    Ok(())
}

/// GMA packer driving `gmad create -folder DIR -out FILE`
#[derive(Clone, Debug)]
pub struct GmadPacker {
    binary_path: PathBuf,
}

impl GmadPacker {
    /// Create a packer with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Locate gmad from the configured override, then PATH
    pub fn from_config(tools: &ToolsConfig) -> Option<Self> {
        find_executable(tools.gmad_path.as_deref(), gmad_candidates(), tools.search_path)
            .map(Self::new)
    }
}

#[async_trait]
impl ContainerPacker for GmadPacker {
    async fn pack(
        &self,
        input_dir: &Path,
        output_path: &Path,
        format: ContainerFormat,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if format != ContainerFormat::Gma {
            return Err(Error::NotSupported(format!(
                "gmad cannot produce {} archives",
                format.name()
            )));
        }

        tracing::info!(input = ?input_dir, output = ?output_path, "packing GMA");
        let args: Vec<OsString> = vec![
            "create".into(),
            "-folder".into(),
            input_dir.as_os_str().to_os_string(),
            "-out".into(),
            output_path.as_os_str().to_os_string(),
        ];
        run_tool(&self.binary_path, "gmad", args, None, events, cancel).await?;
        require_output("gmad", output_path).await
    }

    fn name(&self) -> &'static str {
        "cli-gmad"
    }
}

/// VPK packer driving Valve's `vpk` tool
///
/// The tool names its output after the input folder (single file) or after a
/// prefix (multi-file), so results are moved to the requested path afterward.
#[derive(Clone, Debug)]
pub struct VpkToolPacker {
    binary_path: PathBuf,
}

impl VpkToolPacker {
    /// Create a packer with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Locate the vpk tool from the configured override, then PATH
    pub fn from_config(tools: &ToolsConfig) -> Option<Self> {
        find_executable(tools.vpk_path.as_deref(), vpk_candidates(), tools.search_path)
            .map(Self::new)
    }

    async fn pack_single(
        &self,
        input_dir: &Path,
        output_path: &Path,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (parent, folder_name) = split_input(input_dir)?;
        run_tool(
            &self.binary_path,
            "vpk",
            vec![folder_name.clone()],
            Some(&parent),
            events,
            cancel,
        )
        .await?;

        let mut produced = folder_name;
        produced.push(".vpk");
        let produced = parent.join(produced);
        require_output("vpk", &produced).await?;
        move_file_overwrite(&produced, output_path).await
    }

    async fn pack_multi(
        &self,
        input_dir: &Path,
        output_path: &Path,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let prefix = multi_file_prefix(output_path)?;
        let (parent, _) = split_input(input_dir)?;
        let list_name = format!("workshop-dl-vpk-filelist-{}.txt", uuid::Uuid::new_v4().simple());
        let list_path = parent.join(&list_name);

        let result = async {
            write_file_list(input_dir, &list_path).await?;
            let args: Vec<OsString> = vec![
                "-M".into(),
                "a".into(),
                prefix.as_str().into(),
                format!("@..{}{list_name}", std::path::MAIN_SEPARATOR).into(),
            ];
            run_tool(&self.binary_path, "vpk", args, Some(input_dir), events, cancel).await?;
            collect_multi_file_outputs(input_dir, &prefix, output_path).await
        }
        .await;

        remove_path_best_effort(&list_path).await;
        result
    }
}

#[async_trait]
impl ContainerPacker for VpkToolPacker {
    async fn pack(
        &self,
        input_dir: &Path,
        output_path: &Path,
        format: ContainerFormat,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ContainerFormat::Vpk(options) = format else {
            return Err(Error::NotSupported(format!(
                "the vpk tool cannot produce {} archives",
                format.name()
            )));
        };

        // The external tool picks the archive version itself.
        tracing::info!(
            input = ?input_dir,
            output = ?output_path,
            version = options.version,
            multi_file = options.multi_file,
            "packing VPK"
        );
        if options.multi_file {
            self.pack_multi(input_dir, output_path, events, cancel).await
        } else {
            self.pack_single(input_dir, output_path, events, cancel).await
        }
    }

    fn name(&self) -> &'static str {
        "cli-vpk"
    }
}

fn split_input(input_dir: &Path) -> Result<(PathBuf, OsString)> {
    let absolute = std::path::absolute(input_dir)?;
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => Ok((parent.to_path_buf(), name.to_os_string())),
        _ => Err(Error::invalid(format!(
            "cannot determine the folder name of {}",
            input_dir.display()
        ))),
    }
}

/// `pak01` for `.../pak01_dir.vpk`
fn multi_file_prefix(output_path: &Path) -> Result<String> {
    output_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.strip_suffix(MULTI_FILE_DIRECTORY_SUFFIX))
        .filter(|prefix| !prefix.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::invalid(format!(
                "multi-file VPK output must end with \"{MULTI_FILE_DIRECTORY_SUFFIX}.vpk\": {}",
                output_path.display()
            ))
        })
}

/// Relative paths of every file below `input_dir`, one per line
async fn write_file_list(input_dir: &Path, list_path: &Path) -> Result<()> {
    let mut text = String::new();
    for file in list_files_recursive(input_dir).await? {
        if let Ok(relative) = file.strip_prefix(input_dir) {
            text.push_str(&relative.to_string_lossy());
            text.push('\n');
        }
    }
    tokio::fs::write(list_path, text).await?;
    Ok(())
}

/// Whether `name` is `<prefix>_NNN.vpk` (the `_dir` file included)
fn is_multi_file_part(name: &str, prefix: &str) -> bool {
    let Some(stem) = name
        .strip_suffix(".vpk")
        .and_then(|rest| rest.strip_prefix(prefix))
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };
    stem == &MULTI_FILE_DIRECTORY_SUFFIX[1..]
        || (stem.len() == 3 && stem.bytes().all(|b| b.is_ascii_digit()))
}

async fn collect_multi_file_outputs(input_dir: &Path, prefix: &str, output_path: &Path) -> Result<()> {
    let output_dir = output_path.parent().unwrap_or(Path::new("."));
    let mut moved_any = false;

    let mut read_dir = tokio::fs::read_dir(input_dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !entry.file_type().await?.is_file() || !is_multi_file_part(name, prefix) {
            continue;
        }
        move_file_overwrite(&entry.path(), &output_dir.join(name)).await?;
        moved_any = true;
    }

    if !moved_any {
        return Err(Error::OperationFailed(
            "vpk did not produce any multi-file outputs".into(),
        ));
    }
    require_output("vpk", output_path).await
}

/// Stand-in used when a packer binary is unavailable
///
/// Every call fails with [`Error::NotSupported`] naming the missing tool.
#[derive(Clone, Copy, Debug)]
pub struct NoOpPacker {
    tool: &'static str,
}

impl NoOpPacker {
    /// A stand-in for `tool`
    pub fn new(tool: &'static str) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl ContainerPacker for NoOpPacker {
    async fn pack(
        &self,
        _input_dir: &Path,
        _output_path: &Path,
        format: ContainerFormat,
        _events: &EventSink,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Err(Error::NotSupported(format!(
            "{} packing requires {}, which was not found",
            format.name(),
            self.tool
        )))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
