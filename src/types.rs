//! Core types for workshop-dl

use crate::config::NamingOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of a content scope (a Steam app id)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub u32);

impl AppId {
    /// Garry's Mod, whose payloads get container-specific handling
    pub const GARRYS_MOD: AppId = AppId(4000);

    /// Whether the id is unset
    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for AppId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AppId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Identifier of one published workshop item
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishedFileId(pub u64);

impl PublishedFileId {
    /// Whether the id is unset (new item)
    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for PublishedFileId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for PublishedFileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PublishedFileId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Events emitted while an operation runs
///
/// Subscribe via [`Workshop::subscribe`](crate::Workshop::subscribe). Child
/// process output arrives as [`Event::Output`], one event per non-blank line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// One line of tool output or an advisory message
    Output {
        /// The line, without its terminator
        line: String,
    },

    /// Byte-granular progress of the current operation
    Progress {
        /// Operation label (e.g. "Workshop Download")
        operation: String,
        /// Bytes completed so far
        completed_bytes: u64,
        /// Total bytes, 0 when unknown
        total_bytes: u64,
        /// Item currently being processed
        #[serde(skip_serializing_if = "Option::is_none")]
        current_item: Option<String>,
        /// Status message
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// Published file metadata from the details endpoint
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDetails {
    /// Item id
    pub published_file_id: PublishedFileId,
    /// Item title
    pub title: Option<String>,
    /// Last update time
    pub updated_at: Option<DateTime<Utc>>,
    /// Owning scope
    pub consumer_app_id: Option<AppId>,
    /// Direct download URL (legacy single-file items)
    pub file_url: Option<String>,
    /// Original file name
    pub file_name: Option<String>,
    /// File size in bytes
    pub file_size: Option<u64>,
}

/// Whether a transfer produced a single file or a folder
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// A single file
    File,
    /// A directory tree
    Directory,
}

/// Outcome of one successful acquisition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    /// Item id
    pub published_file_id: PublishedFileId,
    /// Scope that owned the content
    pub app_id: AppId,
    /// Where the content came from (cache path, backend folder or URL)
    pub source: String,
    /// Final output location
    pub output_path: PathBuf,
    /// Final output kind, after post-processing
    pub output_kind: OutputKind,
    /// Metadata, when it was fetched
    pub details: Option<ItemDetails>,
}

/// Workshop item visibility
///
/// The discriminants are the numeric values used in workshop build manifests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Visible to everyone
    #[default]
    Public = 0,
    /// Visible to friends only
    FriendsOnly = 1,
    /// Visible to the owner only
    Private = 2,
    /// Reachable by link but not listed
    Unlisted = 3,
}

impl Visibility {
    /// Value passed to the helper's `--visibility` flag
    pub fn cli_value(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::FriendsOnly => "friends",
            Visibility::Private => "private",
            Visibility::Unlisted => "unlisted",
        }
    }

    /// Loose parse used for helper output (`"k_ERemoteStoragePublishedFileVisibilityPublic"` etc.)
    pub fn parse_loose(value: &str) -> Option<Self> {
        let lower = value.trim().to_lowercase();
        if lower.is_empty() {
            None
        } else if lower.contains("public") {
            Some(Visibility::Public)
        } else if lower.contains("friends") {
            Some(Visibility::FriendsOnly)
        } else if lower.contains("unlisted") {
            Some(Visibility::Unlisted)
        } else if lower.contains("private") {
            Some(Visibility::Private)
        } else {
            None
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "friends" | "friendsonly" => Ok(Visibility::FriendsOnly),
            "private" => Ok(Visibility::Private),
            "unlisted" => Ok(Visibility::Unlisted),
            other => Err(format!(
                "invalid visibility {other:?} (expected public|friends|private|unlisted)"
            )),
        }
    }
}

/// Which backend performs a publish
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishBackend {
    /// Interactive SteamCMD session with a build manifest
    #[default]
    SteamCmd,
    /// Structured helper process
    Helper,
}

/// Parameters for one acquisition
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// Raw id, workshop URL or text containing the id
    pub id_or_link: String,
    /// Directory the result is written into
    pub output_dir: PathBuf,
    /// Scope to search first; unset means discover from metadata
    pub app_id: AppId,
    /// Apply payload selection and post-processing
    pub convert_payload: bool,
    /// Fetch item metadata even when the cache satisfies the request
    pub fetch_details: bool,
    /// Replace an existing destination instead of failing
    pub overwrite: bool,
    /// Output naming policy
    pub naming: NamingOptions,
    /// Try the structured helper on cache miss
    pub use_helper: bool,
    /// Try SteamCMD on cache miss
    pub use_steamcmd: bool,
    /// Login name for SteamCMD (default: anonymous)
    pub steamcmd_username: Option<String>,
}

impl DownloadRequest {
    /// A request with default policy for the given id and output directory
    pub fn new(id_or_link: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            id_or_link: id_or_link.into(),
            output_dir: output_dir.into(),
            app_id: AppId::GARRYS_MOD,
            convert_payload: true,
            fetch_details: false,
            overwrite: false,
            naming: NamingOptions::default(),
            use_helper: false,
            use_steamcmd: false,
            steamcmd_username: None,
        }
    }
}

/// Container format produced when packing a payload before upload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpkOptions {
    /// VPK version (1 or 2)
    pub version: u32,
    /// Include MD5 sections (forces version 2)
    pub include_md5_sections: bool,
    /// Split into `_dir.vpk` plus numbered chunks
    pub multi_file: bool,
}

impl Default for VpkOptions {
    fn default() -> Self {
        Self {
            version: 1,
            include_md5_sections: false,
            multi_file: false,
        }
    }
}

/// Parameters for one publish
#[derive(Clone, Debug)]
pub struct PublishRequest {
    /// Target scope
    pub app_id: AppId,
    /// Content folder or single content file
    pub content_path: PathBuf,
    /// Preview image
    pub preview_file: PathBuf,
    /// Item title
    pub title: String,
    /// Item description
    pub description: String,
    /// Change note for this revision
    pub change_note: String,
    /// Existing item to update; unset creates a new item
    pub published_file_id: PublishedFileId,
    /// Item visibility
    pub visibility: Visibility,
    /// Workshop tags
    pub tags: Vec<String>,
    /// Addon type written into a synthesized manifest
    pub content_type: Option<String>,
    /// Addon tags written into a synthesized manifest (falls back to `tags`)
    pub content_tags: Option<Vec<String>>,
    /// Backend that performs the upload
    pub backend: PublishBackend,
    /// Where to write the build manifest (SteamCMD backend)
    pub vdf_path: Option<PathBuf>,
    /// SteamCMD login name (required for the SteamCMD backend)
    pub steamcmd_username: Option<String>,
    /// Copy the folder while excluding VCS/build/cache names
    pub stage_clean_payload: bool,
    /// Pack the folder into a VPK before upload
    pub pack_vpk: Option<VpkOptions>,
}

impl PublishRequest {
    /// A request with defaults for the optional fields
    pub fn new(
        app_id: AppId,
        content_path: impl Into<PathBuf>,
        preview_file: impl Into<PathBuf>,
        title: impl Into<String>,
        description: impl Into<String>,
        change_note: impl Into<String>,
    ) -> Self {
        Self {
            app_id,
            content_path: content_path.into(),
            preview_file: preview_file.into(),
            title: title.into(),
            description: description.into(),
            change_note: change_note.into(),
            published_file_id: PublishedFileId(0),
            visibility: Visibility::Public,
            tags: Vec::new(),
            content_type: None,
            content_tags: None,
            backend: PublishBackend::SteamCmd,
            vdf_path: None,
            steamcmd_username: None,
            stage_clean_payload: false,
            pack_vpk: None,
        }
    }
}

/// Outcome of a publish
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResult {
    /// Scope the item belongs to
    pub app_id: AppId,
    /// Created or updated item
    pub published_file_id: PublishedFileId,
    /// Build manifest used (SteamCMD backend only)
    pub vdf_path: Option<PathBuf>,
}

/// One item in a published-items listing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishedItem {
    /// Item id
    pub published_file_id: PublishedFileId,
    /// Title
    pub title: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time
    pub updated_at: Option<DateTime<Utc>>,
    /// Visibility
    pub visibility: Option<Visibility>,
    /// Tags
    pub tags: Vec<String>,
}

/// One page of the caller's published items
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    /// Scope
    pub app_id: AppId,
    /// Page number (1-based)
    pub page: u32,
    /// Items on this page
    pub returned: u32,
    /// Items across all pages
    pub total_matching: u32,
    /// The items
    pub items: Vec<PublishedItem>,
}

/// Cloud storage quota for a scope
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaResult {
    /// Scope
    pub app_id: AppId,
    /// Total bytes
    pub total_bytes: u64,
    /// Available bytes
    pub available_bytes: u64,
    /// Used bytes
    pub used_bytes: u64,
}
