//! Configuration types for workshop-dl

use crate::error::{Error, Result};
use crate::types::AppId;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Output naming policy for downloaded content
///
/// See [`build_output_base_name`](crate::naming::build_output_base_name).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingOptions {
    /// Prefix the sanitized item title (default: false)
    #[serde(default)]
    pub include_title: bool,

    /// Include the numeric item id (default: true)
    #[serde(default = "default_true")]
    pub include_id: bool,

    /// Append the item's last update time as `yyyyMMdd_HHmmss` (default: false)
    #[serde(default)]
    pub append_updated_timestamp: bool,

    /// Use `_` as separator and in place of whitespace (default: true)
    #[serde(default = "default_true")]
    pub replace_spaces_with_underscores: bool,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            include_title: false,
            include_id: true,
            append_updated_timestamp: false,
            replace_spaces_with_underscores: true,
        }
    }
}

/// External tool locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// SteamCMD executable or the directory containing it (None = search PATH)
    #[serde(default)]
    pub steamcmd_path: Option<PathBuf>,

    /// Directory SteamCMD installs downloaded content into (default: `<tmp>/workshop-dl/steamcmd`)
    #[serde(default)]
    pub steamcmd_install_dir: Option<PathBuf>,

    /// Default SteamCMD login name (None = anonymous for downloads)
    #[serde(default)]
    pub steamcmd_username: Option<String>,

    /// Helper executable or the directory containing it (None = next to the running binary)
    #[serde(default)]
    pub helper_path: Option<PathBuf>,

    /// Search PATH for tools that have no explicit path (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Path to the GMA packer (gmad)
    #[serde(default)]
    pub gmad_path: Option<PathBuf>,

    /// Path to the VPK packer (vpk)
    #[serde(default)]
    pub vpk_path: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            steamcmd_path: None,
            steamcmd_install_dir: None,
            steamcmd_username: None,
            helper_path: None,
            search_path: true,
            gmad_path: None,
            vpk_path: None,
        }
    }
}

/// Acquisition behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Steam library roots searched for cached workshop content
    #[serde(default)]
    pub library_roots: Vec<PathBuf>,

    /// Scope used when a request does not name one (default: 4000)
    #[serde(default = "default_app_id")]
    pub default_app_id: AppId,

    /// Apply payload selection and post-processing (default: true)
    #[serde(default = "default_true")]
    pub convert_payloads: bool,

    /// Replace existing output instead of failing (default: false)
    #[serde(default)]
    pub overwrite_existing: bool,

    /// Output naming policy
    #[serde(default)]
    pub naming: NamingOptions,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            library_roots: Vec::new(),
            default_app_id: default_app_id(),
            convert_payloads: true,
            overwrite_existing: false,
            naming: NamingOptions::default(),
        }
    }
}

/// Interactive prompt handling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Password solicitations allowed per session (default: 3)
    #[serde(default = "default_max_prompts")]
    pub max_password_prompts: u32,

    /// One-time-code solicitations allowed per session (default: 3)
    #[serde(default = "default_max_prompts")]
    pub max_guard_prompts: u32,

    /// Size of the rolling prompt-detection buffer in bytes (default: 16 KiB)
    #[serde(default = "default_detection_buffer_bytes")]
    pub detection_buffer_bytes: usize,

    /// How long to wait for an operator response (None = wait indefinitely)
    #[serde(default, with = "optional_duration_serde")]
    pub response_timeout: Option<Duration>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_password_prompts: default_max_prompts(),
            max_guard_prompts: default_max_prompts(),
            detection_buffer_bytes: default_detection_buffer_bytes(),
            response_timeout: None,
        }
    }
}

/// HTTP settings for metadata lookup and direct downloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Published file details endpoint
    #[serde(default = "default_details_endpoint")]
    pub details_endpoint: String,

    /// Timeout for the details request (default: 10 seconds)
    #[serde(default = "default_details_timeout", with = "duration_serde")]
    pub details_timeout: Duration,

    /// Timeout for a direct download (default: 30 minutes)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            details_endpoint: default_details_endpoint(),
            details_timeout: default_details_timeout(),
            download_timeout: default_download_timeout(),
        }
    }
}

/// Publish pipeline settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Parent directory for staging scratch roots (default: `<tmp>/workshop-dl/publish`)
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
        }
    }
}

/// Main configuration for [`Workshop`](crate::Workshop)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// External tool locations
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Acquisition behavior
    #[serde(default)]
    pub download: DownloadConfig,

    /// Prompt bounds and timeouts
    #[serde(default)]
    pub prompts: PromptConfig,

    /// HTTP settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Publish staging
    #[serde(default)]
    pub publish: PublishConfig,
}

impl Config {
    /// Reject settings that would make a session unusable
    pub fn validate(&self) -> Result<()> {
        if self.prompts.max_password_prompts == 0 {
            return Err(Error::Config {
                message: "max_password_prompts must be at least 1".into(),
                key: Some("prompts.max_password_prompts".into()),
            });
        }
        if self.prompts.max_guard_prompts == 0 {
            return Err(Error::Config {
                message: "max_guard_prompts must be at least 1".into(),
                key: Some("prompts.max_guard_prompts".into()),
            });
        }
        if self.prompts.detection_buffer_bytes == 0 {
            return Err(Error::Config {
                message: "detection_buffer_bytes must be greater than 0".into(),
                key: Some("prompts.detection_buffer_bytes".into()),
            });
        }
        if url::Url::parse(&self.network.details_endpoint).is_err() {
            return Err(Error::Config {
                message: format!(
                    "details_endpoint is not a valid URL: {}",
                    self.network.details_endpoint
                ),
                key: Some("network.details_endpoint".into()),
            });
        }
        Ok(())
    }

    /// Install directory for SteamCMD downloads
    pub fn steamcmd_install_dir(&self) -> PathBuf {
        self.tools
            .steamcmd_install_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("workshop-dl").join("steamcmd"))
    }
}

fn default_true() -> bool {
    true
}

fn default_app_id() -> AppId {
    AppId::GARRYS_MOD
}

fn default_max_prompts() -> u32 {
    3
}

fn default_detection_buffer_bytes() -> usize {
    16 * 1024
}

fn default_details_endpoint() -> String {
    "https://api.steampowered.com/ISteamRemoteStorage/GetPublishedFileDetails/v1/".to_string()
}

fn default_details_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("workshop-dl").join("publish")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
