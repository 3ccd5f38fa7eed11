//! SteamCMD invocation on top of the interactive session driver

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use crate::progress::EventSink;
use crate::session::{InteractiveSession, PromptLimits, PromptResolver};
use crate::types::{AppId, PublishedFileId};
use crate::utils::find_executable;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Login used for downloads when no account is configured
pub const ANONYMOUS_LOGIN: &str = "anonymous";

/// Label prefixed to prompt acknowledgements
const LABEL: &str = "SteamCMD";

fn candidates() -> &'static [&'static str] {
    if cfg!(windows) {
        &["steamcmd.exe", "steamcmd"]
    } else {
        &["steamcmd", "steamcmd.sh"]
    }
}

/// Locate SteamCMD from the configured override, then PATH
pub fn locate_steamcmd(tools: &ToolsConfig) -> Option<PathBuf> {
    find_executable(tools.steamcmd_path.as_deref(), candidates(), tools.search_path)
}

/// Arguments for `workshop_download_item`
pub fn download_args(
    install_dir: &Path,
    login: &str,
    app_id: AppId,
    published_file_id: PublishedFileId,
) -> Vec<OsString> {
    vec![
        "+force_install_dir".into(),
        install_dir.as_os_str().to_os_string(),
        "+login".into(),
        login.into(),
        "+workshop_download_item".into(),
        app_id.to_string().into(),
        published_file_id.to_string().into(),
        "validate".into(),
        "+quit".into(),
    ]
}

/// Arguments for `workshop_build_item`
pub fn build_item_args(login: &str, vdf_path: &Path) -> Vec<OsString> {
    vec![
        "+login".into(),
        login.into(),
        "+workshop_build_item".into(),
        vdf_path.as_os_str().to_os_string(),
        "+quit".into(),
    ]
}

/// A located SteamCMD executable
#[derive(Clone, Debug)]
pub struct SteamCmd {
    path: PathBuf,
    limits: PromptLimits,
}

impl SteamCmd {
    /// Wrap an executable path
    pub fn new(path: impl Into<PathBuf>, limits: PromptLimits) -> Self {
        Self {
            path: path.into(),
            limits,
        }
    }

    /// The executable
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Download one item into `install_dir`
    #[allow(clippy::too_many_arguments)]
    pub async fn download_item(
        &self,
        install_dir: &Path,
        username: Option<&str>,
        app_id: AppId,
        published_file_id: PublishedFileId,
        events: &EventSink,
        prompts: Option<&PromptResolver>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let login = username
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(ANONYMOUS_LOGIN);
        tracing::info!(%app_id, %published_file_id, install_dir = ?install_dir, "downloading via SteamCMD");
        let args = download_args(install_dir, login, app_id, published_file_id);
        self.run(args, events, prompts, cancel).await
    }

    /// Upload the item described by the build manifest at `vdf_path`
    pub async fn build_item(
        &self,
        username: &str,
        vdf_path: &Path,
        events: &EventSink,
        prompts: Option<&PromptResolver>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::info!(vdf = ?vdf_path, "publishing via SteamCMD");
        self.run(build_item_args(username, vdf_path), events, prompts, cancel)
            .await
    }

    async fn run(
        &self,
        args: Vec<OsString>,
        events: &EventSink,
        prompts: Option<&PromptResolver>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut session = InteractiveSession::new(&self.path)
            .args(args)
            .limits(self.limits)
            .label(LABEL);
        if let Some(dir) = self.path.parent().filter(|dir| dir.is_dir()) {
            session = session.working_dir(dir);
        }

        let code = session.run(events, prompts, cancel).await?;
        if code != 0 {
            return Err(Error::OperationFailed(format!(
                "SteamCMD failed with exit code {code}"
            )));
        }
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn download_invocation_pattern() {
        let args = download_args(
            Path::new("/scratch/steamcmd"),
            "anonymous",
            AppId(4000),
            PublishedFileId(123),
        );
        assert_eq!(
            strings(&args),
            [
                "+force_install_dir",
                "/scratch/steamcmd",
                "+login",
                "anonymous",
                "+workshop_download_item",
                "4000",
                "123",
                "validate",
                "+quit"
            ]
        );
    }

    #[test]
    fn build_item_invocation_pattern() {
        let args = build_item_args("builder", Path::new("/tmp/item.vdf"));
        assert_eq!(
            strings(&args),
            ["+login", "builder", "+workshop_build_item", "/tmp/item.vdf", "+quit"]
        );
    }

    #[test]
    fn override_directory_is_searched() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let script = temp_dir.path().join(candidates()[1]);
        std::fs::write(&script, "").unwrap();

        let tools = ToolsConfig {
            steamcmd_path: Some(temp_dir.path().to_path_buf()),
            search_path: false,
            ..Default::default()
        };
        assert_eq!(locate_steamcmd(&tools), Some(script));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_names_the_code() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let script = temp_dir.path().join("steamcmd.sh");
        std::fs::write(&script, "#!/bin/sh\necho \"args: $*\"\nexit 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let steamcmd = SteamCmd::new(&script, PromptLimits::default());
        let err = steamcmd
            .download_item(
                temp_dir.path(),
                None,
                AppId(4000),
                PublishedFileId(9),
                &EventSink::detached(),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "operation failed: SteamCMD failed with exit code 5");
    }
}
