//! Locating the helper executable

use crate::error::{Error, Result};
use crate::process::ToolCommand;
use std::path::{Path, PathBuf};

/// Base name of the helper artifact
pub const HELPER_NAME: &str = "workshop-helper";

fn candidates() -> [String; 3] {
    if cfg!(windows) {
        [
            format!("{HELPER_NAME}.exe"),
            format!("{HELPER_NAME}.dll"),
            HELPER_NAME.to_string(),
        ]
    } else {
        [
            HELPER_NAME.to_string(),
            format!("{HELPER_NAME}.dll"),
            format!("{HELPER_NAME}.exe"),
        ]
    }
}

/// Resolve the helper from an override (file or directory), then the running binary's directory
pub fn resolve_helper(override_path: Option<&Path>) -> Result<ToolCommand> {
    let base_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));

    let found = override_path
        .and_then(find_in)
        .or_else(|| base_dir.as_deref().and_then(find_in))
        .ok_or_else(|| {
            Error::ToolNotFound(format!(
                "{HELPER_NAME} not found; place it next to the executable or configure tools.helper_path"
            ))
        })?;

    Ok(command_for(found))
}

fn find_in(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if !path.is_dir() {
        return None;
    }
    candidates()
        .iter()
        .map(|name| path.join(name))
        .find(|candidate| candidate.is_file())
}

/// Map an artifact to how it is launched
fn command_for(artifact: PathBuf) -> ToolCommand {
    let extension = artifact
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("dll") => ToolCommand::interpreted("dotnet", &artifact),
        Some("py") => ToolCommand::interpreted("python3", &artifact),
        Some("sh") => ToolCommand::interpreted("sh", &artifact),
        _ => ToolCommand::direct(artifact),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn override_file_is_used_directly() {
        let temp_dir = TempDir::new().unwrap();
        let helper = temp_dir.path().join("custom-helper");
        fs::write(&helper, "").unwrap();

        let command = resolve_helper(Some(&helper)).unwrap();
        assert_eq!(command, ToolCommand::direct(helper));
    }

    #[test]
    fn override_directory_is_searched_for_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let dll = temp_dir.path().join("workshop-helper.dll");
        fs::write(&dll, "").unwrap();

        let command = resolve_helper(Some(temp_dir.path())).unwrap();
        assert_eq!(command.program, PathBuf::from("dotnet"));
        assert_eq!(command.artifact(), dll.as_path());
    }

    #[cfg(unix)]
    #[test]
    fn native_candidate_beats_assembly() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("workshop-helper.dll"), "").unwrap();
        let native = temp_dir.path().join("workshop-helper");
        fs::write(&native, "").unwrap();

        let command = resolve_helper(Some(temp_dir.path())).unwrap();
        assert_eq!(command, ToolCommand::direct(native));
    }

    #[test]
    fn scripts_run_through_their_interpreter() {
        let command = command_for(PathBuf::from("/opt/h/helper.SH"));
        assert_eq!(command.program, PathBuf::from("sh"));
        let command = command_for(PathBuf::from("/opt/h/helper.py"));
        assert_eq!(command.program, PathBuf::from("python3"));
    }

    #[test]
    fn empty_directory_override_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent");
        // The test binary's directory has no helper either.
        let err = resolve_helper(Some(&missing)).unwrap_err();
        assert_eq!(err.error_code(), "tool_not_found");
    }
}
