//! Child process plumbing shared by the interactive session and the helper client
//!
//! Children are started in their own process group (unix) so that cancellation
//! can take down the whole descendant tree, not just the direct child.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};

/// A program plus the arguments that must precede the operation's own
///
/// Used when a tool is not natively executable and runs through an interpreter
/// (e.g. `dotnet helper.dll`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCommand {
    /// Executable to launch
    pub program: PathBuf,
    /// Arguments inserted before the operation's arguments
    pub leading_args: Vec<OsString>,
}

impl ToolCommand {
    /// A directly executable program
    pub fn direct(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// A script or assembly run by `interpreter`
    pub fn interpreted(interpreter: impl Into<PathBuf>, script: &Path) -> Self {
        Self {
            program: interpreter.into(),
            leading_args: vec![script.as_os_str().to_os_string()],
        }
    }

    /// The artifact this command ultimately runs (the script for interpreted tools)
    pub fn artifact(&self) -> &Path {
        self.leading_args
            .first()
            .map(Path::new)
            .unwrap_or(&self.program)
    }
}

/// Build a command with all three standard streams piped
///
/// `stdin_piped` is false for tools that never read input; their stdin is null.
pub(crate) fn piped_command<I, S>(
    tool: &ToolCommand,
    args: I,
    working_dir: Option<&Path>,
    stdin_piped: bool,
) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut cmd = Command::new(&tool.program);
    cmd.args(&tool.leading_args)
        .args(args)
        .stdin(if stdin_piped {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = working_dir.filter(|d| !d.as_os_str().is_empty() && d.is_dir()) {
        cmd.current_dir(dir);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(windows)]
    {
        // CREATE_NO_WINDOW
        cmd.creation_flags(0x0800_0000);
    }

    cmd
}

/// Spawn `cmd`, mapping failure to [`Error::Launch`]
pub(crate) fn spawn(mut cmd: Command, program: &Path) -> Result<Child> {
    cmd.spawn().map_err(|source| Error::Launch {
        program: program.to_path_buf(),
        source,
    })
}

/// Forcibly terminate `child` and every process in its tree
///
/// Errors are logged; the child may already have exited.
pub(crate) async fn kill_tree(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };

    #[cfg(unix)]
    {
        // The child leads its own process group (see `piped_command`).
        // SAFETY: killpg only sends a signal; an invalid group yields ESRCH.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
        }
    }

    #[cfg(windows)]
    {
        let status = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = status {
            tracing::debug!(pid, error = %e, "taskkill failed");
        }
    }

    if let Err(e) = child.kill().await {
        tracing::debug!(pid, error = %e, "kill after tree termination failed");
    }
}

/// Incremental splitter turning raw output chunks into text lines
///
/// Lines end at `\n`; a trailing `\r` is dropped. Bytes are decoded lossily so
/// tools with a non-UTF-8 console encoding never break the reader.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Append a chunk, returning every line it completed
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                lines.push(Self::decode(&self.pending));
                self.pending.clear();
            } else {
                self.pending.push(byte);
            }
        }
        lines
    }

    /// Flush the unterminated tail, if any
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = Self::decode(&self.pending);
        self.pending.clear();
        Some(line)
    }

    fn decode(bytes: &[u8]) -> String {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}
