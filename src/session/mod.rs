//! Interactive subprocess session
//!
//! Drives a credential-capable command-line tool (SteamCMD). Both output
//! streams are pumped concurrently; every non-blank line is published as
//! [`Event::Output`](crate::Event::Output), and the raw text also feeds a
//! rolling buffer that is scanned for password and one-time-code prompts.
//! Detected prompts are forwarded to the operator through a
//! [`PromptResolver`] and the answer is written back to the child's stdin.
//!
//! A run is complete only when both pumps and the exit wait have finished.
//! Cancellation, prompt exhaustion or any pump failure kills the child's
//! whole process tree.

mod prompt;

pub use prompt::{Prompt, PromptKind, PromptLimits, PromptRequest, PromptResolver, prompt_channel};

use crate::error::{Error, Result};
use crate::process::{LineSplitter, ToolCommand, kill_tree, piped_command, spawn};
use crate::progress::EventSink;
use prompt::PromptDetector;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

/// Raw read size per chunk
const CHUNK_SIZE: usize = 4096;

/// One interactive tool invocation
#[derive(Clone, Debug)]
pub struct InteractiveSession {
    tool: ToolCommand,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    limits: PromptLimits,
    label: String,
}

impl InteractiveSession {
    /// Prepare a session for `program` with no arguments
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let tool = ToolCommand::direct(program);
        let label = tool
            .program
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tool".to_string());
        Self {
            tool,
            args: Vec::new(),
            working_dir: None,
            limits: PromptLimits::default(),
            label,
        }
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the child in `dir`
    pub fn working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Override prompt bounds
    pub fn limits(mut self, limits: PromptLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Name used as prefix of acknowledgement lines (default: the program's file stem)
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Run the tool to completion and return its exit code
    ///
    /// `prompts` may be `None` for unattended runs; prompts are then not
    /// detected at all. A child terminated by a signal reports `-1`.
    pub async fn run(
        &self,
        events: &EventSink,
        prompts: Option<&PromptResolver>,
        cancel: &CancellationToken,
    ) -> Result<i32> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let cmd = piped_command(&self.tool, &self.args, self.working_dir.as_deref(), true);
        let mut child = spawn(cmd, &self.tool.program)?;
        tracing::debug!(program = ?self.tool.program, pid = child.id(), "interactive session started");

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            kill_tree(&mut child).await;
            return Err(Error::OperationFailed(format!(
                "{} output streams were not captured",
                self.label
            )));
        };

        let detector = PromptDetector::new(
            child.stdin.take(),
            prompts.cloned(),
            events.clone(),
            self.limits,
            self.label.clone(),
        );

        let outcome = tokio::select! {
            joined = async {
                tokio::try_join!(
                    pump(stdout, &detector, events, cancel),
                    pump(stderr, &detector, events, cancel),
                    async { child.wait().await.map_err(Error::from) },
                )
            } => joined.map(|(_, _, status)| status),
            _ = cancel.cancelled() => Err(Error::Cancelled),
        };

        match outcome {
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                tracing::debug!(program = ?self.tool.program, code, "interactive session exited");
                Ok(code)
            }
            Err(e) => {
                tracing::debug!(program = ?self.tool.program, error = %e, "terminating interactive session");
                kill_tree(&mut child).await;
                Err(e)
            }
        }
    }
}

/// Read one stream to EOF, publishing lines and checking for prompts after each chunk
async fn pump<R>(
    mut reader: R,
    detector: &PromptDetector,
    events: &EventSink,
    cancel: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut splitter = LineSplitter::default();

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        let chunk = &buffer[..read];
        detector.append(&String::from_utf8_lossy(chunk));

        for line in splitter.push(chunk) {
            if !line.trim().is_empty() {
                events.line(line);
            }
        }

        detector.check(cancel).await?;
    }

    if let Some(last) = splitter.finish()
        && !last.trim().is_empty()
    {
        events.line(last);
    }
    Ok(())
}
