//! Structured helper protocol client
//!
//! The helper is a cooperating executable that speaks a JSON line protocol on
//! stdout (see [`protocol`]). Each call to [`HelperClient::invoke`] runs one
//! helper process for one operation and correlates its events into exactly one
//! typed result:
//!
//! - plain text and `log` events are forwarded as output lines
//! - the first `error` or expected `<op>_result` event resolves the result
//! - any other typed event goes to the operation's progress handler
//!
//! A clean exit without a terminal event is a protocol violation; a non-zero
//! exit without one is an operation failure.

mod ops;
pub mod protocol;
mod resolve;

pub use ops::HelperDownload;
pub use protocol::{HelperEvent, ResultCell};
pub use resolve::{HELPER_NAME, resolve_helper};

use crate::error::{Error, Result};
use crate::process::{LineSplitter, ToolCommand, kill_tree, piped_command, spawn};
use crate::progress::EventSink;
use protocol::{ERROR_EVENT, LOG_EVENT};
use serde_json::{Map, Value};
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Client for the structured helper process
///
/// Holds the helper location; resolution runs once and is cached for the
/// client's lifetime.
#[derive(Debug)]
pub struct HelperClient {
    override_path: Option<PathBuf>,
    resolved: Mutex<Option<ToolCommand>>,
    events: EventSink,
}

impl HelperClient {
    /// A client that resolves the helper from `override_path`, then next to the running binary
    pub fn new(override_path: Option<PathBuf>, events: EventSink) -> Self {
        Self {
            override_path,
            resolved: Mutex::new(None),
            events,
        }
    }

    /// A client bound to an explicit command
    pub fn with_command(command: ToolCommand, events: EventSink) -> Self {
        Self {
            override_path: None,
            resolved: Mutex::new(Some(command)),
            events,
        }
    }

    /// The command used to launch the helper
    pub fn command(&self) -> Result<ToolCommand> {
        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(command) = resolved.as_ref() {
            return Ok(command.clone());
        }
        let command = resolve_helper(self.override_path.as_deref())?;
        tracing::debug!(program = ?command.program, artifact = ?command.artifact(), "resolved helper");
        *resolved = Some(command.clone());
        Ok(command)
    }

    /// Run one helper operation and return its parsed terminal result
    ///
    /// `parse` turns the `expected_result` record into `T`; an `Err` from it
    /// resolves the operation with that error. `on_event` sees every other
    /// typed event and cannot affect resolution.
    pub async fn invoke<T, P, H>(
        &self,
        args: Vec<OsString>,
        expected_result: &str,
        parse: P,
        on_event: H,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        T: Send + 'static,
        P: FnMut(&Map<String, Value>) -> Result<T> + Send + 'static,
        H: FnMut(&str, &Map<String, Value>) + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let command = self.command()?;
        self.events
            .line(format!("helper: using {}", command.artifact().display()));

        let cmd = piped_command(&command, &args, None, false);
        let mut child = spawn(cmd, &command.program)?;
        tracing::debug!(program = ?command.program, pid = child.id(), expected_result, "helper started");

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            kill_tree(&mut child).await;
            return Err(Error::OperationFailed(
                "helper output streams were not captured".into(),
            ));
        };

        let cell = Arc::new(ResultCell::default());
        let readers = [
            tokio::spawn(read_stdout(
                stdout,
                self.events.clone(),
                cell.clone(),
                expected_result.to_string(),
                parse,
                on_event,
            )),
            tokio::spawn(read_stderr(stderr, self.events.clone())),
        ];

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                tracing::debug!("cancelling helper");
                kill_tree(&mut child).await;
                abort_all(&readers);
                return Err(Error::Cancelled);
            }
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                kill_tree(&mut child).await;
                abort_all(&readers);
                return Err(e.into());
            }
        };

        if let Some(result) = cell.take() {
            // Readers keep forwarding trailing output on their own.
            return result;
        }

        // No result yet: let the readers drain what the helper wrote before exiting.
        tokio::select! {
            _ = join_all(readers) => {}
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        }

        if let Some(result) = cell.take() {
            return result;
        }

        match status.code() {
            Some(0) => Err(Error::ProtocolViolation(
                "helper process returned no result".into(),
            )),
            Some(code) => Err(Error::OperationFailed(format!(
                "helper process failed with exit code {code}"
            ))),
            None => Err(Error::OperationFailed(
                "helper process was terminated by a signal".into(),
            )),
        }
    }
}

fn abort_all(readers: &[JoinHandle<()>]) {
    for reader in readers {
        reader.abort();
    }
}

async fn join_all(readers: [JoinHandle<()>; 2]) {
    for reader in readers {
        if let Err(e) = reader.await {
            tracing::debug!(error = %e, "helper reader ended abnormally");
        }
    }
}

/// Split a stream into lines, calling `handle` for each (including an unterminated tail)
async fn for_each_line<R, F>(mut reader: R, mut handle: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut buffer = vec![0u8; 8192];
    let mut splitter = LineSplitter::default();
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => splitter.push(&buffer[..n]).into_iter().for_each(&mut handle),
            Err(e) => {
                tracing::debug!(error = %e, "helper stream read failed");
                break;
            }
        }
    }
    if let Some(tail) = splitter.finish() {
        handle(tail);
    }
}

async fn read_stdout<R, T, P, H>(
    stdout: R,
    events: EventSink,
    cell: Arc<ResultCell<Result<T>>>,
    expected_result: String,
    mut parse: P,
    mut on_event: H,
) where
    R: AsyncRead + Unpin,
    P: FnMut(&Map<String, Value>) -> Result<T>,
    H: FnMut(&str, &Map<String, Value>),
{
    for_each_line(stdout, |line| {
        if line.trim().is_empty() {
            return;
        }
        let Some(event) = HelperEvent::parse(&line) else {
            events.line(line);
            return;
        };

        match event.kind.as_str() {
            LOG_EVENT => {
                if let Some(message) = event.message() {
                    events.line(message);
                }
            }
            ERROR_EVENT => {
                let message = event
                    .message()
                    .unwrap_or_else(|| "helper reported an error".to_string());
                cell.set(Err(Error::OperationFailed(message)));
            }
            kind if kind == expected_result => {
                if !cell.is_resolved() {
                    cell.set(parse(&event.payload));
                }
            }
            kind => on_event(kind, &event.payload),
        }
    })
    .await;
}

async fn read_stderr<R>(stderr: R, events: EventSink)
where
    R: AsyncRead + Unpin,
{
    for_each_line(stderr, |line| {
        if !line.trim().is_empty() {
            events.line(line);
        }
    })
    .await;
}
