//! Prompt detection and the operator request/response channel

use crate::error::{Error, Result};
use crate::progress::EventSink;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

const PASSWORD_SIGNATURES: &[&str] = &["password"];

const ONE_TIME_CODE_SIGNATURES: &[&str] = &[
    "steam guard",
    "steamguard",
    "two-factor",
    "two factor",
    "authenticator",
];

/// Classification of a detected solicitation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PromptKind {
    /// Account password
    Password,
    /// Steam Guard / authenticator code
    OneTimeCode,
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptKind::Password => write!(f, "password"),
            PromptKind::OneTimeCode => write!(f, "one-time code"),
        }
    }
}

/// A solicitation detected in tool output
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt {
    /// What is being asked for
    pub kind: PromptKind,
    /// Text suitable for showing to the operator
    pub message: String,
}

impl Prompt {
    fn for_kind(kind: PromptKind) -> Self {
        let message = match kind {
            PromptKind::Password => "Steam password:",
            PromptKind::OneTimeCode => "Steam Guard code:",
        };
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

/// One pending prompt handed to the operator
///
/// Answer with [`respond`](Self::respond). Dropping the request, or responding
/// with `None`, abandons the prompt and cancels the session.
#[derive(Debug)]
pub struct PromptRequest {
    /// The detected prompt
    pub prompt: Prompt,
    respond: oneshot::Sender<Option<String>>,
}

impl PromptRequest {
    /// Deliver the operator's answer (`None` abandons the session)
    pub fn respond(self, response: Option<String>) {
        // The session may already be gone (cancelled); nothing to do then.
        self.respond.send(response).ok();
    }
}

/// Sending half of the prompt channel, passed to a session
#[derive(Clone, Debug)]
pub struct PromptResolver {
    tx: mpsc::Sender<PromptRequest>,
}

/// Create a prompt channel
///
/// The session sends one [`PromptRequest`] per detected prompt and waits for
/// its answer; at most one request is outstanding per session.
///
/// # Examples
///
/// ```no_run
/// use workshop_dl::session::prompt_channel;
///
/// # async fn demo() {
/// let (resolver, mut requests) = prompt_channel();
/// tokio::spawn(async move {
///     while let Some(request) = requests.recv().await {
///         println!("{}", request.prompt.message);
///         request.respond(Some("secret".to_string()));
///     }
/// });
/// # drop(resolver);
/// # }
/// ```
pub fn prompt_channel() -> (PromptResolver, mpsc::Receiver<PromptRequest>) {
    let (tx, rx) = mpsc::channel(1);
    (PromptResolver { tx }, rx)
}

impl PromptResolver {
    /// Ask the operator, honoring cancellation and an optional timeout
    async fn solicit(
        &self,
        prompt: Prompt,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let kind = prompt.kind;
        let (respond, answer) = oneshot::channel();
        let exchange = async {
            if self.tx.send(PromptRequest { prompt, respond }).await.is_err() {
                return None;
            }
            answer.await.ok().flatten()
        };

        let timed = async {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, exchange).await.map_err(|_| {
                    Error::OperationFailed(format!(
                        "no response to {kind} prompt within {}s",
                        limit.as_secs()
                    ))
                }),
                None => Ok(exchange.await),
            }
        };

        tokio::select! {
            result = timed => result,
            _ = cancel.cancelled() => Err(Error::Cancelled),
        }
    }
}

/// Per-session prompt bounds
#[derive(Clone, Copy, Debug)]
pub struct PromptLimits {
    /// Password solicitations allowed
    pub max_password_prompts: u32,
    /// One-time-code solicitations allowed
    pub max_guard_prompts: u32,
    /// Rolling detection buffer size in bytes
    pub detection_buffer_bytes: usize,
    /// Operator response timeout (None = wait indefinitely)
    pub response_timeout: Option<Duration>,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self::from(&crate::config::PromptConfig::default())
    }
}

impl From<&crate::config::PromptConfig> for PromptLimits {
    fn from(config: &crate::config::PromptConfig) -> Self {
        Self {
            max_password_prompts: config.max_password_prompts,
            max_guard_prompts: config.max_guard_prompts,
            detection_buffer_bytes: config.detection_buffer_bytes,
            response_timeout: config.response_timeout,
        }
    }
}

#[derive(Debug, Default)]
struct PromptCounts {
    password: u32,
    one_time_code: u32,
}

/// Scans a session's recent output and answers prompts on its stdin
///
/// The recent-text buffer, the stdin writer and the negotiation state each sit
/// behind their own lock.
pub(crate) struct PromptDetector {
    recent: Mutex<String>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    negotiation: tokio::sync::Mutex<PromptCounts>,
    resolver: Option<PromptResolver>,
    events: EventSink,
    limits: PromptLimits,
    label: String,
}

impl PromptDetector {
    pub(crate) fn new(
        stdin: Option<ChildStdin>,
        resolver: Option<PromptResolver>,
        events: EventSink,
        limits: PromptLimits,
        label: String,
    ) -> Self {
        Self {
            recent: Mutex::new(String::new()),
            stdin: tokio::sync::Mutex::new(stdin),
            negotiation: tokio::sync::Mutex::new(PromptCounts::default()),
            resolver,
            events,
            limits,
            label,
        }
    }

    /// Add raw output to the rolling buffer, dropping the oldest text past the limit
    pub(crate) fn append(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
        recent.push_str(text);
        let limit = self.limits.detection_buffer_bytes;
        if recent.len() > limit {
            let mut cut = recent.len() - limit;
            while !recent.is_char_boundary(cut) {
                cut += 1;
            }
            recent.drain(..cut);
        }
    }

    fn snapshot(&self) -> String {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .to_lowercase()
    }

    fn clear(&self) {
        self.recent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Check the buffer for a prompt and, if one is found, resolve it
    ///
    /// Without a resolver no detection is performed.
    pub(crate) async fn check(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(resolver) = &self.resolver else {
            return Ok(());
        };

        let mut counts = tokio::select! {
            guard = self.negotiation.lock() => guard,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let current = self.snapshot();
        let kind = if PASSWORD_SIGNATURES.iter().any(|s| current.contains(s)) {
            PromptKind::Password
        } else if ONE_TIME_CODE_SIGNATURES.iter().any(|s| current.contains(s)) {
            PromptKind::OneTimeCode
        } else {
            return Ok(());
        };

        let (count, max) = match kind {
            PromptKind::Password => (&mut counts.password, self.limits.max_password_prompts),
            PromptKind::OneTimeCode => (&mut counts.one_time_code, self.limits.max_guard_prompts),
        };
        if *count >= max {
            return Err(Error::PromptExhausted {
                kind,
                attempts: *count,
            });
        }
        *count += 1;
        self.clear();

        tracing::debug!(kind = %kind, attempt = *count, "prompt detected");

        let response = resolver
            .solicit(Prompt::for_kind(kind), self.limits.response_timeout, cancel)
            .await?
            .ok_or(Error::Cancelled)?;
        let response = response.trim();
        if response.is_empty() {
            return Err(Error::invalid(format!("{kind} response was empty")));
        }

        self.write_line(response).await?;

        let ack = match kind {
            PromptKind::Password => "password entered.",
            PromptKind::OneTimeCode => "Steam Guard code entered.",
        };
        self.events.line(format!("{}: {ack}", self.label));
        Ok(())
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        let Some(writer) = stdin.as_mut() else {
            return Err(Error::OperationFailed(format!(
                "{} input stream is closed",
                self.label
            )));
        };
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}
