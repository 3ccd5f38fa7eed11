//! Event delivery: output lines and byte-granular progress

use crate::types::Event;
use std::io::Read;
use tokio::sync::broadcast;

/// Minimum byte step between progress events when the total is unknown
const UNKNOWN_TOTAL_STEP: u64 = 256 * 1024;

/// Number of progress events emitted across a transfer of known size
const KNOWN_TOTAL_STEPS: u64 = 200;

/// Cloneable handle that publishes [`Event`]s to subscribers
///
/// Sending never fails: with no subscribers the event is dropped.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: broadcast::Sender<Event>,
}

impl EventSink {
    /// Wrap an existing broadcast sender
    pub fn new(tx: broadcast::Sender<Event>) -> Self {
        Self { tx }
    }

    /// A sink with its own channel, for callers that do not share one
    pub fn detached() -> Self {
        let (tx, _rx) = broadcast::channel(1000);
        Self { tx }
    }

    /// Subscribe to events sent after this call
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Emit one output line
    pub fn line(&self, line: impl Into<String>) {
        self.tx.send(Event::Output { line: line.into() }).ok();
    }

    /// Emit a raw event
    pub fn emit(&self, event: Event) {
        self.tx.send(event).ok();
    }

    /// Start a progress reporter for one operation
    pub fn progress(&self, operation: impl Into<String>, total_bytes: u64) -> ProgressReporter {
        ProgressReporter {
            sink: self.clone(),
            operation: operation.into(),
            total_bytes,
            completed_bytes: 0,
            last_reported: None,
            current_item: None,
        }
    }
}

/// Byte counter for one operation that emits throttled [`Event::Progress`]
#[derive(Debug)]
pub struct ProgressReporter {
    sink: EventSink,
    operation: String,
    total_bytes: u64,
    completed_bytes: u64,
    last_reported: Option<u64>,
    current_item: Option<String>,
}

impl ProgressReporter {
    /// Set the item name attached to subsequent events
    pub fn set_current_item(&mut self, item: impl Into<String>) {
        self.current_item = Some(item.into());
    }

    /// Bytes counted so far
    pub fn completed_bytes(&self) -> u64 {
        self.completed_bytes
    }

    /// Count `n` more bytes
    pub fn advance(&mut self, n: u64) {
        self.completed_bytes = self.completed_bytes.saturating_add(n);
        let step = if self.total_bytes > 0 {
            (self.total_bytes / KNOWN_TOTAL_STEPS).max(1)
        } else {
            UNKNOWN_TOTAL_STEP
        };
        let due = match self.last_reported {
            None => true,
            Some(last) => self.completed_bytes.saturating_sub(last) >= step,
        };
        if due {
            self.emit(None);
        }
    }

    /// Overwrite both counters (used for externally reported progress)
    pub fn set(&mut self, completed_bytes: u64, total_bytes: u64, message: Option<String>) {
        self.completed_bytes = completed_bytes;
        self.total_bytes = total_bytes;
        self.emit(message);
    }

    /// Emit a final event carrying `message`
    pub fn finish(&mut self, message: impl Into<String>) {
        if self.total_bytes == 0 {
            self.total_bytes = self.completed_bytes;
        }
        self.emit(Some(message.into()));
    }

    fn emit(&mut self, message: Option<String>) {
        self.last_reported = Some(self.completed_bytes);
        self.sink.emit(Event::Progress {
            operation: self.operation.clone(),
            completed_bytes: self.completed_bytes,
            total_bytes: self.total_bytes,
            current_item: self.current_item.clone(),
            message,
        });
    }
}

/// `Read` adapter that reports every byte passing through it
pub struct ProgressRead<'a, R> {
    inner: R,
    reporter: &'a mut ProgressReporter,
}

impl<'a, R: Read> ProgressRead<'a, R> {
    /// Wrap `inner`, counting into `reporter`
    pub fn new(inner: R, reporter: &'a mut ProgressReporter) -> Self {
        Self { inner, reporter }
    }
}

impl<R: Read> Read for ProgressRead<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.reporter.advance(n as u64);
        Ok(n)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn lines_reach_subscribers() {
        let sink = EventSink::detached();
        let mut rx = sink.subscribe();
        sink.line("hello");
        assert_eq!(
            drain(&mut rx),
            vec![Event::Output {
                line: "hello".into()
            }]
        );
    }

    #[test]
    fn sending_without_subscribers_is_silent() {
        let sink = EventSink::detached();
        sink.line("nobody listens");
        sink.progress("op", 10).finish("done");
    }

    #[test]
    fn progress_is_throttled_and_finishes_with_total() {
        let sink = EventSink::detached();
        let mut rx = sink.subscribe();

        let mut reporter = sink.progress("Copy", 1000);
        for _ in 0..1000 {
            reporter.advance(1);
        }
        reporter.finish("Done.");

        let events = drain(&mut rx);
        assert!(events.len() <= 202, "got {} events", events.len());
        match events.last().unwrap() {
            Event::Progress {
                completed_bytes,
                total_bytes,
                message,
                ..
            } => {
                assert_eq!(*completed_bytes, 1000);
                assert_eq!(*total_bytes, 1000);
                assert_eq!(message.as_deref(), Some("Done."));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn progress_read_counts_bytes() {
        let sink = EventSink::detached();
        let mut reporter = sink.progress("Read", 0);
        let data = vec![7u8; 10_000];
        let mut out = Vec::new();
        ProgressRead::new(&data[..], &mut reporter)
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(reporter.completed_bytes(), 10_000);
        assert_eq!(out.len(), 10_000);
    }
}
