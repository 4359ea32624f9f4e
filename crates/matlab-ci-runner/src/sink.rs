//! Line sinks that receive MATLAB output as it is produced.

use std::io::Write;
use std::sync::Mutex;

use tokio::sync::mpsc;

/// Destination for log lines, usually the CI job's live console.
pub trait OutputSink: Send + Sync {
    /// Receives one line without its trailing newline.
    fn line(&self, line: &str);
}

/// Writes each line to an `io::Write` and flushes it immediately.
#[derive(Debug)]
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wraps a writer.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl<W: Write + Send> OutputSink for WriterSink<W> {
    fn line(&self, line: &str) {
        if let Ok(mut writer) = self.writer.lock() {
            drop(writeln!(writer, "{line}").and_then(|()| writer.flush()));
        }
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines received so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// Whether any received line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl OutputSink for MemorySink {
    fn line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_owned());
        }
    }
}

/// Forwards lines to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that observes it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl OutputSink for ChannelSink {
    fn line(&self, line: &str) {
        drop(self.sender.send(line.to_owned()));
    }
}
