//! Destinations for the build tool's output lines.

use std::sync::{Arc, Mutex};

/// Receives one line of build tool output at a time (without the trailing
/// newline).
pub trait LineSink: Send + Sync {
    /// Handles one output line.
    fn line(&self, line: &str);
}

/// Which of the child's output streams a [`TracingSink`] is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output; logged at `info`.
    Stdout,
    /// Standard error; logged at `warn`.
    Stderr,
}

/// Forwards output lines into `tracing` events.
///
/// Events are emitted inside whatever span is current when the executor runs,
/// so output is attributed to the build that produced it.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    stream: OutputStream,
}

impl TracingSink {
    /// A sink for the child's standard output.
    pub fn stdout() -> Self {
        Self {
            stream: OutputStream::Stdout,
        }
    }

    /// A sink for the child's standard error.
    pub fn stderr() -> Self {
        Self {
            stream: OutputStream::Stderr,
        }
    }
}

impl LineSink for TracingSink {
    fn line(&self, line: &str) {
        match self.stream {
            OutputStream::Stdout => tracing::info!(target: "indexhub::build_tool", "{line}"),
            OutputStream::Stderr => tracing::warn!(target: "indexhub::build_tool", "{line}"),
        }
    }
}

/// Collects output lines in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the lines received so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl LineSink for MemorySink {
    fn line(&self, line: &str) {
        let mut lines = self
            .lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        lines.push(line.to_string());
    }
}
