//! Diagnostic sinks for the intercept trace.
//!
//! The trace is a plain line-oriented text stream kept separate from the
//! ambient `tracing` output. Each `write_line` call emits exactly one line.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Destination for intercept trace lines.
pub trait DiagnosticSink: Send + Sync {
    /// Write one line. The sink appends the terminator.
    fn write_line(&self, line: &str);
}

/// Writes trace lines to the process's stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn write_line(&self, line: &str) {
        // Holding the lock keeps lines from the two relays from interleaving.
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{line}");
    }
}

/// Collects trace lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line written so far, in write order.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any line equals `line` exactly.
    pub fn contains(&self, line: &str) -> bool {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|l| l == line)
    }

    /// Index of the first line equal to `line`.
    pub fn position(&self, line: &str) -> Option<usize> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .position(|l| l == line)
    }
}

impl DiagnosticSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_owned());
    }
}
