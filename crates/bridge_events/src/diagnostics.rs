//! Operator-facing diagnostic lines.
//!
//! Resolution failures, failed handler invocations and malformed results are
//! each reported as one prefixed line. Nothing in the bridge parses them.

use std::sync::Mutex;
use tracing::error;

pub const DIAGNOSTIC_PREFIX: &str = "[qlbridge] ";

pub trait DiagnosticSink: Send + Sync {
    fn report(&self, context: &str, message: &str);
}

pub fn format_line(context: &str, message: &str) -> String {
    format!("{DIAGNOSTIC_PREFIX}ERROR @ {context}: {message}")
}

/// Emits each diagnostic as a `tracing` error event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, context: &str, message: &str) {
        error!(target: "bridge::diagnostic", "{}", format_line(context, message));
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self) -> usize {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, context: &str, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format_line(context, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_prefixed() {
        let sink = CollectingSink::new();
        sink.report("client_think", "missing field 'fov'");
        assert_eq!(
            sink.lines(),
            vec!["[qlbridge] ERROR @ client_think: missing field 'fov'".to_string()]
        );
    }
}
