//! Trace line collection.
//!
//! When a request asks for trace output, a [`TraceSink`] is created for that
//! request and handed to the connection for the duration of one execution
//! call. The connection appends diagnostic lines to it; after the call the
//! handler drains the sink into the response envelope. Each request gets its
//! own sink, so concurrent requests can never observe each other's lines.

use chrono::Utc;
use std::sync::{Arc, Mutex};

/// Scoped buffer of diagnostic log lines for a single execution call.
#[derive(Clone, Default)]
pub struct TraceSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl TraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one diagnostic line, formatted `timestamp LEVEL logger: message`
    /// (level padded to 8 columns).
    pub fn emit(&self, level: &str, logger: &str, message: &str) {
        let ts = Utc::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let line = format!("{} {:<8} {}: {}", ts, level, logger, message);
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    /// Take all captured lines, leaving the sink empty.
    pub fn drain(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(mut lines) => std::mem::take(&mut *lines),
            Err(_) => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().map(|l| l.is_empty()).unwrap_or(true)
    }
}
