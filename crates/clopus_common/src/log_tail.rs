//! Tail of the watcher's log file.

use std::path::PathBuf;
use tracing::debug;

/// Number of trailing lines shown on the dashboard
pub const TAIL_LINES: usize = 200;

/// Shown until the watcher has written its first log line
pub const LOG_PLACEHOLDER: &str = "No watcher log available yet. Waiting for first run...";

#[derive(Debug, Clone)]
pub struct LogTail {
    path: PathBuf,
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Last [`TAIL_LINES`] lines of the log, or [`LOG_PLACEHOLDER`] if the
    /// file cannot be read.
    pub fn read(&self) -> String {
        match std::fs::read(&self.path) {
            Ok(bytes) => tail_lines(&String::from_utf8_lossy(&bytes), TAIL_LINES),
            Err(e) => {
                debug!("Watcher log {} unavailable: {}", self.path.display(), e);
                LOG_PLACEHOLDER.to_string()
            }
        }
    }
}

/// Keep the last `n` newline-separated segments of `content`.
///
/// A trailing newline yields an empty final segment, which counts toward `n`.
pub fn tail_lines(content: &str, n: usize) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    if lines.len() <= n {
        return content.to_string();
    }
    lines[lines.len() - n..].join("\n")
}
