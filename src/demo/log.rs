//! Session log
//!
//! Timestamped record of every detection in a demo session, rendered into
//! the log pane and saved as a text file when the session ends.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One log line: the plates seen in a single analyzed frame
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub plates: Vec<String>,
}

impl LogEntry {
    /// Render as `[timestamp] PLATE1, PLATE2`
    pub fn render(&self) -> String {
        format!(
            "[{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.plates.join(", ")
        )
    }
}

/// Append-only detection log for one demo session
pub struct SessionLog {
    started_at: DateTime<Local>,
    ended_at: Option<DateTime<Local>>,
    entries: Vec<LogEntry>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            ended_at: None,
            entries: Vec::new(),
        }
    }

    /// Record the plates detected in one frame
    pub fn record(&mut self, plates: Vec<String>) {
        self.entries.push(LogEntry {
            timestamp: Local::now(),
            plates,
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Mark the session finished; recording after this is not expected
    pub fn close(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(Local::now());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Full text rendering, as written to the log file
    pub fn render(&self) -> String {
        let mut out = format!(
            "Session started: {}\n\n",
            self.started_at.format(TIMESTAMP_FORMAT)
        );
        for entry in &self.entries {
            out.push_str(&entry.render());
            out.push('\n');
        }
        if let Some(ended) = self.ended_at {
            out.push_str(&format!("\nSession ended: {}\n", ended.format(TIMESTAMP_FORMAT)));
        }
        out.push_str(&format!("Total detected: {}\n", self.entries.len()));
        out
    }

    /// Write the rendered log into `dir` as `log_<timestamp>.txt`
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create output directory {}", dir.display()))?;

        let filename = format!("log_{}.txt", Local::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(filename);
        std::fs::write(&path, self.render())
            .with_context(|| format!("cannot write session log {}", path.display()))?;

        Ok(path)
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_rendering() {
        let mut log = SessionLog::new();
        log.record(vec!["AB12CD".to_string(), "XY99Z".to_string()]);

        let line = log.entries()[0].render();
        assert!(line.starts_with('['));
        assert!(line.ends_with("] AB12CD, XY99Z"));
    }

    #[test]
    fn test_render_includes_session_bounds_and_total() {
        let mut log = SessionLog::new();
        log.record(vec!["AB12CD".to_string()]);
        log.record(vec!["XY99Z".to_string()]);
        log.close();

        let text = log.render();
        assert!(text.starts_with("Session started: "));
        assert!(text.contains("AB12CD"));
        assert!(text.contains("Session ended: "));
        assert!(text.trim_end().ends_with("Total detected: 2"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut log = SessionLog::new();
        log.close();
        let first = log.render();
        log.close();
        assert_eq!(log.render(), first);
    }

    #[test]
    fn test_save_writes_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = SessionLog::new();
        log.record(vec!["AB12CD".to_string()]);
        log.close();

        let path = log.save_to(dir.path()).unwrap();
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("log_"));

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("AB12CD"));
        assert!(content.contains("Total detected: 1"));
    }

    #[test]
    fn test_save_creates_missing_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("output/logs");

        let log = SessionLog::new();
        assert!(log.save_to(&nested).is_ok());
        assert!(nested.exists());
    }
}
