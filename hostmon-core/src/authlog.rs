use crate::error::MonitorError;
use chrono::{Datelike, Local, NaiveDateTime};
use regex::Regex;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::debug;

/// Successful sshd authentication lines, e.g.
/// `Jun  1 10:00:00 host sshd[123]: Accepted password for alice from 8.8.8.8 port 22 ssh2`
fn accepted_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(\w+\s+\d+\s+\d+:\d+:\d+)\s+(\S+)\s+sshd\[\d+\]:\s+Accepted\s+\S+\s+for\s+(\S+)\s+from\s+(\S+)",
        )
        .unwrap()
    })
}

/// A successful SSH authentication event extracted from the auth log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshLogin {
    /// Raw syslog timestamp, year-less ("Jun  1 10:00:00").
    pub timestamp: String,
    pub hostname: String,
    pub username: String,
    pub source_ip: String,
}

impl SshLogin {
    /// Parses one log line. Lines for any other event type yield `None` and
    /// are simply dropped by the caller.
    pub fn parse(line: &str) -> Option<Self> {
        let caps = accepted_pattern().captures(line)?;
        Some(Self {
            timestamp: caps[1].to_string(),
            hostname: caps[2].to_string(),
            username: caps[3].to_string(),
            source_ip: caps[4].to_string(),
        })
    }

    /// Human-readable timestamp for alert text.
    ///
    /// Syslog timestamps omit the year, so the current calendar year is
    /// assumed. Entries that straddle a New Year boundary get misattributed;
    /// known limitation, inherited from the log format. Falls back to the
    /// raw timestamp when parsing fails.
    pub fn formatted_timestamp(&self) -> String {
        let normalized: String = self
            .timestamp
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let with_year = format!("{normalized} {}", Local::now().year());
        match NaiveDateTime::parse_from_str(&with_year, "%b %e %H:%M:%S %Y") {
            Ok(ts) => ts.format("%d %b %Y %H:%M").to_string(),
            Err(_) => self.timestamp.clone(),
        }
    }
}

/// Persisted byte offset into the auth log, text-encoded.
#[derive(Debug, Clone)]
pub struct LogCursor {
    path: PathBuf,
}

impl LogCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// A missing or garbled cursor file reads as offset zero.
    pub fn load(&self) -> u64 {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn store(&self, offset: u64) -> std::io::Result<()> {
        fs::write(&self.path, offset.to_string())
    }
}

/// Incrementally reads lines appended to the auth log since the last call.
///
/// The cursor is the only durable state; delivery of each line is
/// best-effort at-most-once, not transactional.
pub struct AuthLogTailer {
    log_path: PathBuf,
    cursor: LogCursor,
}

impl AuthLogTailer {
    pub fn new(log_path: impl Into<PathBuf>, cursor: LogCursor) -> Self {
        Self {
            log_path: log_path.into(),
            cursor,
        }
    }

    /// Returns the lines appended since the previous invocation and advances
    /// the persisted cursor to end-of-file.
    ///
    /// A file size below the stored offset means the log was rotated or
    /// truncated; reading restarts from zero. A missing log leaves the
    /// stored offset untouched and reports the source as unavailable.
    pub fn read_new_lines(&self) -> Result<Vec<String>, MonitorError> {
        let size = fs::metadata(&self.log_path)
            .map_err(|_| MonitorError::SourceUnavailable(self.log_path.display().to_string()))?
            .len();

        let mut offset = self.cursor.load();
        if size < offset {
            debug!(
                "{} shrank below stored offset {offset}; assuming rotation",
                self.log_path.display()
            );
            offset = 0;
        }

        let mut file = File::open(&self.log_path)
            .map_err(|_| MonitorError::SourceUnavailable(self.log_path.display().to_string()))?;
        file.seek(SeekFrom::Start(offset))?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        self.cursor.store(offset + bytes.len() as u64)?;

        let text = String::from_utf8_lossy(&bytes);
        Ok(text.lines().map(str::to_string).collect())
    }

    /// Convenience wrapper: tail the log and keep only successful SSH logins.
    pub fn read_new_logins(&self) -> Result<Vec<SshLogin>, MonitorError> {
        Ok(self
            .read_new_lines()?
            .iter()
            .filter_map(|line| SshLogin::parse(line))
            .collect())
    }
}
