use crate::error::MonitorError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// The two independently tracked session families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    SshLogin,
    SftpTransfer,
}

impl SessionKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::SshLogin => "SSH",
            Self::SftpTransfer => "SFTP",
        }
    }
}

/// Produces an ordered list of identity strings for currently observed
/// sessions of one kind. The diff algorithm is identical no matter how the
/// snapshot is obtained.
pub trait SessionSource {
    fn kind(&self) -> SessionKind;
    fn snapshot(&self) -> Result<Vec<String>, MonitorError>;
}

/// Interactive login sessions, external-tool-backed via `who`.
///
/// Identity strings are the whitespace-normalized `who` lines:
/// `alice pts/0 2026-08-27 10:15 (203.0.113.9)`.
pub struct LoginSessionSource;

impl SessionSource for LoginSessionSource {
    fn kind(&self) -> SessionKind {
        SessionKind::SshLogin
    }

    fn snapshot(&self) -> Result<Vec<String>, MonitorError> {
        let output = Command::new("who")
            .output()
            .map_err(|e| MonitorError::SourceUnavailable(format!("who: {e}")))?;
        if !output.status.success() {
            return Err(MonitorError::SourceUnavailable(format!(
                "who exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect())
    }
}

/// File-transfer subprocess sessions, discovered by scanning the process
/// table for `sftp-server` (and `internal-sftp`) children of sshd.
///
/// Identity strings are `<pid> <starttime-ticks> <user> <peer>`; the start
/// time disambiguates pid reuse between cycles. The peer address is resolved
/// best-effort by a cascade of lookups and falls back to `unknown`.
pub struct SftpSessionSource {
    proc_root: PathBuf,
}

impl SftpSessionSource {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }

    #[cfg(test)]
    fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    fn comm(&self, pid: u32) -> Option<String> {
        fs::read_to_string(self.proc_root.join(pid.to_string()).join("comm"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    fn cmdline(&self, pid: u32) -> Option<String> {
        fs::read(self.proc_root.join(pid.to_string()).join("cmdline"))
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).replace('\0', " "))
    }

    fn is_sftp(&self, pid: u32) -> bool {
        if self.comm(pid).as_deref() == Some("sftp-server") {
            return true;
        }
        self.cmdline(pid)
            .is_some_and(|c| c.contains("sftp-server") || c.contains("internal-sftp"))
    }

    /// Start time in clock ticks since boot, field 22 of /proc/<pid>/stat.
    fn start_ticks(&self, pid: u32) -> u64 {
        let Ok(stat) = fs::read_to_string(self.proc_root.join(pid.to_string()).join("stat")) else {
            return 0;
        };
        // The comm field is parenthesized and may contain spaces; everything
        // after the closing paren is space-separated, starting at field 3.
        let Some(rest) = stat.rsplit_once(')').map(|(_, rest)| rest) else {
            return 0;
        };
        rest.split_whitespace()
            .nth(19)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    fn uid(&self, pid: u32) -> Option<u32> {
        let status = fs::read_to_string(self.proc_root.join(pid.to_string()).join("status")).ok()?;
        status
            .lines()
            .find(|l| l.starts_with("Uid:"))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    }

    fn parent(&self, pid: u32) -> Option<u32> {
        let status = fs::read_to_string(self.proc_root.join(pid.to_string()).join("status")).ok()?;
        status
            .lines()
            .find(|l| l.starts_with("PPid:"))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    }

    fn ssh_connection_peer(&self, pid: u32) -> Option<String> {
        let environ = fs::read(self.proc_root.join(pid.to_string()).join("environ")).ok()?;
        for entry in environ.split(|&b| b == 0) {
            let entry = String::from_utf8_lossy(entry);
            if let Some(value) = entry.strip_prefix("SSH_CONNECTION=") {
                return value.split_whitespace().next().map(str::to_string);
            }
        }
        None
    }

    /// Cascade: the process's own environment first, then up the parent
    /// chain (the spawning sshd carries SSH_CONNECTION when the subprocess
    /// environment was scrubbed).
    fn resolve_peer(&self, pid: u32) -> String {
        let mut current = Some(pid);
        for _ in 0..5 {
            let Some(p) = current else { break };
            if let Some(peer) = self.ssh_connection_peer(p) {
                return peer;
            }
            current = self.parent(p).filter(|&pp| pp > 1);
        }
        "unknown".to_string()
    }

    fn username(&self, uid: u32) -> String {
        if let Ok(passwd) = fs::read_to_string("/etc/passwd") {
            for line in passwd.lines() {
                let fields: Vec<&str> = line.split(':').collect();
                if fields.len() >= 3 && fields[2].parse() == Ok(uid) {
                    return fields[0].to_string();
                }
            }
        }
        format!("uid:{uid}")
    }
}

impl Default for SftpSessionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSource for SftpSessionSource {
    fn kind(&self) -> SessionKind {
        SessionKind::SftpTransfer
    }

    fn snapshot(&self) -> Result<Vec<String>, MonitorError> {
        let entries = fs::read_dir(&self.proc_root)
            .map_err(|_| MonitorError::SourceUnavailable(self.proc_root.display().to_string()))?;

        let mut pids: Vec<u32> = entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|name| name.parse().ok())
            .collect();
        pids.sort_unstable();

        let mut identities = Vec::new();
        for pid in pids {
            if !self.is_sftp(pid) {
                continue;
            }
            let user = self
                .uid(pid)
                .map(|uid| self.username(uid))
                .unwrap_or_else(|| "unknown".to_string());
            let peer = self.resolve_peer(pid);
            identities.push(format!("{pid} {} {user} {peer}", self.start_ticks(pid)));
        }
        Ok(identities)
    }
}

/// A session newly observed this cycle, extracted from its identity string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub kind: SessionKind,
    pub subject: String,
    /// None when the peer address could not be resolved; such events are
    /// logged and suppressed rather than alerted.
    pub address: Option<String>,
    pub started: Option<String>,
}

impl SessionEvent {
    pub fn from_identity(kind: SessionKind, identity: &str) -> Option<Self> {
        let tokens: Vec<&str> = identity.split_whitespace().collect();
        match kind {
            SessionKind::SshLogin => {
                // user tty date time [(host)]
                if tokens.len() < 2 {
                    return None;
                }
                let address = tokens
                    .iter()
                    .find(|t| t.starts_with('('))
                    .map(|t| t.trim_matches(|c| c == '(' || c == ')').to_string())
                    .filter(|a| !a.is_empty());
                let started = if tokens.len() >= 4 {
                    Some(format!("{} {}", tokens[2], tokens[3]))
                } else {
                    None
                };
                Some(Self {
                    kind,
                    subject: tokens[0].to_string(),
                    address,
                    started,
                })
            }
            SessionKind::SftpTransfer => {
                // pid starttime user peer
                if tokens.len() < 4 {
                    return None;
                }
                let address = Some(tokens[3].to_string()).filter(|a| a != "unknown");
                Some(Self {
                    kind,
                    subject: format!("{} (pid {})", tokens[2], tokens[0]),
                    address,
                    started: None,
                })
            }
        }
    }
}

/// Diffs the current session snapshot against the previously persisted one.
///
/// The new snapshot is written before the diff is handed back, so a crash
/// mid-cycle can drop a report but never repeat one.
pub struct SessionTracker {
    state_path: PathBuf,
}

impl SessionTracker {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Returns the entries of `current` absent from the previous snapshot,
    /// in input order. The previous snapshot is empty on first run.
    pub fn detect_new(&self, current: &[String]) -> Result<Vec<String>, MonitorError> {
        let previous: HashSet<String> = match fs::read_to_string(&self.state_path) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(_) => HashSet::new(),
        };

        let mut data = current.join("\n");
        if !data.is_empty() {
            data.push('\n');
        }
        fs::write(&self.state_path, data)?;

        let new: Vec<String> = current
            .iter()
            .filter(|entry| !previous.contains(*entry))
            .cloned()
            .collect();
        if !new.is_empty() {
            debug!("{} new session(s) in {}", new.len(), self.state_path.display());
        }
        Ok(new)
    }
}
