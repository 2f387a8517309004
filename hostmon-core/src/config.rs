use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

fn default_cpu_threshold() -> f32 {
    80.0
}

fn default_ram_threshold() -> f32 {
    80.0
}

fn default_disk_threshold() -> f32 {
    90.0
}

fn default_net_threshold() -> u64 {
    1_000_000
}

fn default_notify_ssh() -> bool {
    true
}

fn default_notify_sftp() -> bool {
    false
}

fn default_notify_reboot() -> bool {
    true
}

fn default_excluded_ips() -> Vec<String> {
    vec![
        "127.0.0.1".to_string(),
        "192.168.0.0/16".to_string(),
        "10.0.0.0/8".to_string(),
        "172.16.0.0/12".to_string(),
    ]
}

fn default_top_processes() -> usize {
    5
}

/// Daemon configuration, re-read from disk at the start of every cycle so
/// edits take effect without a restart.
///
/// Unknown fields survive a load/save round trip via the flattened map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: f32,
    #[serde(default = "default_ram_threshold")]
    pub ram_threshold: f32,
    #[serde(default = "default_disk_threshold")]
    pub disk_threshold: f32,
    /// Cumulative sent+received bytes above which a network alert fires.
    #[serde(default = "default_net_threshold")]
    pub net_threshold: u64,
    #[serde(default = "default_notify_ssh")]
    pub notify_ssh: bool,
    #[serde(default = "default_notify_sftp")]
    pub notify_sftp: bool,
    #[serde(default = "default_notify_reboot")]
    pub notify_reboot: bool,
    /// Literal addresses and CIDR ranges exempt from session/login alerts.
    #[serde(default = "default_excluded_ips")]
    pub excluded_ips: Vec<String>,
    /// Row limit for the process table, clamped to 1..=20 on load.
    #[serde(default = "default_top_processes")]
    pub top_processes: usize,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: default_cpu_threshold(),
            ram_threshold: default_ram_threshold(),
            disk_threshold: default_disk_threshold(),
            net_threshold: default_net_threshold(),
            notify_ssh: default_notify_ssh(),
            notify_sftp: default_notify_sftp(),
            notify_reboot: default_notify_reboot(),
            excluded_ips: default_excluded_ips(),
            top_processes: default_top_processes(),
            bot_token: String::new(),
            chat_id: String::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl MonitorConfig {
    /// Loads configuration from `path`.
    ///
    /// A missing file is created with defaults; a malformed file is reported
    /// and defaults are returned without touching the file. Neither case is
    /// an error for the caller.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                warn!("could not write default config to {}: {e}", path.display());
            }
            return config;
        }

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("could not read config {}: {e}", path.display());
                return Self::default();
            }
        };

        match serde_json::from_str::<Self>(&raw) {
            Ok(mut config) => {
                config.top_processes = config.top_processes.clamp(1, 20);
                config
            }
            Err(e) => {
                warn!("malformed config {}: {e}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    /// A channel is configured once both credentials are present.
    pub fn channel_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults_and_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = MonitorConfig::load(&path);
        assert_eq!(config.cpu_threshold, 80.0);
        assert_eq!(config.top_processes, 5);
        assert!(config.notify_ssh);
        assert!(!config.notify_sftp);
        assert!(path.exists());
    }

    #[test]
    fn missing_fields_are_backfilled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"cpu_threshold": 50}"#).unwrap();

        let config = MonitorConfig::load(&path);
        assert_eq!(config.cpu_threshold, 50.0);
        assert_eq!(config.ram_threshold, 80.0);
        assert_eq!(config.excluded_ips.len(), 4);
        assert_eq!(config.bot_token, "");
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"cpu_threshold": 70, "custom_note": "keep me"}"#).unwrap();

        let config = MonitorConfig::load(&path);
        config.save(&path).unwrap();

        let reloaded = MonitorConfig::load(&path);
        assert_eq!(
            reloaded.extra.get("custom_note").and_then(|v| v.as_str()),
            Some("keep me")
        );
        assert_eq!(reloaded.cpu_threshold, 70.0);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json at all").unwrap();

        let config = MonitorConfig::load(&path);
        assert_eq!(config.disk_threshold, 90.0);
    }

    #[test]
    fn top_processes_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"top_processes": 500}"#).unwrap();
        assert_eq!(MonitorConfig::load(&path).top_processes, 20);

        fs::write(&path, r#"{"top_processes": 0}"#).unwrap();
        assert_eq!(MonitorConfig::load(&path).top_processes, 1);
    }
}
