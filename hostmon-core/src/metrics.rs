use serde::{Deserialize, Serialize};

/// One cycle's worth of instantaneous utilization readings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSample {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub cpu_percent: f32,
    pub ram_percent: f32,
    /// Root filesystem usage.
    pub disk_percent: f32,
    /// Cumulative bytes sent plus received across all interfaces since boot.
    pub net_total_bytes: u64,
    pub uptime_secs: u64,
}

impl Default for ResourceSample {
    fn default() -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            cpu_percent: 0.0,
            ram_percent: 0.0,
            disk_percent: 0.0,
            net_total_bytes: 0,
            uptime_secs: 0,
        }
    }
}

/// Formats seconds as `{d}d {h}h {m}m {s}s`.
pub fn format_uptime(uptime_secs: u64) -> String {
    let days = uptime_secs / 86_400;
    let hours = uptime_secs % 86_400 / 3_600;
    let minutes = uptime_secs % 3_600 / 60;
    let seconds = uptime_secs % 60;
    format!("{days}d {hours}h {minutes}m {seconds}s")
}
