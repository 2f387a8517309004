use crate::metrics::{format_uptime, ResourceSample};
use parking_lot::RwLock;
use std::fs;
use std::process::Command;
use std::sync::Arc;
use sysinfo::{Disks, Networks, System};

/// Wrapper around sysinfo supplying both the monitor loop's periodic samples
/// and the on-demand summaries consumed by the external command interface.
/// Readers of mirrored state tolerate staleness up to one refresh period.
pub struct SystemMonitor {
    system: Arc<RwLock<System>>,
    networks: Arc<RwLock<Networks>>,
    disks: Arc<RwLock<Disks>>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self {
            system: Arc::new(RwLock::new(System::new())),
            networks: Arc::new(RwLock::new(Networks::new_with_refreshed_list())),
            disks: Arc::new(RwLock::new(Disks::new_with_refreshed_list())),
        }
    }

    pub fn refresh(&self) {
        use sysinfo::{CpuRefreshKind, MemoryRefreshKind, ProcessRefreshKind, RefreshKind};

        let mut system = self.system.write();
        // Rebuild from scratch: sysinfo can hold on to terminated processes
        // across incremental refreshes.
        *system = System::new_with_specifics(
            RefreshKind::new()
                .with_processes(ProcessRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything())
                .with_cpu(CpuRefreshKind::everything()),
        );

        self.networks.write().refresh();
        self.disks.write().refresh();
    }

    /// Instantaneous utilization snapshot for threshold checks.
    pub fn sample(&self) -> ResourceSample {
        let system = self.system.read();
        let networks = self.networks.read();
        let disks = self.disks.read();

        let ram_percent = if system.total_memory() > 0 {
            system.used_memory() as f32 / system.total_memory() as f32 * 100.0
        } else {
            0.0
        };

        let disk_percent = disks
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"))
            .or_else(|| disks.iter().next())
            .map(|d| {
                let total = d.total_space();
                if total > 0 {
                    (total - d.available_space()) as f32 / total as f32 * 100.0
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0);

        let net_total_bytes = networks
            .iter()
            .map(|(_, data)| data.total_received() + data.total_transmitted())
            .sum();

        ResourceSample {
            timestamp: chrono::Utc::now(),
            cpu_percent: system.global_cpu_usage(),
            ram_percent,
            disk_percent,
            net_total_bytes,
            uptime_secs: System::uptime(),
        }
    }

    /// CPU/RAM/swap/load/uptime overview for the command interface.
    pub fn resource_summary(&self) -> String {
        let system = self.system.read();
        let mib = 1024 * 1024;
        let load = System::load_average();
        let swap_percent = if system.total_swap() > 0 {
            system.used_swap() as f32 / system.total_swap() as f32 * 100.0
        } else {
            0.0
        };
        let ram_percent = if system.total_memory() > 0 {
            system.used_memory() as f32 / system.total_memory() as f32 * 100.0
        } else {
            0.0
        };

        format!(
            "*System Resources*\n\
             CPU: *{:.1}%*\n\
             RAM: *{:.1}%* ({} MB / {} MB)\n\
             Swap: *{:.1}%* ({} MB / {} MB)\n\
             Load avg: {:.2}, {:.2}, {:.2}\n\
             Uptime: {}",
            system.global_cpu_usage(),
            ram_percent,
            system.used_memory() / mib,
            system.total_memory() / mib,
            swap_percent,
            system.used_swap() / mib,
            system.total_swap() / mib,
            load.one,
            load.five,
            load.fifteen,
            format_uptime(System::uptime()),
        )
    }

    /// Root usage plus up to five non-loop partitions.
    pub fn disk_summary(&self) -> String {
        let disks = self.disks.read();
        let gib = 1024.0 * 1024.0 * 1024.0;

        let mut summary = String::from("*Disk Usage*");
        if let Some(root) = disks
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"))
        {
            let total = root.total_space() as f64 / gib;
            let free = root.available_space() as f64 / gib;
            let used = total - free;
            let percent = if root.total_space() > 0 {
                used / total * 100.0
            } else {
                0.0
            };
            summary.push_str(&format!(
                "\nRoot: *{percent:.1}%*\nUsed: {used:.1} GB\nFree: {free:.1} GB\nTotal: {total:.1} GB"
            ));
        }

        summary.push_str("\n*Partitions*:");
        let partitions: Vec<_> = disks
            .iter()
            .filter(|d| !d.name().to_string_lossy().contains("loop"))
            .collect();
        for disk in partitions.iter().take(5) {
            let total = disk.total_space();
            let used = total.saturating_sub(disk.available_space());
            let percent = if total > 0 {
                used as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            summary.push_str(&format!(
                "\n{} ({}): {:.1}% used ({:.1} GB / {:.1} GB)",
                disk.name().to_string_lossy(),
                disk.mount_point().display(),
                percent,
                used as f64 / gib,
                total as f64 / gib,
            ));
        }
        if partitions.len() > 5 {
            summary.push_str(&format!("\n... and {} more partitions", partitions.len() - 5));
        }
        summary
    }

    /// Cumulative traffic totals plus up to five interfaces.
    pub fn network_summary(&self) -> String {
        let networks = self.networks.read();
        let mib = 1024.0 * 1024.0;

        let (sent, received) = networks.iter().fold((0u64, 0u64), |(s, r), (_, data)| {
            (s + data.total_transmitted(), r + data.total_received())
        });

        let mut summary = format!(
            "*Network*\nData sent: {:.2} MB\nData received: {:.2} MB\n*Interfaces*:",
            sent as f64 / mib,
            received as f64 / mib,
        );
        for (name, data) in networks.iter().take(5) {
            summary.push_str(&format!(
                "\n{name}: {:.2} MB out / {:.2} MB in",
                data.total_transmitted() as f64 / mib,
                data.total_received() as f64 / mib,
            ));
        }
        summary
    }

    /// Monospace table of the busiest processes by CPU, `limit` clamped to
    /// 1..=20.
    pub fn top_processes(&self, limit: usize) -> String {
        let limit = limit.clamp(1, 20);
        let system = self.system.read();
        let total_memory = system.total_memory().max(1);

        let mut processes: Vec<_> = system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let memory_percent = process.memory() as f32 / total_memory as f32 * 100.0;
                (
                    pid.as_u32(),
                    process.cpu_usage(),
                    memory_percent,
                    process.name().to_string_lossy().to_string(),
                )
            })
            .collect();
        processes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut table = format!("*Top {limit} Processes (CPU)*\n```\n");
        table.push_str(&format!(
            "{:>7} {:>6} {:>6} {:12} NAME\n",
            "PID", "CPU%", "MEM%", "USER"
        ));
        table.push_str(&"-".repeat(50));
        table.push('\n');
        for (pid, cpu, mem, name) in processes.into_iter().take(limit) {
            let (user, _) = process_user(pid);
            let user: String = user.chars().take(12).collect();
            table.push_str(&format!("{pid:>7} {cpu:>6.1} {mem:>6.1} {user:12} {name}\n"));
        }
        table.push_str("```");
        table
    }

    /// Best-effort primary local address via `hostname -I`.
    pub fn local_ip(&self) -> Option<String> {
        let output = Command::new("hostname").arg("-I").output().ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .next()
            .map(str::to_string)
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Owner lookup via /proc and /etc/passwd; sysinfo's user table is not worth
/// a second refresh pass for a display column.
fn process_user(pid: u32) -> (String, u32) {
    if let Ok(status) = fs::read_to_string(format!("/proc/{pid}/status")) {
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("Uid:") {
                if let Some(uid) = rest.split_whitespace().next().and_then(|s| s.parse().ok()) {
                    return (username_for_uid(uid), uid);
                }
            }
        }
    }
    ("unknown".to_string(), 0)
}

fn username_for_uid(uid: u32) -> String {
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
