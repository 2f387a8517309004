use crate::authlog::{AuthLogTailer, LogCursor};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::ipfilter::is_excluded;
use crate::metrics::ResourceSample;
use crate::monitor::SystemMonitor;
use crate::notifier::{Alert, AlertCategory, AlertDispatcher, TelegramNotifier};
use crate::sessions::{
    LoginSessionSource, SessionEvent, SessionKind, SessionSource, SessionTracker,
    SftpSessionSource,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Main polling cadence.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Nested sub-period for auth-log and session checks.
pub const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Filesystem locations the daemon reads and writes.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
    pub config: PathBuf,
    pub auth_log: PathBuf,
    pub state_dir: PathBuf,
}

impl DaemonPaths {
    pub fn new(
        config: impl Into<PathBuf>,
        auth_log: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config: config.into(),
            auth_log: auth_log.into(),
            state_dir: state_dir.into(),
        }
    }

    pub fn log_cursor(&self) -> PathBuf {
        self.state_dir.join("authlog.offset")
    }

    pub fn session_snapshot(&self, kind: SessionKind) -> PathBuf {
        match kind {
            SessionKind::SshLogin => self.state_dir.join("ssh_sessions"),
            SessionKind::SftpTransfer => self.state_dir.join("sftp_sessions"),
        }
    }
}

/// The orchestrator: one strictly sequential loop that samples metrics,
/// detects reboots, tails the auth log, diffs sessions, and dispatches
/// alerts. No cycle error is ever fatal; the loop logs and retries next
/// cycle.
pub struct MonitorLoop {
    paths: DaemonPaths,
    monitor: SystemMonitor,
    dispatcher: AlertDispatcher,
    /// Token the current dispatcher was built with; a config edit that
    /// changes it triggers a rebuild on the next cycle.
    bot_token: String,
    session_sources: Vec<Box<dyn SessionSource>>,
    last_uptime: u64,
    last_session_check: Option<Instant>,
}

impl MonitorLoop {
    pub fn new(paths: DaemonPaths) -> Self {
        let config = MonitorConfig::load(&paths.config);
        let bot_token = config.bot_token.clone();
        Self {
            paths,
            monitor: SystemMonitor::new(),
            dispatcher: AlertDispatcher::new(Box::new(TelegramNotifier::new(&bot_token))),
            bot_token,
            session_sources: vec![Box::new(LoginSessionSource), Box::new(SftpSessionSource::new())],
            last_uptime: 0,
            last_session_check: None,
        }
    }

    /// Test seam: preconfigured dispatcher and session sources.
    #[cfg(test)]
    pub(crate) fn with_parts(
        paths: DaemonPaths,
        dispatcher: AlertDispatcher,
        bot_token: String,
        session_sources: Vec<Box<dyn SessionSource>>,
    ) -> Self {
        Self {
            paths,
            monitor: SystemMonitor::new(),
            dispatcher,
            bot_token,
            session_sources,
            last_uptime: 0,
            last_session_check: None,
        }
    }

    /// Runs forever. The only exit is process termination from outside.
    pub fn run(&mut self) -> ! {
        if let Err(e) = std::fs::create_dir_all(&self.paths.state_dir) {
            warn!(
                "could not create state dir {}: {e}",
                self.paths.state_dir.display()
            );
        }
        self.last_uptime = self.monitor.sample().uptime_secs;
        info!("monitor loop started (poll every {:?})", POLL_INTERVAL);

        loop {
            self.run_cycle();
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// One iteration: fresh config, metric thresholds, reboot detection, and
    /// (every 30s) the security checks.
    pub fn run_cycle(&mut self) {
        let config = MonitorConfig::load(&self.paths.config);
        self.refresh_dispatcher(&config);

        self.monitor.refresh();
        let sample = self.monitor.sample();

        self.check_resources(&config, &sample);
        self.check_reboot(&config, &sample);

        let due = self
            .last_session_check
            .is_none_or(|t| t.elapsed() >= SESSION_CHECK_INTERVAL);
        if due {
            self.run_security_checks(&config);
            self.last_session_check = Some(Instant::now());
        }
    }

    fn refresh_dispatcher(&mut self, config: &MonitorConfig) {
        if config.bot_token != self.bot_token {
            info!("notification credentials changed; rebuilding dispatcher");
            self.dispatcher =
                AlertDispatcher::new(Box::new(TelegramNotifier::new(&config.bot_token)));
            self.bot_token = config.bot_token.clone();
        }
    }

    /// One alert per metric over threshold. No hysteresis: a sustained
    /// breach re-alerts every cycle.
    pub(crate) fn check_resources(&self, config: &MonitorConfig, sample: &ResourceSample) {
        if sample.cpu_percent > config.cpu_threshold {
            self.dispatch(
                config,
                AlertCategory::Resource,
                format!("⚠️ CPU high: {:.1}%", sample.cpu_percent),
            );
        }
        if sample.ram_percent > config.ram_threshold {
            self.dispatch(
                config,
                AlertCategory::Resource,
                format!("⚠️ RAM high: {:.1}%", sample.ram_percent),
            );
        }
        if sample.disk_percent > config.disk_threshold {
            self.dispatch(
                config,
                AlertCategory::Resource,
                format!("⚠️ Disk usage high: {:.1}%", sample.disk_percent),
            );
        }
        if sample.net_total_bytes > config.net_threshold {
            self.dispatch(
                config,
                AlertCategory::Resource,
                format!("⚠️ Network traffic high: {} bytes", sample.net_total_bytes),
            );
        }
    }

    /// Uptime shrinking is the reboot signal: a monotonically increasing
    /// counter can only drop after a restart. Last uptime is updated
    /// unconditionally.
    pub(crate) fn check_reboot(&mut self, config: &MonitorConfig, sample: &ResourceSample) {
        if sample.uptime_secs < self.last_uptime && config.notify_reboot {
            self.dispatch(config, AlertCategory::Reboot, "🔄 Server rebooted".to_string());
        }
        self.last_uptime = sample.uptime_secs;
    }

    /// Auth-log and session checks, each isolated so one failing never
    /// prevents the others or aborts the loop.
    pub(crate) fn run_security_checks(&self, config: &MonitorConfig) {
        if config.notify_ssh {
            if let Err(e) = self.check_auth_log(config) {
                error!("auth log check failed: {e}");
            }
        }

        for i in 0..self.session_sources.len() {
            let kind = self.session_sources[i].kind();
            let enabled = match kind {
                SessionKind::SshLogin => config.notify_ssh,
                SessionKind::SftpTransfer => config.notify_sftp,
            };
            if !enabled {
                continue;
            }
            if let Err(e) = self.check_sessions(config, i) {
                error!("{} session check failed: {e}", kind.label());
            }
        }
    }

    fn check_auth_log(&self, config: &MonitorConfig) -> Result<(), MonitorError> {
        let tailer = AuthLogTailer::new(&self.paths.auth_log, LogCursor::new(self.paths.log_cursor()));

        for login in tailer.read_new_logins()? {
            if is_excluded(&login.source_ip, &config.excluded_ips) {
                info!("SSH login from {} excluded from alerting", login.source_ip);
                continue;
            }
            let local_ip = self
                .monitor
                .local_ip()
                .unwrap_or_else(|| "unknown".to_string());
            let text = format!(
                "*SSH Connection detected*\n\
                 Connection from *{}* as *{}* on *{}* ({local_ip})\n\
                 Date: {}\n\
                 More information: https://ipinfo.io/{}",
                login.source_ip,
                login.username,
                login.hostname,
                login.formatted_timestamp(),
                login.source_ip,
            );
            info!(
                "new SSH login: {} from {} on {}",
                login.username, login.source_ip, login.hostname
            );
            self.dispatch(config, AlertCategory::SshLogin, text);
        }
        Ok(())
    }

    fn check_sessions(&self, config: &MonitorConfig, index: usize) -> Result<(), MonitorError> {
        let source = &self.session_sources[index];
        let kind = source.kind();
        let tracker = SessionTracker::new(self.paths.session_snapshot(kind));

        let current = source.snapshot()?;
        for identity in tracker.detect_new(&current)? {
            let Some(event) = SessionEvent::from_identity(kind, &identity) else {
                continue;
            };
            let Some(address) = event.address.as_deref() else {
                info!(
                    "{} session {:?} has no resolvable address; suppressed",
                    kind.label(),
                    event.subject
                );
                continue;
            };
            if is_excluded(address, &config.excluded_ips) {
                info!("{} session from {address} excluded from alerting", kind.label());
                continue;
            }

            let category = match kind {
                SessionKind::SshLogin => AlertCategory::SshLogin,
                SessionKind::SftpTransfer => AlertCategory::SftpSession,
            };
            let mut text = format!(
                "*New {} session*\n*{}* from *{address}*",
                kind.label(),
                event.subject
            );
            if let Some(started) = &event.started {
                text.push_str(&format!("\nStarted: {started}"));
            }
            info!("new {} session: {} from {address}", kind.label(), event.subject);
            self.dispatch(config, category, text);
        }
        Ok(())
    }

    fn dispatch(&self, config: &MonitorConfig, category: AlertCategory, text: String) {
        self.dispatcher
            .send(&config.chat_id, &Alert::new(category, text));
    }
}
