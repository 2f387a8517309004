use crate::config::MonitorConfig;
use crate::daemon::{DaemonPaths, MonitorLoop};
use crate::error::MonitorError;
use crate::metrics::ResourceSample;
use crate::notifier::test_support;
use crate::notifier::DeliveryOutcome;
use crate::sessions::{SessionKind, SessionSource};
use std::fs;
use std::sync::{Arc, Mutex};

struct FakeLoginSource {
    identities: Vec<String>,
}

impl SessionSource for FakeLoginSource {
    fn kind(&self) -> SessionKind {
        SessionKind::SshLogin
    }

    fn snapshot(&self) -> Result<Vec<String>, MonitorError> {
        Ok(self.identities.clone())
    }
}

struct Fixture {
    dir: tempfile::TempDir,
    monitor_loop: MonitorLoop,
    log: Arc<Mutex<Vec<String>>>,
    config: MonitorConfig,
}

fn fixture(sources: Vec<Box<dyn SessionSource>>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    fs::create_dir_all(&state_dir).unwrap();

    let paths = DaemonPaths::new(
        dir.path().join("config.json"),
        dir.path().join("auth.log"),
        &state_dir,
    );
    let (dispatcher, log) = test_support::dispatcher(vec![DeliveryOutcome::Delivered]);
    let monitor_loop = MonitorLoop::with_parts(paths, dispatcher, "token".to_string(), sources);

    let mut config = MonitorConfig::default();
    config.bot_token = "token".to_string();
    config.chat_id = "chat".to_string();

    Fixture {
        dir,
        monitor_loop,
        log,
        config,
    }
}

fn auth_log_path(f: &Fixture) -> std::path::PathBuf {
    f.dir.path().join("auth.log")
}

const ACCEPTED_LINE: &str =
    "Jun  1 10:00:00 host sshd[123]: Accepted password for alice from 8.8.8.8 port 22 ssh2\n";

// Scenario A: CPU threshold 80, sampled 95 => one resource alert per cycle
// while the condition persists.
#[test]
fn cpu_over_threshold_alerts_every_cycle() {
    let mut f = fixture(vec![]);
    f.config.cpu_threshold = 80.0;
    let sample = ResourceSample {
        cpu_percent: 95.0,
        ..Default::default()
    };

    f.monitor_loop.check_resources(&f.config, &sample);
    {
        let log = f.log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("CPU"));
        assert!(log[0].contains("95.0"));
    }

    // Still 95 next cycle: no hysteresis, it alerts again.
    f.monitor_loop.check_resources(&f.config, &sample);
    assert_eq!(f.log.lock().unwrap().len(), 2);
}

#[test]
fn each_breached_metric_alerts_independently() {
    let mut f = fixture(vec![]);
    f.config.net_threshold = 1_000_000;
    let sample = ResourceSample {
        cpu_percent: 95.0,
        ram_percent: 90.0,
        disk_percent: 99.0,
        net_total_bytes: 5_000_000,
        ..Default::default()
    };

    f.monitor_loop.check_resources(&f.config, &sample);
    assert_eq!(f.log.lock().unwrap().len(), 4);
}

#[test]
fn metrics_under_threshold_stay_silent() {
    let f = fixture(vec![]);
    let sample = ResourceSample {
        cpu_percent: 10.0,
        ram_percent: 10.0,
        disk_percent: 10.0,
        net_total_bytes: 100,
        ..Default::default()
    };

    f.monitor_loop.check_resources(&f.config, &sample);
    assert!(f.log.lock().unwrap().is_empty());
}

// Scenario D: uptime dropping from 50000 to 120 => exactly one reboot alert.
#[test]
fn uptime_drop_raises_one_reboot_alert() {
    let mut f = fixture(vec![]);
    let before = ResourceSample {
        uptime_secs: 50_000,
        ..Default::default()
    };
    let after = ResourceSample {
        uptime_secs: 120,
        ..Default::default()
    };

    f.monitor_loop.check_reboot(&f.config, &before);
    assert!(f.log.lock().unwrap().is_empty());

    f.monitor_loop.check_reboot(&f.config, &after);
    {
        let log = f.log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("rebooted"));
    }

    // Uptime growing again: no further alert.
    let later = ResourceSample {
        uptime_secs: 130,
        ..Default::default()
    };
    f.monitor_loop.check_reboot(&f.config, &later);
    assert_eq!(f.log.lock().unwrap().len(), 1);
}

#[test]
fn reboot_alert_respects_toggle() {
    let mut f = fixture(vec![]);
    f.config.notify_reboot = false;

    f.monitor_loop.check_reboot(
        &f.config,
        &ResourceSample {
            uptime_secs: 50_000,
            ..Default::default()
        },
    );
    f.monitor_loop.check_reboot(
        &f.config,
        &ResourceSample {
            uptime_secs: 120,
            ..Default::default()
        },
    );
    assert!(f.log.lock().unwrap().is_empty());
}

// Scenario B: accepted login from 8.8.8.8 with private ranges excluded =>
// one SSH alert naming user and address.
#[test]
fn new_ssh_login_outside_exclusions_alerts() {
    let mut f = fixture(vec![]);
    f.config.excluded_ips = vec!["10.0.0.0/8".to_string()];
    fs::write(auth_log_path(&f), ACCEPTED_LINE).unwrap();

    f.monitor_loop.run_security_checks(&f.config);

    let log = f.log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("alice"));
    assert!(log[0].contains("8.8.8.8"));
}

// Scenario C: same line but the source address is excluded => zero alerts.
#[test]
fn excluded_ssh_login_is_suppressed() {
    let mut f = fixture(vec![]);
    f.config.excluded_ips = vec!["8.8.8.8".to_string()];
    fs::write(auth_log_path(&f), ACCEPTED_LINE).unwrap();

    f.monitor_loop.run_security_checks(&f.config);
    assert!(f.log.lock().unwrap().is_empty());
}

#[test]
fn auth_log_lines_are_consumed_once() {
    let mut f = fixture(vec![]);
    f.config.excluded_ips = vec![];
    fs::write(auth_log_path(&f), ACCEPTED_LINE).unwrap();

    f.monitor_loop.run_security_checks(&f.config);
    f.monitor_loop.run_security_checks(&f.config);
    assert_eq!(f.log.lock().unwrap().len(), 1);
}

#[test]
fn notify_ssh_disabled_skips_log_check() {
    let mut f = fixture(vec![]);
    f.config.notify_ssh = false;
    f.config.excluded_ips = vec![];
    fs::write(auth_log_path(&f), ACCEPTED_LINE).unwrap();

    f.monitor_loop.run_security_checks(&f.config);
    assert!(f.log.lock().unwrap().is_empty());
}

#[test]
fn session_diff_alerts_filters_and_suppresses() {
    let source = FakeLoginSource {
        identities: vec![
            "alice pts/0 2026-08-27 10:15 (8.8.8.8)".to_string(),
            // Console login, no resolvable address: suppressed.
            "root tty1 2026-08-27 08:00".to_string(),
            // Excluded range: suppressed.
            "bob pts/1 2026-08-27 10:16 (10.1.2.3)".to_string(),
        ],
    };
    let mut f = fixture(vec![Box::new(source)]);
    f.config.excluded_ips = vec!["10.0.0.0/8".to_string()];

    f.monitor_loop.run_security_checks(&f.config);
    {
        let log = f.log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("alice"));
        assert!(log[0].contains("8.8.8.8"));
    }

    // Unchanged snapshot next check: nothing new.
    f.monitor_loop.run_security_checks(&f.config);
    assert_eq!(f.log.lock().unwrap().len(), 1);
}

#[test]
fn missing_auth_log_does_not_block_session_checks() {
    let source = FakeLoginSource {
        identities: vec!["carol pts/2 2026-08-27 11:00 (203.0.113.5)".to_string()],
    };
    let mut f = fixture(vec![Box::new(source)]);
    f.config.excluded_ips = vec![];
    // No auth.log written: the tail step reports source-unavailable, the
    // session diff still runs.
    f.monitor_loop.run_security_checks(&f.config);

    let log = f.log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].contains("carol"));
}
