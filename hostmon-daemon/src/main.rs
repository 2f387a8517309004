use anyhow::Result;
use hostmon_core::{DaemonPaths, MonitorConfig, MonitorLoop};
use std::env;
use std::path::PathBuf;
use tracing::info;

fn path_from_env(var: &str, default: &str) -> PathBuf {
    env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = path_from_env("HOSTMON_CONFIG", "config.json");
    let auth_log = path_from_env("HOSTMON_AUTH_LOG", "/var/log/auth.log");
    let state_dir = path_from_env("HOSTMON_STATE_DIR", "/var/lib/hostmon");

    // Credentials passed through the environment are persisted into the
    // config file so they survive restarts without re-exporting.
    if let (Ok(token), Ok(chat)) = (env::var("BOT_TOKEN"), env::var("CHAT_ID")) {
        if !token.is_empty() && !chat.is_empty() {
            info!("taking notification credentials from environment");
            let mut config = MonitorConfig::load(&config_path);
            config.bot_token = token;
            config.chat_id = chat;
            config.save(&config_path)?;
        }
    }

    info!(
        "hostmond starting: config={}, auth_log={}, state_dir={}",
        config_path.display(),
        auth_log.display(),
        state_dir.display()
    );

    let paths = DaemonPaths::new(config_path, auth_log, state_dir);
    MonitorLoop::new(paths).run()
}
