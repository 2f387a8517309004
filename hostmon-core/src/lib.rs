pub mod authlog;
pub mod config;
pub mod daemon;
pub mod error;
pub mod ipfilter;
pub mod metrics;
pub mod monitor;
pub mod notifier;
pub mod sessions;

#[cfg(test)]
mod tests;

pub use authlog::{AuthLogTailer, LogCursor, SshLogin};
pub use config::MonitorConfig;
pub use daemon::{DaemonPaths, MonitorLoop, POLL_INTERVAL, SESSION_CHECK_INTERVAL};
pub use error::MonitorError;
pub use ipfilter::is_excluded;
pub use metrics::ResourceSample;
pub use monitor::SystemMonitor;
pub use notifier::{
    Alert, AlertCategory, AlertDispatcher, DeliveryOutcome, Notifier, RetryPolicy, Sleeper,
    TelegramNotifier, ThreadSleeper,
};
pub use sessions::{
    LoginSessionSource, SessionEvent, SessionKind, SessionSource, SessionTracker,
    SftpSessionSource,
};
