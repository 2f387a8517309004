use thiserror::Error;

/// Failure taxonomy for the monitoring core.
///
/// None of these are fatal to the daemon: a source that cannot be read skips
/// its step with state unchanged, exhausted deliveries are logged and
/// swallowed, and invalid configuration falls back to defaults. Lines or
/// records that merely fail to parse are discarded without producing an
/// error at all.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("delivery failed after {attempts} attempts")]
    DeliveryExhausted { attempts: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
