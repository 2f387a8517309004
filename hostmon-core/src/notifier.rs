use std::time::Duration;
use tracing::{info, warn};

/// Logical category of an alert; not persisted anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCategory {
    Resource,
    Reboot,
    SshLogin,
    SftpSession,
}

/// An ephemeral message bound for the notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub category: AlertCategory,
    pub text: String,
}

impl Alert {
    pub fn new(category: AlertCategory, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
        }
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Worth retrying: network error, rate limit, server-side failure.
    Transient,
    /// Misconfiguration or rejection; retrying cannot help.
    Permanent,
}

/// The notification channel boundary. The core needs nothing beyond this.
pub trait Notifier {
    fn deliver(&self, destination: &str, text: &str) -> DeliveryOutcome;

    /// False while credentials are missing or placeholders; unconfigured
    /// channels are never attempted.
    fn is_configured(&self) -> bool;
}

/// Sends messages through the Telegram bot API.
pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            bot_token: bot_token.into(),
        }
    }

    pub fn bot_token(&self) -> &str {
        &self.bot_token
    }
}

impl Notifier for TelegramNotifier {
    fn deliver(&self, destination: &str, text: &str) -> DeliveryOutcome {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = serde_json::json!({
            "chat_id": destination,
            "text": text,
            "parse_mode": "Markdown",
        });

        match self.client.post(&url).json(&body).send() {
            Ok(response) if response.status().is_success() => DeliveryOutcome::Delivered,
            Ok(response)
                if response.status().is_server_error() || response.status().as_u16() == 429 =>
            {
                warn!("telegram delivery failed with status {}", response.status());
                DeliveryOutcome::Transient
            }
            Ok(response) => {
                warn!("telegram rejected message with status {}", response.status());
                DeliveryOutcome::Permanent
            }
            Err(e) => {
                warn!("telegram request error: {e}");
                DeliveryOutcome::Transient
            }
        }
    }

    fn is_configured(&self) -> bool {
        !self.bot_token.is_empty()
    }
}

/// Bounded retry: fixed delay, transient failures only.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Injection point for the inter-attempt delay so retry behavior is
/// testable without real time passing.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Delivers alerts with bounded retries. Never propagates failure to the
/// caller: a missed alert is preferred to a stalled or crashed monitor.
pub struct AlertDispatcher {
    notifier: Box<dyn Notifier>,
    policy: RetryPolicy,
    sleeper: Box<dyn Sleeper>,
}

impl AlertDispatcher {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        Self {
            notifier,
            policy: RetryPolicy::default(),
            sleeper: Box::new(ThreadSleeper),
        }
    }

    pub fn with_policy(
        notifier: Box<dyn Notifier>,
        policy: RetryPolicy,
        sleeper: Box<dyn Sleeper>,
    ) -> Self {
        Self {
            notifier,
            policy,
            sleeper,
        }
    }

    /// Attempts delivery of a single alert. Each message is independent:
    /// exhausting retries for one never blocks the next beyond the retry
    /// delay already spent.
    pub fn send(&self, destination: &str, alert: &Alert) {
        if !self.notifier.is_configured() || destination.is_empty() {
            warn!("notification channel not configured; dropping alert: {}", alert.text);
            return;
        }

        for attempt in 1..=self.policy.max_attempts {
            match self.notifier.deliver(destination, &alert.text) {
                DeliveryOutcome::Delivered => {
                    info!("alert delivered (attempt {attempt}): {}", alert.text);
                    return;
                }
                DeliveryOutcome::Permanent => {
                    warn!("alert rejected permanently, giving up: {}", alert.text);
                    return;
                }
                DeliveryOutcome::Transient => {
                    if attempt < self.policy.max_attempts {
                        warn!(
                            "delivery attempt {attempt}/{} failed, retrying",
                            self.policy.max_attempts
                        );
                        self.sleeper.sleep(self.policy.delay);
                    }
                }
            }
        }
        warn!(
            "alert dropped after {} attempts: {}",
            self.policy.max_attempts, alert.text
        );
    }
}
