use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: i64,
    /// Forum topic (message thread) the notifications go to
    #[serde(default)]
    pub topic_id: Option<i64>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_disable_preview")]
    pub disable_web_page_preview: bool,
}

fn default_api_base() -> String {
    DEFAULT_TELEGRAM_API.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_disable_preview() -> bool {
    true
}

impl TelegramConfig {
    pub fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base.trim_end_matches('/'), self.token)
    }

    /// Destination description safe to log (no token)
    pub fn target(&self) -> String {
        match self.topic_id {
            Some(topic) => format!("chat {} / topic {}", self.chat_id, topic),
            None => format!("chat {}", self.chat_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Sends tried per message before giving up (rate-limit waits excluded)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff after the n-th failed send is `base * 2^(n-1)`
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Pause after every delivery, successful or not
    #[serde(default = "default_throttle_millis")]
    pub throttle_millis: u64,
    /// Upper bound on consecutive "retry after" waits for one message
    #[serde(default = "default_max_rate_limit_waits")]
    pub max_rate_limit_waits: u32,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_secs() -> u64 {
    1
}

fn default_throttle_millis() -> u64 {
    500
}

fn default_max_rate_limit_waits() -> u32 {
    10
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            throttle_millis: default_throttle_millis(),
            max_rate_limit_waits: default_max_rate_limit_waits(),
        }
    }
}

impl DeliveryConfig {
    /// Delay before the next send after `failures` transient failures
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        Duration::from_secs(self.backoff_base_secs.saturating_mul(1u64 << exponent))
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_millis)
    }
}
