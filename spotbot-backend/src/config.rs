use anyhow::Context;
use serde::{Deserialize, Serialize};
use spotbot_frontend::{DeliveryConfig, TelegramConfig};
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

pub static CONFIG: OnceLock<SpotbotConfig> = OnceLock::new();

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotbotConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    pub telegram: TelegramConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub watchlist: WatchlistConfig,

    #[serde(default)]
    pub sources: SourcesConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,

    #[serde(default = "default_log_prefix")]
    pub prefix: String,

    /// Rotated files older than this are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_prefix() -> String {
    "spotbot".to_string()
}

fn default_retention_days() -> u64 {
    3
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            prefix: default_log_prefix(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pause between the end of one poll cycle and the start of the next
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Run the first cycle immediately instead of after one interval
    #[serde(default)]
    pub run_on_start: bool,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            run_on_start: false,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per fetch, the first one included
    #[serde(default = "default_http_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_millis")]
    pub backoff_base_millis: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_http_max_attempts() -> u32 {
    3
}

fn default_backoff_base_millis() -> u64 {
    1000
}

fn default_user_agent() -> String {
    concat!("spotbot/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            max_attempts: default_http_max_attempts(),
            backoff_base_millis: default_backoff_base_millis(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_millis)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchlistConfig {
    /// Callsign fragments; a spot is tracked when its operator contains one
    #[serde(default)]
    pub callsigns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Overrides the provider's public endpoint
    #[serde(default)]
    pub url: Option<String>,

    /// Locality prefixes; empty keeps every spot
    #[serde(default)]
    pub filter: Vec<String>,
}

impl Default for PollSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            filter: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WwbotaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Listen to the push stream instead of polling the spot list
    #[serde(default = "default_true")]
    pub stream: bool,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub filter: Vec<String>,

    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,

    /// Reconnect when the stream delivers nothing for this long
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

fn default_reconnect_secs() -> u64 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    300
}

impl Default for WwbotaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stream: true,
            url: None,
            filter: Vec::new(),
            reconnect_secs: default_reconnect_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotaConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub url: Option<String>,

    /// Time given to the page scripts after navigation
    #[serde(default = "default_render_wait_secs")]
    pub render_wait_secs: u64,
}

fn default_render_wait_secs() -> u64 {
    5
}

impl Default for BotaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            render_wait_secs: default_render_wait_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub pota: PollSourceConfig,

    #[serde(default)]
    pub sota: PollSourceConfig,

    #[serde(default)]
    pub llota: PollSourceConfig,

    #[serde(default)]
    pub wwbota: WwbotaConfig,

    #[serde(default)]
    pub bota: BotaConfig,
}

impl SpotbotConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config file {}", path))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: SpotbotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.telegram.token.trim().is_empty() {
            anyhow::bail!("telegram.token must not be empty");
        }
        if self.scheduler.interval_secs == 0 {
            anyhow::bail!("scheduler.interval_secs must be greater than zero");
        }
        if self.delivery.max_attempts == 0 {
            anyhow::bail!("delivery.max_attempts must be at least 1");
        }
        if self.http.max_attempts == 0 {
            anyhow::bail!("http.max_attempts must be at least 1");
        }
        if self.sources.wwbota.idle_timeout_secs == 0 {
            anyhow::bail!("sources.wwbota.idle_timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

/// Load the configuration once for the whole process
pub fn read_config(path: &str) -> anyhow::Result<&'static SpotbotConfig> {
    let config = SpotbotConfig::from_file(path)?;
    Ok(CONFIG.get_or_init(|| config))
}
