///! Spot source adapters
///!
///! One adapter per provider. Every adapter normalizes its payload into
///! [`Spot`]s, applies the optional locality filter and drops identical rows.
///! A failed fetch is an error, never an empty list.

pub mod bota;
pub mod http;
pub mod llota;
pub mod pota;
pub mod sota;
pub mod wwbota;

pub use bota::{BotaSource, HeadlessPageLoader, PageLoader};
pub use http::HttpFetcher;
pub use llota::LlotaSource;
pub use pota::PotaSource;
pub use sota::SotaSource;
pub use wwbota::WwbotaSource;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use spotbot_common::{SourceKind, Spot};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("malformed payload from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("page {url} failed to load: {message}")]
    PageLoad { url: String, message: String },
}

impl FetchError {
    /// Connection problems and 500/502/504 are worth another try
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => matches!(status, 500 | 502 | 504),
            FetchError::Decode { .. } | FetchError::PageLoad { .. } => false,
        }
    }
}

/// Prefix filter on a spot's locality code; empty means "everything"
#[derive(Debug, Clone, Default)]
pub struct LocalityFilter {
    prefixes: Vec<String>,
}

impl LocalityFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = prefixes
            .into_iter()
            .flat_map(|p| {
                p.as_ref()
                    .split_whitespace()
                    .map(str::to_uppercase)
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { prefixes }
    }

    pub fn matches(&self, spot: &Spot) -> bool {
        if self.prefixes.is_empty() {
            return true;
        }
        match &spot.locality {
            Some(locality) => {
                let locality = locality.to_uppercase();
                self.prefixes.iter().any(|p| locality.starts_with(p.as_str()))
            }
            None => false,
        }
    }
}

/// A provider of spots
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Current snapshot of spots, in provider order
    async fn fetch(&self, filter: &LocalityFilter) -> Result<Vec<Spot>, FetchError>;
}

/// Apply the locality filter, then drop rows identical to an earlier one.
pub fn finalize(spots: Vec<Spot>, filter: &LocalityFilter) -> Vec<Spot> {
    let mut kept: Vec<Spot> = Vec::with_capacity(spots.len());
    for spot in spots.into_iter().filter(|s| filter.matches(s)) {
        if !kept.contains(&spot) {
            kept.push(spot);
        }
    }
    kept
}

/// Deserialize each array element on its own so one odd row does not sink
/// the whole payload.
pub(crate) fn parse_records<T: DeserializeOwned>(kind: SourceKind, items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping malformed {} record: {}", kind.label(), e);
                None
            }
        })
        .collect()
}

/// Finite number or numeric string; anything else is treated as missing
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()))
}

/// String, or a number rendered as one; null is missing
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

/// Round to whole Hz so unit conversions do not leave float noise behind
fn round_to_hz(khz: f64) -> f64 {
    (khz * 1000.0).round() / 1000.0
}

pub(crate) fn khz_from_hz(hz: f64) -> f64 {
    round_to_hz(hz / 1000.0)
}

pub(crate) fn khz_from_mhz(mhz: f64) -> f64 {
    round_to_hz(mhz * 1000.0)
}
