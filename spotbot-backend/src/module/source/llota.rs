///! Lighthouses and lightships on the Air
use super::{
    FetchError, HttpFetcher, LocalityFilter, SourceAdapter, finalize, lenient_f64, lenient_string,
    parse_records,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use spotbot_common::{DisplayFields, SourceKind, Spot, parse_timestamp};
use std::collections::HashSet;
use std::sync::Arc;

pub const LLOTA_SPOTS_URL: &str = "https://llota.app/api/spots";

/// Raw values above this are taken to be Hz
const HZ_THRESHOLD: f64 = 200.0;
/// Lowest amateur allocation (2200 m band)
const LOWEST_BAND_KHZ: f64 = 135.0;

#[derive(Debug, Deserialize)]
struct RawHistoryEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    comment: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLighthouseSpot {
    #[serde(default, deserialize_with = "lenient_string")]
    callsign: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    frequency: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    mode: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    reference: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    reference_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    country_name: Option<String>,
    #[serde(default)]
    history: Option<Vec<RawHistoryEntry>>,
}

/// The provider mixes Hz and kHz. Values that still land below the lowest
/// band after conversion are logged as suspicious.
pub fn lighthouse_frequency_khz(raw: f64) -> f64 {
    let khz = if raw > HZ_THRESHOLD { raw / 1000.0 } else { raw };
    if khz > 0.0 && khz < LOWEST_BAND_KHZ {
        tracing::warn!(
            "LLOTA frequency {} normalized to {} kHz, below any amateur band; unit may be wrong",
            raw,
            khz
        );
    }
    (khz * 1000.0).round() / 1000.0
}

impl RawLighthouseSpot {
    /// Spot plus the raw timestamp of its latest history entry
    fn into_spot(self) -> Option<(Option<String>, Spot)> {
        let latest = self
            .history
            .unwrap_or_default()
            .into_iter()
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let (comment, timestamp) = match latest {
            Some(entry) => (entry.comment, entry.timestamp),
            None => (None, None),
        };

        let spot = Spot::new(
            SourceKind::LighthouseOrLightship,
            self.callsign.unwrap_or_default(),
            self.reference.unwrap_or_default(),
            lighthouse_frequency_khz(self.frequency.unwrap_or_default()),
        )
        .with_mode(self.mode.unwrap_or_default())
        .with_comment(comment.unwrap_or_default())
        .with_posted_at(timestamp.as_deref().map(parse_timestamp))
        .with_locality(self.country_name.clone())
        .with_display(DisplayFields {
            location_name: self.reference_name,
            region: self.country_name,
            ..DisplayFields::default()
        })
        .validated()?;

        Some((timestamp, spot))
    }
}

/// Sort by timestamp and keep only the latest row per operator
fn keep_latest_per_operator(mut rows: Vec<(Option<String>, Spot)>) -> Vec<Spot> {
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    let mut seen = HashSet::new();
    let mut latest: Vec<Spot> = rows
        .into_iter()
        .rev()
        .map(|(_, spot)| spot)
        .filter(|spot| seen.insert(spot.operator_key()))
        .collect();
    latest.reverse();
    latest
}

pub fn parse_lighthouse_spots(items: Vec<Value>) -> Vec<Spot> {
    let rows = parse_records::<RawLighthouseSpot>(SourceKind::LighthouseOrLightship, items)
        .into_iter()
        .filter_map(RawLighthouseSpot::into_spot)
        .collect();
    keep_latest_per_operator(rows)
}

pub struct LlotaSource {
    fetcher: Arc<HttpFetcher>,
    url: String,
}

impl LlotaSource {
    pub fn new(fetcher: Arc<HttpFetcher>, url: Option<String>) -> Self {
        Self {
            fetcher,
            url: url.unwrap_or_else(|| LLOTA_SPOTS_URL.to_string()),
        }
    }
}

#[async_trait]
impl SourceAdapter for LlotaSource {
    fn kind(&self) -> SourceKind {
        SourceKind::LighthouseOrLightship
    }

    async fn fetch(&self, filter: &LocalityFilter) -> Result<Vec<Spot>, FetchError> {
        tracing::info!("Fetching data from [{}]...", self.url);
        let items = self.fetcher.get_json_array(&self.url).await?;
        let spots = finalize(parse_lighthouse_spots(items), filter);
        tracing::info!("LLOTA: {} spots after filtering", spots.len());
        Ok(spots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frequency_heuristic() {
        assert_eq!(lighthouse_frequency_khz(14_074_000.0), 14074.0);
        assert_eq!(lighthouse_frequency_khz(7074.0), 7.074);
        assert_eq!(lighthouse_frequency_khz(144.3), 144.3);
        assert_eq!(lighthouse_frequency_khz(0.0), 0.0);
    }

    #[test]
    fn test_latest_history_entry_wins() {
        let items = vec![json!({
            "callsign": "YO4LH",
            "frequency": 14250000,
            "mode": "SSB",
            "reference": "ROU-001",
            "reference_name": "Constanta Lighthouse",
            "country_name": "Romania",
            "history": [
                {"comment": "QRV", "timestamp": "2024-07-01T10:00:00"},
                {"comment": "QSY 7.150", "timestamp": "2024-07-01T11:30:00"},
                {"comment": "early", "timestamp": "2024-07-01T09:00:00"}
            ]
        })];

        let spots = parse_lighthouse_spots(items);
        assert_eq!(spots.len(), 1);
        assert_eq!(spots[0].comment, "QSY 7.150");
        assert_eq!(spots[0].posted_at.as_ref().unwrap().time, "11:30:00");
        assert_eq!(spots[0].display.location_name.as_deref(), Some("Constanta Lighthouse"));
        assert_eq!(spots[0].locality.as_deref(), Some("Romania"));
    }

    #[test]
    fn test_collapse_keeps_latest_row_per_operator() {
        let row = |call: &str, reference: &str, ts: &str| {
            json!({
                "callsign": call,
                "frequency": 7150000,
                "reference": reference,
                "country_name": "Romania",
                "history": [{"comment": "", "timestamp": ts}]
            })
        };
        let items = vec![
            row("YO4LH", "ROU-002", "2024-07-01 12:00:00"),
            row("YO5XX", "ROU-010", "2024-07-01 10:00:00"),
            row("yo4lh", "ROU-001", "2024-07-01 08:00:00"),
        ];

        let spots = parse_lighthouse_spots(items);
        let refs: Vec<_> = spots.iter().map(|s| s.location_ref.as_str()).collect();
        assert_eq!(refs, vec!["ROU-010", "ROU-002"]);
    }

    #[test]
    fn test_missing_history_is_tolerated() {
        let items = vec![json!({"callsign": "F5LH", "frequency": 3.7, "reference": "FRA-001", "history": null})];
        let spots = parse_lighthouse_spots(items);
        assert_eq!(spots.len(), 1);
        assert_eq!(spots[0].comment, "");
        assert!(spots[0].posted_at.is_none());
    }
}
