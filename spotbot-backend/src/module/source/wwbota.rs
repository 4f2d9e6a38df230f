///! World Wide Bunkers on the Air
///!
///! The same endpoint serves the spot list and, with
///! `Accept: text/event-stream`, a push stream of single spots. The type tag
///! (QRV, QRT, QSY...) stands in for the comment in change detection while
///! the activator's free text is only displayed.
use super::{
    FetchError, HttpFetcher, LocalityFilter, SourceAdapter, finalize, khz_from_hz, lenient_f64,
    lenient_string, parse_records,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use spotbot_common::{DisplayFields, SourceKind, Spot, parse_timestamp};
use std::sync::Arc;

pub const WWBOTA_SPOTS_URL: &str = "https://api.wwbota.net/spots/";

#[derive(Debug, Default, Deserialize)]
struct RawReference {
    #[serde(default, deserialize_with = "lenient_string")]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBunkerSpot {
    #[serde(default, deserialize_with = "lenient_string")]
    call: Option<String>,
    #[serde(default)]
    references: Option<Vec<RawReference>>,
    /// Hz
    #[serde(default, deserialize_with = "lenient_f64")]
    freq: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    mode: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    spot_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    comment: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    time: Option<String>,
}

impl RawBunkerSpot {
    fn into_spot(self) -> Option<Spot> {
        let reference = self
            .references
            .and_then(|refs| refs.into_iter().next())
            .and_then(|r| r.reference)
            .unwrap_or_default();
        let note = self.comment.filter(|c| !c.trim().is_empty());

        Spot::new(
            SourceKind::BunkerActivation,
            self.call.unwrap_or_default(),
            reference.clone(),
            khz_from_hz(self.freq.unwrap_or_default()),
        )
        .with_mode(self.mode.unwrap_or_default())
        .with_comment(self.spot_type.unwrap_or_default().to_uppercase())
        .with_posted_at(self.time.as_deref().map(parse_timestamp))
        .with_locality(Some(reference))
        .with_display(DisplayFields {
            note,
            ..DisplayFields::default()
        })
        .validated()
    }
}

pub fn parse_bunker_spots(items: Vec<Value>) -> Vec<Spot> {
    parse_records::<RawBunkerSpot>(SourceKind::BunkerActivation, items)
        .into_iter()
        .filter_map(RawBunkerSpot::into_spot)
        .collect()
}

/// Decode one stream event. `Ok(None)` is well-formed JSON that is not a
/// usable spot.
pub fn parse_bunker_event(data: &str) -> Result<Option<Spot>, serde_json::Error> {
    let raw: RawBunkerSpot = serde_json::from_str(data)?;
    Ok(raw.into_spot())
}

/// Polling fallback for when the stream is switched off
pub struct WwbotaSource {
    fetcher: Arc<HttpFetcher>,
    url: String,
}

impl WwbotaSource {
    pub fn new(fetcher: Arc<HttpFetcher>, url: Option<String>) -> Self {
        Self {
            fetcher,
            url: url.unwrap_or_else(|| WWBOTA_SPOTS_URL.to_string()),
        }
    }
}

#[async_trait]
impl SourceAdapter for WwbotaSource {
    fn kind(&self) -> SourceKind {
        SourceKind::BunkerActivation
    }

    async fn fetch(&self, filter: &LocalityFilter) -> Result<Vec<Spot>, FetchError> {
        tracing::info!("Fetching data from [{}]...", self.url);
        let items = self.fetcher.get_json_array(&self.url).await?;
        let spots = finalize(parse_bunker_spots(items), filter);
        tracing::info!("WWBOTA: {} spots after filtering", spots.len());
        Ok(spots)
    }
}
