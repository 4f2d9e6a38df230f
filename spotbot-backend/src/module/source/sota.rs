///! Summits on the Air
use super::{
    FetchError, HttpFetcher, LocalityFilter, SourceAdapter, finalize, khz_from_mhz, lenient_f64,
    lenient_string, parse_records,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use spotbot_common::{DisplayFields, SourceKind, Spot, parse_timestamp};
use std::sync::Arc;

pub const SOTA_SPOTS_URL: &str = "https://api2.sota.org.uk/api/spots/-1/all";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSummitSpot {
    #[serde(default, deserialize_with = "lenient_string")]
    time_stamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    activator_callsign: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    activator_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    association_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    summit_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    summit_details: Option<String>,
    /// MHz
    #[serde(default, deserialize_with = "lenient_f64")]
    frequency: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    mode: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    comments: Option<String>,
}

/// "MM-001" under association "YO" becomes "YO/MM-001"
fn summit_reference(association: Option<&str>, summit: &str) -> String {
    let summit = summit.trim();
    match association.map(str::trim) {
        Some(assoc) if !assoc.is_empty() && !summit.is_empty() && !summit.contains('/') => {
            format!("{}/{}", assoc, summit)
        }
        _ => summit.to_string(),
    }
}

impl RawSummitSpot {
    fn into_spot(self) -> Option<Spot> {
        let location_ref = summit_reference(
            self.association_code.as_deref(),
            self.summit_code.as_deref().unwrap_or_default(),
        );
        Spot::new(
            SourceKind::SummitActivation,
            self.activator_callsign.unwrap_or_default(),
            location_ref,
            khz_from_mhz(self.frequency.unwrap_or_default()),
        )
        .with_mode(self.mode.unwrap_or_default())
        .with_comment(self.comments.unwrap_or_default())
        .with_posted_at(self.time_stamp.as_deref().map(parse_timestamp))
        .with_locality(self.association_code)
        .with_display(DisplayFields {
            operator_name: self.activator_name,
            location_name: self.summit_details,
            ..DisplayFields::default()
        })
        .validated()
    }
}

pub fn parse_summit_spots(items: Vec<Value>) -> Vec<Spot> {
    parse_records::<RawSummitSpot>(SourceKind::SummitActivation, items)
        .into_iter()
        .filter_map(RawSummitSpot::into_spot)
        .collect()
}

pub struct SotaSource {
    fetcher: Arc<HttpFetcher>,
    url: String,
}

impl SotaSource {
    pub fn new(fetcher: Arc<HttpFetcher>, url: Option<String>) -> Self {
        Self {
            fetcher,
            url: url.unwrap_or_else(|| SOTA_SPOTS_URL.to_string()),
        }
    }
}

#[async_trait]
impl SourceAdapter for SotaSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SummitActivation
    }

    async fn fetch(&self, filter: &LocalityFilter) -> Result<Vec<Spot>, FetchError> {
        tracing::info!("Fetching data from [{}]...", self.url);
        let items = self.fetcher.get_json_array(&self.url).await?;
        let spots = finalize(parse_summit_spots(items), filter);
        tracing::info!("SOTA: {} spots after filtering", spots.len());
        Ok(spots)
    }
}
