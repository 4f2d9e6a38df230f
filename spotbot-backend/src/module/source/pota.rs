///! Parks on the Air
use super::{
    FetchError, HttpFetcher, LocalityFilter, SourceAdapter, finalize, khz_from_hz, lenient_f64,
    lenient_string, parse_records,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use spotbot_common::{DisplayFields, SourceKind, Spot, parse_timestamp};
use std::sync::Arc;

pub const POTA_SPOTS_URL: &str = "https://api.pota.app/spot/activator";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParkSpot {
    #[serde(default, deserialize_with = "lenient_string")]
    activator: Option<String>,
    /// Hz
    #[serde(default, deserialize_with = "lenient_f64")]
    frequency: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    mode: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    reference: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    location_desc: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    grid4: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    comments: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    spot_time: Option<String>,
}

impl RawParkSpot {
    fn into_spot(self) -> Option<Spot> {
        Spot::new(
            SourceKind::ParkActivation,
            self.activator.unwrap_or_default(),
            self.reference.unwrap_or_default(),
            khz_from_hz(self.frequency.unwrap_or_default()),
        )
        .with_mode(self.mode.unwrap_or_default())
        .with_comment(self.comments.unwrap_or_default())
        .with_posted_at(self.spot_time.as_deref().map(parse_timestamp))
        .with_locality(self.grid4)
        .with_display(DisplayFields {
            location_name: self.name,
            region: self.location_desc,
            ..DisplayFields::default()
        })
        .validated()
    }
}

pub fn parse_park_spots(items: Vec<Value>) -> Vec<Spot> {
    parse_records::<RawParkSpot>(SourceKind::ParkActivation, items)
        .into_iter()
        .filter_map(RawParkSpot::into_spot)
        .collect()
}

pub struct PotaSource {
    fetcher: Arc<HttpFetcher>,
    url: String,
}

impl PotaSource {
    pub fn new(fetcher: Arc<HttpFetcher>, url: Option<String>) -> Self {
        Self {
            fetcher,
            url: url.unwrap_or_else(|| POTA_SPOTS_URL.to_string()),
        }
    }
}

#[async_trait]
impl SourceAdapter for PotaSource {
    fn kind(&self) -> SourceKind {
        SourceKind::ParkActivation
    }

    async fn fetch(&self, filter: &LocalityFilter) -> Result<Vec<Spot>, FetchError> {
        tracing::info!("Fetching data from [{}]...", self.url);
        let items = self.fetcher.get_json_array(&self.url).await?;
        let spots = finalize(parse_park_spots(items), filter);
        tracing::info!("POTA: {} spots after filtering", spots.len());
        Ok(spots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample() -> Value {
        json!([
            {
                "spotId": 1,
                "activator": "YO9ABC",
                "frequency": "14285000",
                "mode": "SSB",
                "reference": "RO-0123",
                "name": "Bucegi Natural Park",
                "locationDesc": "RO-PH",
                "grid4": "KN25",
                "comments": "QRV now",
                "spotTime": "2024-05-01T14:30:00"
            },
            {
                "activator": "K1ABC",
                "frequency": 7074000,
                "mode": "FT8",
                "reference": "US-0001",
                "name": "Acadia",
                "locationDesc": "US-ME",
                "grid4": "FN54",
                "comments": null
            },
            { "activator": "", "reference": "US-0002", "frequency": 7074000 },
            "not an object"
        ])
    }

    fn items(value: Value) -> Vec<Value> {
        match value {
            Value::Array(items) => items,
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn test_parse_park_spots() {
        let spots = parse_park_spots(items(sample()));
        assert_eq!(spots.len(), 2);

        let first = &spots[0];
        assert_eq!(first.source, SourceKind::ParkActivation);
        assert_eq!(first.operator_id, "YO9ABC");
        assert_eq!(first.location_ref, "RO-0123");
        assert_eq!(first.frequency_khz, 14285.0);
        assert_eq!(first.comment, "QRV now");
        assert_eq!(first.locality.as_deref(), Some("KN25"));
        assert_eq!(first.display.location_name.as_deref(), Some("Bucegi Natural Park"));
        assert_eq!(first.posted_at.as_ref().map(|t| t.time.as_str()), Some("14:30:00"));

        assert_eq!(spots[1].frequency_khz, 7074.0);
        assert_eq!(spots[1].comment, "");
    }

    #[tokio::test]
    async fn test_fetch_applies_grid_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample()))
            .mount(&server)
            .await;

        let fetcher = Arc::new(HttpFetcher::new(&HttpConfig::default()).unwrap());
        let source = PotaSource::new(fetcher, Some(server.uri()));
        let spots = source.fetch(&LocalityFilter::new(["KN"])).await.unwrap();

        assert_eq!(spots.len(), 1);
        assert_eq!(spots[0].operator_id, "YO9ABC");
    }

    #[tokio::test]
    #[ignore = "hits the public POTA API"]
    async fn test_live_spot_list() {
        let fetcher = Arc::new(HttpFetcher::new(&HttpConfig::default()).unwrap());
        let spots = PotaSource::new(fetcher, None)
            .fetch(&LocalityFilter::default())
            .await
            .unwrap();
        assert!(spots.iter().all(Spot::is_valid));
    }
}
