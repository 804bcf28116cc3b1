//! Place provider using the Nominatim free-text search.
//!
//! Nominatim asks clients to stay below one request per second, so the port
//! spaces its requests by the configured `rate_limit_ms`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

use binbuddy_core::{
    config::ProviderSettings,
    geo::{distance_km, round_to},
    keywords::{SearchTopic, suggestion_type},
    model::PlaceCandidate,
    plugin::ProviderPlugin,
    ports::{PlacePort, PlaceQuery, PortError, ProviderMeta},
};

const BASE_URL: &str = "https://nominatim.openstreetmap.org";
const PROVIDER_ID: &str = "nominatim";
const KM_PER_DEGREE: f64 = 111.32;

// Search phrases per topic, tried in order until enough places are found.
const TOPIC_PHRASES: &[(SearchTopic, &[&str])] = &[
    (
        SearchTopic::Electronics,
        &["electronics recycling", "e-waste recycling center"],
    ),
    (
        SearchTopic::Furniture,
        &["furniture donation", "thrift store", "waste transfer station"],
    ),
    (
        SearchTopic::Textile,
        &["clothing donation", "textile recycling"],
    ),
    (
        SearchTopic::Hazardous,
        &["hazardous waste facility", "battery recycling"],
    ),
    (SearchTopic::Recycling, &["recycling center"]),
    (SearchTopic::Donation, &["charity shop", "thrift store"]),
    (
        SearchTopic::Compost,
        &["composting facility", "green waste drop-off"],
    ),
];

const GENERAL_PHRASES: &[&str] = &["recycling center", "waste transfer station"];

/// Single search hit from `/search?format=jsonv2`.
#[derive(Debug, Deserialize)]
struct SearchHit {
    place_id: Option<u64>,
    lat: String,
    lon: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    display_name: String,
}

/// Bounding box as `left,top,right,bottom`, the order Nominatim expects.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ViewBox {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl ViewBox {
    fn around(latitude: f64, longitude: f64, radius_km: f64) -> Self {
        let lat_delta = radius_km / KM_PER_DEGREE;
        let lon_delta = radius_km / (KM_PER_DEGREE * latitude.to_radians().cos().max(0.01));

        Self {
            left: (longitude - lon_delta).max(-180.0),
            top: (latitude + lat_delta).min(90.0),
            right: (longitude + lon_delta).min(180.0),
            bottom: (latitude - lat_delta).max(-90.0),
        }
    }

    fn to_param(self) -> String {
        format!("{},{},{},{}", self.left, self.top, self.right, self.bottom)
    }
}

/// Place search backed by Nominatim.
pub struct NominatimPlacePort {
    client: Client,
    meta: ProviderMeta,
    base_url: String,
    limit: usize,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimPlacePort {
    /// Create a new place port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            meta: provider_meta(),
            base_url: settings.base_url_or(BASE_URL).to_owned(),
            limit: settings.limit,
            min_interval: settings.rate_limit(),
            last_request: Mutex::new(None),
        }
    }

    async fn lookup(&self, query: &PlaceQuery) -> Vec<PlaceCandidate> {
        let topic = SearchTopic::from_hint(&query.hint);
        let viewbox = ViewBox::around(query.latitude, query.longitude, query.radius_km);
        let mut found: Vec<PlaceCandidate> = Vec::new();

        for phrase in phrases_for(topic) {
            if found.len() >= self.limit {
                break;
            }

            match self.search_phrase(phrase, viewbox).await {
                Ok(hits) => {
                    debug!("nominatim returned {} hits for {phrase:?}", hits.len());
                    for hit in hits {
                        let Some(candidate) = to_candidate(hit, query, phrase) else {
                            continue;
                        };
                        let seen = candidate.external_id.is_some()
                            && found
                                .iter()
                                .any(|known| known.external_id == candidate.external_id);
                        if !seen {
                            found.push(candidate);
                        }
                    }
                }
                Err(err) => warn!("nominatim search for {phrase:?} failed: {err}"),
            }
        }

        found.truncate(self.limit);
        found
    }

    async fn search_phrase(&self, phrase: &str, viewbox: ViewBox) -> Result<Vec<SearchHit>, PortError> {
        self.wait_turn().await;

        let limit = self.limit.to_string();
        let req = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", phrase),
                ("format", "jsonv2"),
                ("limit", &limit),
                ("bounded", "1"),
                ("viewbox", &viewbox.to_param()),
            ]);

        fetch_json::<Vec<SearchHit>>(req).await
    }

    // Sleeps until `min_interval` has passed since the previous request.
    async fn wait_turn(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl PlacePort for NominatimPlacePort {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    async fn search(&self, query: &PlaceQuery) -> Vec<PlaceCandidate> {
        self.lookup(query).await
    }
}

/// Build the plugin bundle for the Nominatim provider.
#[must_use]
pub fn plugin(client: Client, settings: &ProviderSettings) -> ProviderPlugin {
    ProviderPlugin::new(
        settings.priority,
        Arc::new(NominatimPlacePort::new(client, settings)),
    )
}

fn provider_meta() -> ProviderMeta {
    ProviderMeta {
        id: String::from(PROVIDER_ID),
        name: String::from("OpenStreetMap (Nominatim)"),
    }
}

fn phrases_for(topic: SearchTopic) -> &'static [&'static str] {
    TOPIC_PHRASES
        .iter()
        .find(|(candidate, _)| *candidate == topic)
        .map_or(GENERAL_PHRASES, |(_, phrases)| phrases)
}

fn to_candidate(hit: SearchHit, query: &PlaceQuery, phrase: &str) -> Option<PlaceCandidate> {
    let latitude = hit.lat.trim().parse::<f64>().ok()?;
    let longitude = hit.lon.trim().parse::<f64>().ok()?;

    let display_name = hit.display_name.trim();
    let name = match hit.name.trim() {
        "" => display_name
            .split(',')
            .next()
            .map(str::trim)
            .filter(|first| !first.is_empty())?
            .to_owned(),
        named => named.to_owned(),
    };

    Some(PlaceCandidate {
        suggestion_type: suggestion_type(&name, phrase),
        address: (!display_name.is_empty()).then(|| display_name.to_owned()),
        distance_km: round_to(
            distance_km(query.latitude, query.longitude, latitude, longitude),
            2,
        ),
        name,
        latitude,
        longitude,
        source_provider: PROVIDER_ID.to_owned(),
        rating: None,
        external_id: hit.place_id.map(|id| id.to_string()),
    })
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    req.send()
        .await
        .map_err(PortError::from)?
        .error_for_status()
        .map_err(PortError::from)?
        .json()
        .await
        .map_err(PortError::from)
}

#[cfg(test)]
mod tests {
    use binbuddy_core::model::SuggestionType;
    use serde_json::json;

    use super::*;

    fn query(hint: &str) -> PlaceQuery {
        PlaceQuery::new(40.0, -75.0, hint, 25.0)
    }

    fn hits(body: serde_json::Value) -> Vec<SearchHit> {
        serde_json::from_value(body).expect("valid nominatim body")
    }

    #[test]
    fn viewbox_covers_the_radius() {
        let viewbox = ViewBox::around(40.0, -75.0, 25.0);

        assert!((viewbox.top - 40.2246).abs() < 0.001, "top {}", viewbox.top);
        assert!((viewbox.bottom - 39.7754).abs() < 0.001, "bottom {}", viewbox.bottom);
        assert!((viewbox.left + 75.2932).abs() < 0.001, "left {}", viewbox.left);
        assert!((viewbox.right + 74.7068).abs() < 0.001, "right {}", viewbox.right);
        assert_eq!(viewbox.to_param().split(',').count(), 4);
    }

    #[test]
    fn viewbox_is_clamped_near_the_poles() {
        let viewbox = ViewBox::around(89.9, 179.9, 25.0);
        assert!(viewbox.top <= 90.0, "top {}", viewbox.top);
        assert!(viewbox.right <= 180.0, "right {}", viewbox.right);
        assert!(viewbox.left >= -180.0, "left {}", viewbox.left);
    }

    #[test]
    fn phrases_follow_topics() {
        assert_eq!(
            phrases_for(SearchTopic::from_hint("old sofa")).first(),
            Some(&"furniture donation")
        );
        assert_eq!(phrases_for(SearchTopic::General), GENERAL_PHRASES);
    }

    #[test]
    fn parses_hits() {
        let parsed = hits(json!([
            {
                "place_id": 42,
                "lat": "40.0100",
                "lon": "-75.0000",
                "name": "Goodwill",
                "display_name": "Goodwill, 1 Main St, Springfield"
            },
            {
                "place_id": 43,
                "lat": "40.0200",
                "lon": "-75.0000",
                "name": "",
                "display_name": "County Transfer Station, Route 9"
            },
            { "lat": "not a number", "lon": "-75.0", "display_name": "Broken" }
        ]));

        let found: Vec<PlaceCandidate> = parsed
            .into_iter()
            .filter_map(|hit| to_candidate(hit, &query("donation"), "thrift store"))
            .collect();

        assert_eq!(found.len(), 2, "unparsable coordinates are skipped");

        let goodwill = found.first().expect("goodwill");
        assert_eq!(goodwill.suggestion_type, SuggestionType::Donate);
        assert_eq!(goodwill.external_id.as_deref(), Some("42"));
        assert_eq!(
            goodwill.address.as_deref(),
            Some("Goodwill, 1 Main St, Springfield")
        );
        assert!((goodwill.distance_km - 1.11).abs() < 0.01, "got {}", goodwill.distance_km);

        let station = found.get(1).expect("station");
        assert_eq!(station.name, "County Transfer Station");
        assert_eq!(station.source_provider, "nominatim");
    }

    #[test]
    fn disposal_terms_tag_dispose() {
        let parsed = hits(json!([{
            "lat": "40.0",
            "lon": "-75.0",
            "name": "Route 9",
            "display_name": "Route 9"
        }]));
        let candidate = parsed
            .into_iter()
            .find_map(|hit| to_candidate(hit, &query("sofa"), "waste transfer station"))
            .expect("candidate");
        assert_eq!(candidate.suggestion_type, SuggestionType::Dispose);
    }

    #[tokio::test]
    async fn spaces_consecutive_requests() {
        let mut settings = ProviderSettings::new("nominatim", 2);
        settings.rate_limit_ms = 200;
        let port = NominatimPlacePort::new(Client::new(), &settings);

        let start = Instant::now();
        port.wait_turn().await;
        port.wait_turn().await;

        assert!(
            start.elapsed() >= Duration::from_millis(200),
            "second request should wait"
        );
    }
}
