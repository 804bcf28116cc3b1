//! Place provider using the Google Places web service.
//!
//! Runs an exact-phrase text search first and tops the results up with a
//! typed nearby search when the text search comes back short.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use binbuddy_core::{
    config::ProviderSettings,
    geo::{distance_km, round_to},
    keywords::{SearchTopic, suggestion_type},
    model::PlaceCandidate,
    plugin::ProviderPlugin,
    ports::{PlacePort, PlaceQuery, PortError, ProviderMeta},
};

const BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";
const PROVIDER_ID: &str = "google";
const DEFAULT_KEY_ENV: &str = "GOOGLE_PLACES_API_KEY";
// Nearby search rejects larger radii.
const MAX_RADIUS_M: u32 = 50_000;

/// Text phrase and nearby-search place type for one topic.
struct SearchTerms {
    phrase: &'static str,
    place_type: &'static str,
}

const TOPIC_TERMS: &[(SearchTopic, SearchTerms)] = &[
    (
        SearchTopic::Electronics,
        SearchTerms {
            phrase: "electronics recycling center",
            place_type: "electronics_store",
        },
    ),
    (
        SearchTopic::Furniture,
        SearchTerms {
            phrase: "furniture donation",
            place_type: "furniture_store",
        },
    ),
    (
        SearchTopic::Textile,
        SearchTerms {
            phrase: "clothing donation",
            place_type: "clothing_store",
        },
    ),
    (
        SearchTopic::Hazardous,
        SearchTerms {
            phrase: "hazardous waste disposal",
            place_type: "point_of_interest",
        },
    ),
    (
        SearchTopic::Recycling,
        SearchTerms {
            phrase: "recycling center",
            place_type: "point_of_interest",
        },
    ),
    (
        SearchTopic::Donation,
        SearchTerms {
            phrase: "donation center",
            place_type: "point_of_interest",
        },
    ),
    (
        SearchTopic::Compost,
        SearchTerms {
            phrase: "composting facility",
            place_type: "point_of_interest",
        },
    ),
];

const GENERAL_TERMS: SearchTerms = SearchTerms {
    phrase: "waste management recycling",
    place_type: "point_of_interest",
};

/// Envelope shared by the text and nearby search endpoints.
#[derive(Debug, Deserialize)]
struct PlacesResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceResult {
    #[serde(default)]
    name: String,
    place_id: Option<String>,
    formatted_address: Option<String>,
    vicinity: Option<String>,
    geometry: Geometry,
    rating: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// Place search backed by Google Places.
pub struct GooglePlacePort {
    client: Client,
    meta: ProviderMeta,
    base_url: String,
    api_key: Option<String>,
    key_env: String,
    limit: usize,
}

impl GooglePlacePort {
    /// Create a new place port bound to the given HTTP client.
    ///
    /// The API key is read once from the environment variable named in
    /// `settings`, falling back to `GOOGLE_PLACES_API_KEY`.
    #[must_use]
    pub fn new(client: Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            meta: provider_meta(),
            base_url: settings.base_url_or(BASE_URL).to_owned(),
            api_key: settings.api_key_or(DEFAULT_KEY_ENV),
            key_env: settings.api_key_env_or(DEFAULT_KEY_ENV).to_owned(),
            limit: settings.limit,
        }
    }

    async fn lookup(&self, query: &PlaceQuery) -> Result<Vec<PlaceCandidate>, PortError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PortError::MissingCredentials(self.key_env.clone()))?;
        let terms = terms_for(SearchTopic::from_hint(&query.hint));
        let location = format!("{},{}", query.latitude, query.longitude);
        let radius = query.radius_m().min(MAX_RADIUS_M).to_string();

        let text_req = self
            .client
            .get(format!("{}/textsearch/json", self.base_url))
            .query(&[
                ("query", format!("\"{}\"", terms.phrase).as_str()),
                ("location", &location),
                ("radius", &radius),
                ("key", key),
            ]);
        let mut found = to_candidates(
            checked(fetch_json::<PlacesResponse>(text_req).await?)?,
            query,
            terms.phrase,
        );
        debug!("google text search returned {} places", found.len());

        if found.len() < self.limit {
            let nearby_req = self
                .client
                .get(format!("{}/nearbysearch/json", self.base_url))
                .query(&[
                    ("location", location.as_str()),
                    ("radius", &radius),
                    ("type", terms.place_type),
                    ("keyword", terms.phrase),
                    ("key", key),
                ]);

            // a failed top-up keeps the text search results
            match fetch_json::<PlacesResponse>(nearby_req).await.and_then(checked) {
                Ok(resp) => merge(&mut found, to_candidates(resp, query, terms.phrase)),
                Err(err) => warn!("google nearby search failed: {err}"),
            }
        }

        found.truncate(self.limit);
        Ok(found)
    }
}

#[async_trait]
impl PlacePort for GooglePlacePort {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    async fn search(&self, query: &PlaceQuery) -> Vec<PlaceCandidate> {
        match self.lookup(query).await {
            Ok(found) => found,
            Err(err) => {
                warn!("google places search for {:?} failed: {err}", query.hint);
                Vec::new()
            }
        }
    }
}

/// Build the plugin bundle for the Google Places provider.
#[must_use]
pub fn plugin(client: Client, settings: &ProviderSettings) -> ProviderPlugin {
    ProviderPlugin::new(
        settings.priority,
        Arc::new(GooglePlacePort::new(client, settings)),
    )
}

fn provider_meta() -> ProviderMeta {
    ProviderMeta {
        id: String::from(PROVIDER_ID),
        name: String::from("Google Places"),
    }
}

fn terms_for(topic: SearchTopic) -> &'static SearchTerms {
    TOPIC_TERMS
        .iter()
        .find(|(candidate, _)| *candidate == topic)
        .map_or(&GENERAL_TERMS, |(_, terms)| terms)
}

/// Turn an error status in the body into a [`PortError`].
fn checked(resp: PlacesResponse) -> Result<PlacesResponse, PortError> {
    match resp.status.as_str() {
        "OK" | "ZERO_RESULTS" => Ok(resp),
        "REQUEST_DENIED" => Err(PortError::MissingCredentials(
            resp.error_message
                .unwrap_or_else(|| "request denied".to_owned()),
        )),
        other => Err(PortError::Malformed(format!(
            "status {other}: {}",
            resp.error_message.as_deref().unwrap_or("no details")
        ))),
    }
}

fn to_candidates(resp: PlacesResponse, query: &PlaceQuery, phrase: &str) -> Vec<PlaceCandidate> {
    resp.results
        .into_iter()
        .filter(|result| !result.name.trim().is_empty())
        .map(|result| {
            let LatLng { lat, lng } = result.geometry.location;
            let name = result.name.trim().to_owned();

            PlaceCandidate {
                suggestion_type: suggestion_type(&name, phrase),
                address: result.formatted_address.or(result.vicinity),
                distance_km: round_to(distance_km(query.latitude, query.longitude, lat, lng), 2),
                name,
                latitude: lat,
                longitude: lng,
                source_provider: PROVIDER_ID.to_owned(),
                rating: result.rating,
                external_id: result.place_id,
            }
        })
        .collect()
}

/// Append `extra` places whose `place_id` is not already present.
fn merge(found: &mut Vec<PlaceCandidate>, extra: Vec<PlaceCandidate>) {
    for candidate in extra {
        let duplicate = candidate.external_id.is_some()
            && found
                .iter()
                .any(|known| known.external_id == candidate.external_id);
        if !duplicate {
            found.push(candidate);
        }
    }
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    // the URL carries the API key, keep it out of error messages
    req.send()
        .await
        .map_err(|err| PortError::from(err.without_url()))?
        .error_for_status()
        .map_err(|err| PortError::from(err.without_url()))?
        .json()
        .await
        .map_err(|err| PortError::from(err.without_url()))
}

#[cfg(test)]
mod tests {
    use binbuddy_core::model::SuggestionType;
    use serde_json::json;

    use super::*;

    fn query() -> PlaceQuery {
        PlaceQuery::new(40.0, -75.0, "old clothes", 25.0)
    }

    fn response(body: serde_json::Value) -> PlacesResponse {
        serde_json::from_value(body).expect("valid places body")
    }

    fn place(id: &str, name: &str, lat: f64) -> serde_json::Value {
        json!({
            "name": name,
            "place_id": id,
            "vicinity": "Main St",
            "geometry": { "location": { "lat": lat, "lng": -75.0 } },
            "rating": 4.5
        })
    }

    #[test]
    fn parses_results() {
        let resp = response(json!({
            "status": "OK",
            "results": [
                place("a", "Goodwill Store", 40.01),
                place("b", "  ", 40.02),
            ]
        }));

        let found = to_candidates(checked(resp).expect("ok status"), &query(), "clothing donation");

        assert_eq!(found.len(), 1, "nameless places are skipped");
        let store = found.first().expect("store");
        assert_eq!(store.external_id.as_deref(), Some("a"));
        assert_eq!(store.address.as_deref(), Some("Main St"));
        assert_eq!(store.rating, Some(4.5));
        assert_eq!(store.suggestion_type, SuggestionType::Donate);
        assert_eq!(store.source_provider, "google");
    }

    #[test]
    fn error_statuses_become_port_errors() {
        let denied = response(json!({
            "status": "REQUEST_DENIED",
            "error_message": "The provided API key is invalid."
        }));
        assert!(
            matches!(checked(denied), Err(PortError::MissingCredentials(_))),
            "denied"
        );

        let over = response(json!({ "status": "OVER_QUERY_LIMIT" }));
        assert!(matches!(checked(over), Err(PortError::Malformed(_))), "quota");

        let empty = response(json!({ "status": "ZERO_RESULTS" }));
        assert!(
            checked(empty).is_ok_and(|resp| resp.results.is_empty()),
            "zero results is not an error"
        );
    }

    #[test]
    fn merge_skips_known_place_ids() {
        let first = to_candidates(
            response(json!({ "status": "OK", "results": [place("a", "Depot", 40.01)] })),
            &query(),
            "recycling center",
        );
        let second = to_candidates(
            response(json!({
                "status": "OK",
                "results": [place("a", "Depot", 40.01), place("c", "Other", 40.03)]
            })),
            &query(),
            "recycling center",
        );

        let mut found = first;
        merge(&mut found, second);

        let ids: Vec<Option<&str>> = found.iter().map(|place| place.external_id.as_deref()).collect();
        assert_eq!(ids, [Some("a"), Some("c")]);
    }

    #[test]
    fn topics_pick_terms() {
        assert_eq!(terms_for(SearchTopic::Textile).place_type, "clothing_store");
        assert_eq!(terms_for(SearchTopic::Compost).phrase, "composting facility");
        assert_eq!(terms_for(SearchTopic::General).phrase, GENERAL_TERMS.phrase);
    }

    #[tokio::test]
    async fn missing_key_yields_empty() {
        let mut settings = ProviderSettings::new("google", 3);
        settings.api_key_env = Some("BINBUDDY_TEST_UNSET_GOOGLE_KEY".to_owned());
        let port = GooglePlacePort::new(Client::new(), &settings);

        assert!(
            matches!(port.lookup(&query()).await, Err(PortError::MissingCredentials(_))),
            "lookup reports the missing key"
        );
        assert!(port.search(&query()).await.is_empty(), "search swallows it");
    }
}
