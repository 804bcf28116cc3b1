//! Place provider querying OpenStreetMap through the Overpass API.

use std::collections::HashMap;
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

const BASE_URL: &str = "https://overpass-api.de/api/interpreter";
const PROVIDER_ID: &str = "overpass";

// Tag selectors per topic. Each selector is queried for nodes and ways.
const TOPIC_FILTERS: &[(SearchTopic, &[&str])] = &[
    (
        SearchTopic::Electronics,
        &[
            r#"["amenity"="recycling"]["recycling:electrical_appliances"="yes"]"#,
            r#"["amenity"="recycling"]["recycling:small_appliances"="yes"]"#,
            r#"["amenity"="recycling"]["recycling:computers"="yes"]"#,
        ],
    ),
    (
        SearchTopic::Furniture,
        &[
            r#"["shop"="second_hand"]"#,
            r#"["shop"="charity"]"#,
            r#"["amenity"="waste_transfer_station"]"#,
        ],
    ),
    (
        SearchTopic::Textile,
        &[
            r#"["amenity"="recycling"]["recycling:clothes"="yes"]"#,
            r#"["shop"="charity"]"#,
        ],
    ),
    (
        SearchTopic::Hazardous,
        &[
            r#"["amenity"="recycling"]["recycling:batteries"="yes"]"#,
            r#"["amenity"="waste_transfer_station"]"#,
        ],
    ),
    (
        SearchTopic::Recycling,
        &[r#"["amenity"="recycling"]["recycling_type"="centre"]"#],
    ),
    (
        SearchTopic::Donation,
        &[r#"["shop"="charity"]"#, r#"["shop"="second_hand"]"#],
    ),
    (
        SearchTopic::Compost,
        &[
            r#"["amenity"="recycling"]["recycling:green_waste"="yes"]"#,
            r#"["amenity"="recycling"]["recycling:organic"="yes"]"#,
            r#"["landuse"="composting"]"#,
        ],
    ),
];

const GENERAL_FILTERS: &[&str] = &[
    r#"["amenity"="recycling"]"#,
    r#"["amenity"="waste_transfer_station"]"#,
];

/// Response body of the interpreter endpoint.
#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<Element>,
}

/// A node (with `lat`/`lon`) or way (with `center`).
#[derive(Debug, Deserialize)]
struct Element {
    #[serde(rename = "type")]
    kind: String,
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<Center>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct Center {
    lat: f64,
    lon: f64,
}

/// Place search backed by Overpass.
pub struct OverpassPlacePort {
    client: Client,
    meta: ProviderMeta,
    base_url: String,
    limit: usize,
}

impl OverpassPlacePort {
    /// Create a new place port bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            meta: provider_meta(),
            base_url: settings.base_url_or(BASE_URL).to_owned(),
            limit: settings.limit,
        }
    }

    async fn lookup(&self, query: &PlaceQuery) -> Result<Vec<PlaceCandidate>, PortError> {
        let topic = SearchTopic::from_hint(&query.hint);
        let script = build_query(topic, query, self.limit);
        debug!("overpass query for {topic:?}: {script}");

        let req = self.client.post(&self.base_url).form(&[("data", script)]);
        let resp = fetch_json::<OverpassResponse>(req).await?;

        Ok(to_candidates(resp, query, self.limit))
    }
}

#[async_trait]
impl PlacePort for OverpassPlacePort {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    async fn search(&self, query: &PlaceQuery) -> Vec<PlaceCandidate> {
        match self.lookup(query).await {
            Ok(found) => found,
            Err(err) => {
                warn!("overpass search for {:?} failed: {err}", query.hint);
                Vec::new()
            }
        }
    }
}

/// Build the plugin bundle for the Overpass provider.
#[must_use]
pub fn plugin(client: Client, settings: &ProviderSettings) -> ProviderPlugin {
    ProviderPlugin::new(
        settings.priority,
        Arc::new(OverpassPlacePort::new(client, settings)),
    )
}

fn provider_meta() -> ProviderMeta {
    ProviderMeta {
        id: String::from(PROVIDER_ID),
        name: String::from("OpenStreetMap (Overpass)"),
    }
}

fn filters_for(topic: SearchTopic) -> &'static [&'static str] {
    TOPIC_FILTERS
        .iter()
        .find(|(candidate, _)| *candidate == topic)
        .map_or(GENERAL_FILTERS, |(_, filters)| filters)
}

fn build_query(topic: SearchTopic, query: &PlaceQuery, limit: usize) -> String {
    let around = format!(
        "(around:{},{},{})",
        query.radius_m(),
        query.latitude,
        query.longitude
    );

    let selectors: String = filters_for(topic)
        .iter()
        .map(|filter| format!("  node{filter}{around};\n  way{filter}{around};\n"))
        .collect();

    format!("[out:json][timeout:25];\n(\n{selectors});\nout center {limit};")
}

fn to_candidates(resp: OverpassResponse, query: &PlaceQuery, limit: usize) -> Vec<PlaceCandidate> {
    resp.elements
        .into_iter()
        .filter_map(|element| to_candidate(element, query))
        .take(limit)
        .collect()
}

fn to_candidate(element: Element, query: &PlaceQuery) -> Option<PlaceCandidate> {
    let (latitude, longitude) = match (&element.center, element.lat, element.lon) {
        (_, Some(lat), Some(lon)) => (lat, lon),
        (Some(center), _, _) => (center.lat, center.lon),
        _ => return None,
    };

    let kind = place_kind(&element.tags);
    let name = element
        .tags
        .get("name")
        .or_else(|| element.tags.get("operator"))
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| default_name(&kind));
    let term = format!("{kind} {}", query.hint);

    Some(PlaceCandidate {
        suggestion_type: suggestion_type(&name, &term),
        address: address(&element.tags),
        distance_km: round_to(
            distance_km(query.latitude, query.longitude, latitude, longitude),
            2,
        ),
        name,
        latitude,
        longitude,
        source_provider: PROVIDER_ID.to_owned(),
        rating: None,
        external_id: Some(format!("{}/{}", element.kind, element.id)),
    })
}

/// The `shop`, `amenity` or `landuse` value, e.g. `charity` or `composting`.
fn place_kind(tags: &HashMap<String, String>) -> String {
    tags.get("shop")
        .or_else(|| tags.get("amenity"))
        .or_else(|| tags.get("landuse"))
        .cloned()
        .unwrap_or_default()
}

fn default_name(kind: &str) -> String {
    match kind {
        "charity" => "Charity shop",
        "second_hand" => "Second-hand shop",
        "waste_transfer_station" => "Waste transfer station",
        "recycling" => "Recycling point",
        "composting" => "Composting site",
        _ => "Disposal point",
    }
    .to_owned()
}

fn address(tags: &HashMap<String, String>) -> Option<String> {
    let street = match (tags.get("addr:street"), tags.get("addr:housenumber")) {
        (Some(street), Some(number)) => Some(format!("{number} {street}")),
        (Some(street), None) => Some(street.clone()),
        _ => None,
    };
    let city = tags.get("addr:city").cloned();

    match (street, city) {
        (Some(street), Some(city)) => Some(format!("{street}, {city}")),
        (street, city) => street.or(city),
    }
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
