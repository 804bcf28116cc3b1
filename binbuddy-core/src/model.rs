//! Domain data structures for classifications, place candidates, and results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Top-level waste category assigned to an item.
pub enum MainCategory {
    /// Plastics, paper, glass, and metal that go into regular recycling.
    Recyclable,
    /// Food scraps, yard waste, and other compostables.
    Organic,
    /// Electronics and e-waste, including chargers and appliances.
    Electronic,
    /// Clothing, shoes, and other fabrics.
    Textile,
    /// Bulky furniture and mattresses.
    Furniture,
    /// Items in good enough condition to give away.
    Donation,
    /// Paint, chemicals, batteries, and other hazardous material.
    Hazardous,
    /// Anything that does not fit elsewhere.
    General,
}

impl MainCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Recyclable,
        Self::Organic,
        Self::Electronic,
        Self::Textile,
        Self::Furniture,
        Self::Donation,
        Self::Hazardous,
        Self::General,
    ];

    /// Canonical lower-case slug.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recyclable => "recyclable",
            Self::Organic => "organic",
            Self::Electronic => "electronic",
            Self::Textile => "textile",
            Self::Furniture => "furniture",
            Self::Donation => "donation",
            Self::Hazardous => "hazardous",
            Self::General => "general",
        }
    }

    /// Parse a category slug, accepting the legacy names older classifier
    /// prompts produced (`e-waste`, `textile_recycle`, `plastic`, ...).
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let slug = raw.trim().to_lowercase().replace([' ', '-'], "_");

        let category = match slug.as_str() {
            "recyclable" | "recycling" | "plastic" | "glass" | "paper" | "metal" => {
                Self::Recyclable
            }
            "organic" | "compost" => Self::Organic,
            "electronic" | "electronics" | "e_waste" | "ewaste" => Self::Electronic,
            "textile" | "textiles" | "textile_recycle" => Self::Textile,
            "furniture" => Self::Furniture,
            "donation" => Self::Donation,
            "hazardous" => Self::Hazardous,
            "general" | "general_trash" => Self::General,
            _ => return None,
        };

        Some(category)
    }
}

impl fmt::Display for MainCategory {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How sure the classifier was about its answer.
pub enum Confidence {
    /// Low confidence.
    Low,
    /// Medium confidence.
    Medium,
    /// High confidence.
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        formatter.write_str(label)
    }
}

/// Prefix marking a hint that needs no provider lookup.
pub const NEAREST_PREFIX: &str = "nearest_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
/// What kind of disposal location to look for.
pub enum LocationHint {
    /// `nearest_<token>`: answer with a synthetic "Nearest ..." suggestion.
    Nearest(String),
    /// Free-text phrase handed to the place providers.
    Search(String),
}

impl LocationHint {
    /// Hint used when the classifier gave none.
    #[must_use]
    pub fn default_hint() -> Self {
        Self::Nearest("disposal".to_owned())
    }

    /// Parse a raw hint string.
    ///
    /// Returns `None` for blank input. A `nearest_` prefix followed by
    /// anything other than a simple `[a-z0-9_]` token is demoted to a search
    /// phrase made of the remainder.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let Some(remainder) = trimmed.strip_prefix(NEAREST_PREFIX) else {
            return Some(Self::Search(trimmed.to_owned()));
        };

        let token = remainder.to_lowercase();
        let is_simple = !token.is_empty()
            && token
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_');

        if is_simple {
            return Some(Self::Nearest(token));
        }

        let phrase = remainder.replace('_', " ");
        let phrase = phrase.trim();
        if phrase.is_empty() {
            None
        } else {
            Some(Self::Search(phrase.to_owned()))
        }
    }
}

impl fmt::Display for LocationHint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest(token) => write!(formatter, "{NEAREST_PREFIX}{token}"),
            Self::Search(phrase) => formatter.write_str(phrase),
        }
    }
}

impl From<String> for LocationHint {
    fn from(raw: String) -> Self {
        Self::parse(&raw).unwrap_or_else(Self::default_hint)
    }
}

impl From<LocationHint> for String {
    fn from(hint: LocationHint) -> Self {
        hint.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// What the user is expected to do at a suggested place.
pub enum SuggestionType {
    /// Drop the item off for recycling or collection.
    Dropoff,
    /// Give the item away.
    Donate,
    /// Throw the item away at a dump or transfer station.
    Dispose,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// WGS84 coordinate pair.
pub struct Coordinates {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl Coordinates {
    /// Construct a coordinate pair.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both values are finite and inside the valid lat/lon ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Clone)]
/// Input for one end-to-end classification.
pub struct ClassificationRequest {
    /// Encoded image bytes as uploaded.
    pub image: Vec<u8>,
    /// Mass entered by the user, if any.
    pub user_mass_kg: Option<f64>,
    /// Latitude of the user.
    pub latitude: f64,
    /// Longitude of the user.
    pub longitude: f64,
}

impl ClassificationRequest {
    /// Construct a request without a user-supplied mass.
    #[must_use]
    pub fn new(image: Vec<u8>, latitude: f64, longitude: f64) -> Self {
        Self {
            image,
            user_mass_kg: None,
            latitude,
            longitude,
        }
    }

    /// Attach a user-supplied mass in kilograms.
    #[must_use]
    pub fn with_user_mass(mut self, mass_kg: f64) -> Self {
        self.user_mass_kg = Some(mass_kg);
        self
    }

    /// Location of the user.
    #[must_use]
    pub const fn origin(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

impl fmt::Debug for ClassificationRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClassificationRequest")
            .field("image_len", &self.image.len())
            .field("user_mass_kg", &self.user_mass_kg)
            .field("latitude", &self.latitude)
            .field("longitude", &self.longitude)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
/// Untrusted classifier output. Any key may be missing or hold any type.
pub struct RawClassification(pub Map<String, Value>);

impl RawClassification {
    /// First value present under any of `keys`, in order. `null` counts as absent.
    #[must_use]
    pub fn first_of(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .filter_map(|key| self.0.get(*key))
            .find(|value| !value.is_null())
    }

    /// Extract a JSON object from model output text.
    ///
    /// Accepts bare JSON, JSON wrapped in Markdown code fences, and JSON
    /// surrounded by prose.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Json`] when no JSON can be parsed and
    /// [`PortError::Malformed`] when the JSON is not an object.
    pub fn from_model_text(text: &str) -> Result<Self, PortError> {
        let body = strip_code_fence(text.trim());

        let value = match serde_json::from_str::<Value>(body) {
            Ok(value) => value,
            Err(err) => {
                let embedded = body
                    .find('{')
                    .zip(body.rfind('}'))
                    .and_then(|(start, end)| body.get(start..=end));
                match embedded {
                    Some(object) => serde_json::from_str::<Value>(object)?,
                    None => return Err(PortError::Json(err)),
                }
            }
        };

        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(PortError::Malformed(format!(
                "expected a JSON object from the classifier, got {other}"
            ))),
        }
    }
}

impl From<Map<String, Value>> for RawClassification {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest)
        .trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Fully populated classification. Every field is valid after normalization.
pub struct NormalizedClassification {
    /// Top-level category.
    pub main_category: MainCategory,
    /// Specific item type, e.g. `plastic_bottles`.
    pub specific_subtype: String,
    /// Human-friendly item name.
    pub display_name: String,
    /// Estimated mass in kilograms, always positive.
    pub estimated_mass_kg: f64,
    /// Classifier confidence.
    pub confidence: Confidence,
    /// Avoided emissions per kilogram handled properly.
    pub co2_rate_kg_per_kg: f64,
    /// Display color as `#RRGGBB`.
    pub color_hex: String,
    /// Icon reference as `iconSet/iconName`.
    pub icon_ref: String,
    /// Ordered disposal guidance, never empty.
    pub disposal_steps: Vec<String>,
    /// What kind of place to search for.
    pub location_query_hint: LocationHint,
    /// Whether the item can go into recycling.
    pub is_recyclable: bool,
    /// Whether the item is worth donating.
    pub is_donation_worthy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A place where the item could be dropped off, donated, or disposed of.
pub struct PlaceCandidate {
    /// Place name.
    pub name: String,
    /// Postal address, when the provider supplied one.
    pub address: Option<String>,
    /// Latitude of the place.
    pub latitude: f64,
    /// Longitude of the place.
    pub longitude: f64,
    /// Great-circle distance from the user.
    pub distance_km: f64,
    /// Suggested action at this place.
    pub suggestion_type: SuggestionType,
    /// Identifier of the provider that produced the candidate.
    pub source_provider: String,
    /// Provider rating, when available.
    pub rating: Option<f64>,
    /// Provider-specific identifier, when available.
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Final output of one classification request.
pub struct DisposalResult {
    /// Normalized classification.
    pub classification: NormalizedClassification,
    /// Avoided emissions in kilograms, rounded to two decimals.
    pub co2_saved_kg: f64,
    /// Up to five suggestions ordered by distance.
    pub suggestions: Vec<PlaceCandidate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Identity used for rate limiting, e.g. a client IP.
pub struct ClientId(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Lifecycle state of a stored item.
pub enum RecordStatus {
    /// Classified, not yet disposed of.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Record handed to the persistence collaborator.
pub struct StoredRecord {
    /// Unique record identifier.
    pub id: Uuid,
    /// When the result was produced.
    pub recorded_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: RecordStatus,
    /// Where the user was when classifying.
    pub origin: Coordinates,
    /// The result itself.
    pub result: DisposalResult,
}

impl StoredRecord {
    /// Wrap a fresh result as a pending record.
    #[must_use]
    pub fn pending(origin: Coordinates, result: DisposalResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            status: RecordStatus::Pending,
            origin,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_legacy_category_names() {
        assert_eq!(
            MainCategory::parse_lenient("E-Waste"),
            Some(MainCategory::Electronic)
        );
        assert_eq!(
            MainCategory::parse_lenient("textile_recycle"),
            Some(MainCategory::Textile)
        );
        assert_eq!(
            MainCategory::parse_lenient("general_trash"),
            Some(MainCategory::General)
        );
        assert_eq!(MainCategory::parse_lenient("spaceship"), None);
    }

    #[test]
    fn nearest_hint_requires_simple_token() {
        assert_eq!(
            LocationHint::parse("nearest_recycling_bin"),
            Some(LocationHint::Nearest("recycling_bin".to_owned()))
        );
        assert_eq!(
            LocationHint::parse("nearest_thrift store"),
            Some(LocationHint::Search("thrift store".to_owned()))
        );
        assert_eq!(LocationHint::parse("nearest_"), None);
        assert_eq!(LocationHint::parse("   "), None);
    }

    #[test]
    fn hint_round_trips_through_string() {
        let hint = LocationHint::Nearest("recycling".to_owned());
        let encoded = serde_json::to_value(&hint).expect("serialize hint");
        assert_eq!(encoded, json!("nearest_recycling"));
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "```json\n{\"main_category\": \"organic\"}\n```";
        let raw = RawClassification::from_model_text(text).expect("fenced json");
        assert_eq!(raw.first_of(&["main_category"]), Some(&json!("organic")));
    }

    #[test]
    fn extracts_json_surrounded_by_prose() {
        let text = "Sure! Here is the result: {\"category\": \"glass\"} Hope that helps.";
        let raw = RawClassification::from_model_text(text).expect("embedded json");
        assert_eq!(raw.first_of(&["category"]), Some(&json!("glass")));
    }

    #[test]
    fn rejects_non_object_json() {
        let err = RawClassification::from_model_text("[1, 2, 3]").expect_err("array");
        assert!(matches!(err, PortError::Malformed(_)), "got {err}");
    }

    #[test]
    fn first_of_skips_null_values() {
        let raw = RawClassification::from(
            json!({ "category": null, "main_category": "furniture" })
                .as_object()
                .cloned()
                .expect("object literal"),
        );
        assert_eq!(
            raw.first_of(&["category", "main_category"]),
            Some(&json!("furniture"))
        );
    }

    #[test]
    fn validates_coordinates() {
        assert!(Coordinates::new(40.0, -75.0).is_valid(), "valid pair");
        assert!(!Coordinates::new(91.0, 0.0).is_valid(), "latitude too large");
        assert!(!Coordinates::new(0.0, f64::NAN).is_valid(), "NaN longitude");
    }
}
