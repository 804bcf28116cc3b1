//! Turns untrusted classifier output into a [`NormalizedClassification`].
//!
//! Normalization is field-by-field and total: a missing, mistyped, or
//! out-of-range field is replaced by its default instead of rejecting the whole
//! record. Each field is looked up under its current key first and then under
//! the keys older classifier prompts used.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde_json::Value;

use crate::co2::default_rate;
use crate::model::{Confidence, LocationHint, MainCategory, NormalizedClassification, RawClassification};

/// Subtype used when the classifier gave none.
pub const DEFAULT_SUBTYPE: &str = "unidentified_item";
/// Display name used when the classifier gave none.
pub const DEFAULT_DISPLAY_NAME: &str = "Unidentified item";
/// Mass used when the classifier gave no usable estimate.
pub const DEFAULT_MASS_KG: f64 = 0.2;
/// Neutral gray.
pub const DEFAULT_COLOR_HEX: &str = "#757575";
/// Neutral trash icon.
pub const DEFAULT_ICON_REF: &str = "material/MdDelete";
/// Guidance used when the classifier gave no disposal steps.
pub const DEFAULT_DISPOSAL_STEP: &str = "Consult local waste management guidelines";

const CATEGORY_KEYS: &[&str] = &["main_category", "category"];
const SUBTYPE_KEYS: &[&str] = &["specific_category", "specific_subtype", "subtype"];
const DISPLAY_NAME_KEYS: &[&str] = &["display_name", "name"];
const MASS_KEYS: &[&str] = &[
    "estimated_weight_kg",
    "estimated_mass_kg",
    "weight_kg",
    "weight",
];
const CONFIDENCE_KEYS: &[&str] = &["confidence"];
const CO2_RATE_KEYS: &[&str] = &["co2_rate_kg_per_kg", "co2_rate"];
const COLOR_KEYS: &[&str] = &["color_hex", "color"];
const ICON_KEYS: &[&str] = &["icon_ref", "icon"];
const STEPS_KEYS: &[&str] = &["disposal_steps", "disposal_methods", "methods"];
const HINT_KEYS: &[&str] = &["location_query_hint", "location_query"];
const RECYCLABLE_KEYS: &[&str] = &["is_recyclable", "recyclable"];
const DONATION_KEYS: &[&str] = &["is_donation_worthy", "donation_worthy"];

static COLOR_HEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^#[0-9A-Fa-f]{6}$").expect("color pattern is valid"));

/// Normalize a raw classification. Never fails.
#[must_use]
pub fn normalize(raw: &RawClassification) -> NormalizedClassification {
    let main_category = raw
        .first_of(CATEGORY_KEYS)
        .and_then(Value::as_str)
        .and_then(MainCategory::parse_lenient)
        .unwrap_or_else(|| defaulted("main_category", MainCategory::General));

    let specific_subtype = text(raw, SUBTYPE_KEYS)
        .unwrap_or_else(|| defaulted("specific_subtype", DEFAULT_SUBTYPE.to_owned()));

    let display_name = text(raw, DISPLAY_NAME_KEYS)
        .unwrap_or_else(|| defaulted("display_name", DEFAULT_DISPLAY_NAME.to_owned()));

    let estimated_mass_kg = raw
        .first_of(MASS_KEYS)
        .and_then(number)
        .filter(|mass| *mass > 0.0)
        .unwrap_or_else(|| defaulted("estimated_mass_kg", DEFAULT_MASS_KG));

    let confidence = raw
        .first_of(CONFIDENCE_KEYS)
        .and_then(Value::as_str)
        .and_then(parse_confidence)
        .unwrap_or_else(|| defaulted("confidence", Confidence::Medium));

    let co2_rate_kg_per_kg = raw
        .first_of(CO2_RATE_KEYS)
        .and_then(number)
        .filter(|rate| *rate >= 0.0)
        .unwrap_or_else(|| defaulted("co2_rate_kg_per_kg", default_rate(main_category)));

    let color_hex = raw
        .first_of(COLOR_KEYS)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|color| COLOR_HEX.is_match(color))
        .map_or_else(|| defaulted("color_hex", DEFAULT_COLOR_HEX.to_owned()), str::to_owned);

    let icon_ref = raw
        .first_of(ICON_KEYS)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|icon| is_icon_ref(icon))
        .map_or_else(|| defaulted("icon_ref", DEFAULT_ICON_REF.to_owned()), str::to_owned);

    let disposal_steps = raw
        .first_of(STEPS_KEYS)
        .map(steps)
        .filter(|list| !list.is_empty())
        .unwrap_or_else(|| defaulted("disposal_steps", vec![DEFAULT_DISPOSAL_STEP.to_owned()]));

    let location_query_hint = raw
        .first_of(HINT_KEYS)
        .and_then(Value::as_str)
        .and_then(LocationHint::parse)
        .unwrap_or_else(|| defaulted("location_query_hint", LocationHint::default_hint()));

    let is_recyclable = flag(raw, RECYCLABLE_KEYS, "is_recyclable");
    let is_donation_worthy = flag(raw, DONATION_KEYS, "is_donation_worthy");

    NormalizedClassification {
        main_category,
        specific_subtype,
        display_name,
        estimated_mass_kg,
        confidence,
        co2_rate_kg_per_kg,
        color_hex,
        icon_ref,
        disposal_steps,
        location_query_hint,
        is_recyclable,
        is_donation_worthy,
    }
}

fn defaulted<T>(field: &str, value: T) -> T {
    debug!("classification field `{field}` missing or invalid, using default");
    value
}

fn text(raw: &RawClassification, keys: &[&str]) -> Option<String> {
    raw.first_of(keys)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

// Numbers may arrive as JSON numbers or numeric strings.
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|number| number.is_finite())
}

fn parse_confidence(raw: &str) -> Option<Confidence> {
    let cleaned = raw.trim().trim_end_matches('%').trim().to_lowercase();
    match cleaned.as_str() {
        "low" => Some(Confidence::Low),
        "medium" => Some(Confidence::Medium),
        "high" => Some(Confidence::High),
        _ => None,
    }
}

fn is_icon_ref(icon: &str) -> bool {
    icon.split_once('/').is_some_and(|(set, name)| {
        !set.is_empty() && !name.is_empty() && !name.contains('/')
    })
}

fn steps(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|step| !step.is_empty())
            .map(str::to_owned)
            .collect(),
        Value::String(step) if !step.trim().is_empty() => vec![step.trim().to_owned()],
        _ => Vec::new(),
    }
}

fn flag(raw: &RawClassification, keys: &[&str], field: &str) -> bool {
    raw.first_of(keys)
        .and_then(Value::as_bool)
        .unwrap_or_else(|| defaulted(field, false))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(value: &Value) -> RawClassification {
        RawClassification::from(value.as_object().cloned().expect("object literal"))
    }

    fn assert_invariants(normalized: &NormalizedClassification) {
        assert!(!normalized.specific_subtype.is_empty(), "empty subtype");
        assert!(!normalized.display_name.is_empty(), "empty display name");
        assert!(
            normalized.estimated_mass_kg > 0.0 && normalized.estimated_mass_kg.is_finite(),
            "bad mass {}",
            normalized.estimated_mass_kg
        );
        assert!(
            normalized.co2_rate_kg_per_kg >= 0.0 && normalized.co2_rate_kg_per_kg.is_finite(),
            "bad rate {}",
            normalized.co2_rate_kg_per_kg
        );
        assert!(
            COLOR_HEX.is_match(&normalized.color_hex),
            "bad color {}",
            normalized.color_hex
        );
        assert_eq!(
            normalized.icon_ref.matches('/').count(),
            1,
            "bad icon {}",
            normalized.icon_ref
        );
        assert!(!normalized.disposal_steps.is_empty(), "no disposal steps");
    }

    #[test]
    fn empty_record_gets_every_default() {
        let normalized = normalize(&RawClassification::default());

        assert_eq!(normalized.main_category, MainCategory::General);
        assert_eq!(normalized.specific_subtype, DEFAULT_SUBTYPE);
        assert_eq!(normalized.display_name, DEFAULT_DISPLAY_NAME);
        assert!((normalized.estimated_mass_kg - 0.2).abs() < f64::EPSILON, "mass");
        assert_eq!(normalized.confidence, Confidence::Medium);
        assert!(normalized.co2_rate_kg_per_kg.abs() < f64::EPSILON, "rate");
        assert_eq!(normalized.color_hex, "#757575");
        assert!(normalized.icon_ref.contains('/'), "icon");
        assert_eq!(normalized.disposal_steps, vec![DEFAULT_DISPOSAL_STEP.to_owned()]);
        assert_eq!(normalized.location_query_hint, LocationHint::default_hint());
        assert!(!normalized.is_recyclable, "recyclable");
        assert!(!normalized.is_donation_worthy, "donation worthy");
    }

    #[test]
    fn well_formed_record_is_kept() {
        let normalized = normalize(&raw(&json!({
            "main_category": "electronic",
            "specific_category": "smartphones",
            "display_name": "Smartphone",
            "estimated_weight_kg": 0.18,
            "confidence": "High",
            "co2_rate": 15.0,
            "color": "#1E88E5",
            "icon": "material/MdSmartphone",
            "disposal_methods": ["Wipe your data", "Take it to an e-waste facility"],
            "location_query": "electronics recycling",
            "recyclable": true,
            "donation_worthy": true
        })));

        assert_eq!(normalized.main_category, MainCategory::Electronic);
        assert_eq!(normalized.specific_subtype, "smartphones");
        assert_eq!(normalized.display_name, "Smartphone");
        assert!((normalized.estimated_mass_kg - 0.18).abs() < f64::EPSILON, "mass");
        assert_eq!(normalized.confidence, Confidence::High);
        assert!((normalized.co2_rate_kg_per_kg - 15.0).abs() < f64::EPSILON, "rate");
        assert_eq!(normalized.color_hex, "#1E88E5");
        assert_eq!(normalized.icon_ref, "material/MdSmartphone");
        assert_eq!(normalized.disposal_steps.len(), 2);
        assert_eq!(
            normalized.location_query_hint,
            LocationHint::Search("electronics recycling".to_owned())
        );
        assert!(normalized.is_recyclable, "recyclable");
        assert!(normalized.is_donation_worthy, "donation worthy");
    }

    #[test]
    fn legacy_keys_are_understood() {
        let normalized = normalize(&raw(&json!({
            "category": "e-waste",
            "subtype": "laptops",
            "weight": "2.5",
            "disposal_steps": "Remove the battery first"
        })));

        assert_eq!(normalized.main_category, MainCategory::Electronic);
        assert_eq!(normalized.specific_subtype, "laptops");
        assert!((normalized.estimated_mass_kg - 2.5).abs() < f64::EPSILON, "mass");
        assert_eq!(normalized.disposal_steps, vec!["Remove the battery first".to_owned()]);
    }

    #[test]
    fn wrong_types_fall_back_to_defaults() {
        let normalized = normalize(&raw(&json!({
            "main_category": 7,
            "specific_category": ["not", "a", "string"],
            "display_name": "   ",
            "estimated_weight_kg": -3,
            "confidence": 0.9,
            "co2_rate": "lots",
            "color": "#12345",
            "icon": "trash",
            "disposal_methods": [1, 2, ""],
            "location_query": false,
            "recyclable": "yes",
            "donation_worthy": 1
        })));

        assert_invariants(&normalized);
        assert_eq!(normalized.main_category, MainCategory::General);
        assert_eq!(normalized.specific_subtype, DEFAULT_SUBTYPE);
        assert_eq!(normalized.display_name, DEFAULT_DISPLAY_NAME);
        assert_eq!(normalized.confidence, Confidence::Medium);
        assert_eq!(normalized.color_hex, DEFAULT_COLOR_HEX);
        assert_eq!(normalized.icon_ref, DEFAULT_ICON_REF);
        assert_eq!(normalized.location_query_hint, LocationHint::default_hint());
        assert!(!normalized.is_recyclable, "string is not a boolean");
        assert!(!normalized.is_donation_worthy, "number is not a boolean");
    }

    #[test]
    fn out_of_enum_category_is_general() {
        let normalized = normalize(&raw(&json!({ "main_category": "spaceship" })));
        assert_eq!(normalized.main_category, MainCategory::General);
    }

    #[test]
    fn confidence_is_cleaned_before_matching() {
        let cases = [
            ("HIGH", Confidence::High),
            (" low% ", Confidence::Low),
            ("Medium%", Confidence::Medium),
            ("85%", Confidence::Medium),
            ("very high", Confidence::Medium),
        ];
        for (input, expected) in cases {
            let normalized = normalize(&raw(&json!({ "confidence": input })));
            assert_eq!(normalized.confidence, expected, "input {input:?}");
        }
    }

    #[test]
    fn missing_rate_uses_category_table() {
        let cases = [
            ("recyclable", 1.02),
            ("organic", 0.3),
            ("electronic", 15.0),
            ("textile", 8.0),
            ("furniture", 25.0),
            ("hazardous", 0.0),
            ("general", 0.0),
        ];
        for (category, expected) in cases {
            let normalized = normalize(&raw(&json!({ "main_category": category })));
            assert!(
                (normalized.co2_rate_kg_per_kg - expected).abs() < f64::EPSILON,
                "{category}: {}",
                normalized.co2_rate_kg_per_kg
            );
        }
    }

    #[test]
    fn negative_rate_uses_category_table() {
        let normalized = normalize(&raw(&json!({
            "main_category": "textile",
            "co2_rate": -4.0
        })));
        assert!((normalized.co2_rate_kg_per_kg - 8.0).abs() < f64::EPSILON, "rate");
    }

    #[test]
    fn color_must_match_exactly() {
        for bad in ["757575", "#7575756", "#GGGGGG", "red"] {
            let normalized = normalize(&raw(&json!({ "color": bad })));
            assert_eq!(normalized.color_hex, DEFAULT_COLOR_HEX, "input {bad:?}");
        }
        let normalized = normalize(&raw(&json!({ "color": "#a1b2c3" })));
        assert_eq!(normalized.color_hex, "#a1b2c3");
    }

    #[test]
    fn icon_needs_exactly_one_separator() {
        for bad in ["MdDelete", "/MdDelete", "material/", "a/b/c"] {
            let normalized = normalize(&raw(&json!({ "icon": bad })));
            assert_eq!(normalized.icon_ref, DEFAULT_ICON_REF, "input {bad:?}");
        }
    }

    #[test]
    fn nearest_hint_is_preserved() {
        let normalized = normalize(&raw(&json!({ "location_query": "nearest_recycling" })));
        assert_eq!(
            normalized.location_query_hint,
            LocationHint::Nearest("recycling".to_owned())
        );
    }

    #[test]
    fn non_finite_mass_is_rejected() {
        let normalized = normalize(&raw(&json!({ "estimated_weight_kg": "NaN" })));
        assert!((normalized.estimated_mass_kg - DEFAULT_MASS_KG).abs() < f64::EPSILON, "mass");
        let normalized = normalize(&raw(&json!({ "estimated_weight_kg": "inf" })));
        assert!((normalized.estimated_mass_kg - DEFAULT_MASS_KG).abs() < f64::EPSILON, "mass");
    }
}
