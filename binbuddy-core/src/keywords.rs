//! Keyword tables shared by the place providers and the aggregator.
//!
//! Providers turn a free-text hint into a [`SearchTopic`] and then into their
//! own provider-specific search terms. The aggregator uses the same tables to
//! tag suggestions and to pick fallback places.

use crate::model::SuggestionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Kind of place a hint asks for.
pub enum SearchTopic {
    /// Electronics and e-waste recycling.
    Electronics,
    /// Furniture donation or bulky-waste drop-off.
    Furniture,
    /// Clothing donation or textile recycling.
    Textile,
    /// Batteries, paint, and other hazardous waste.
    Hazardous,
    /// Generic recycling centres.
    Recycling,
    /// Charities and thrift stores.
    Donation,
    /// Composting and green-waste sites.
    Compost,
    /// Anything else: general waste and recycling.
    General,
}

// Checked in this order; the first topic with a matching keyword wins.
const TOPIC_KEYWORDS: &[(SearchTopic, &[&str])] = &[
    (
        SearchTopic::Electronics,
        &[
            "electronic", "e-waste", "e_waste", "ewaste", "computer", "laptop", "phone",
            "appliance", "charger", "cable",
        ],
    ),
    (
        SearchTopic::Furniture,
        &["furniture", "sofa", "couch", "mattress", "chair", "dresser"],
    ),
    (
        SearchTopic::Textile,
        &["cloth", "textile", "shoe", "apparel", "garment", "fabric"],
    ),
    (
        SearchTopic::Hazardous,
        &["battery", "batteries", "hazard", "paint", "chemical", "motor oil", "bulb"],
    ),
    (
        SearchTopic::Recycling,
        &[
            "recycl", "bottle", "glass", "paper", "cardboard", "plastic", "metal", "scrap",
        ],
    ),
    (
        SearchTopic::Donation,
        &["donat", "charity", "thrift", "second hand", "second-hand", "goodwill"],
    ),
    (
        SearchTopic::Compost,
        &["compost", "organic", "food waste", "food scraps", "yard waste", "green waste"],
    ),
];

const DONATE_MARKERS: &[&str] = &[
    "charity",
    "thrift",
    "donat",
    "goodwill",
    "salvation army",
    "second hand",
    "second_hand",
    "secondhand",
];

const DISPOSE_MARKERS: &[&str] = &[
    "dump",
    "landfill",
    "waste transfer",
    "waste_transfer",
    "transfer station",
];

const DONATION_FALLBACK_MARKERS: &[&str] = &[
    "donat", "furniture", "cloth", "textile", "charity", "thrift",
];

impl SearchTopic {
    /// Pick the topic for a hint. Never fails; unknown hints map to [`SearchTopic::General`].
    #[must_use]
    pub fn from_hint(hint: &str) -> Self {
        let normalized = hint.to_lowercase().replace('_', " ");

        TOPIC_KEYWORDS
            .iter()
            .find(|(_, keywords)| contains_any(&normalized, keywords))
            .map_or(Self::General, |(topic, _)| *topic)
    }
}

/// Tag a candidate by its name and the search term that found it.
#[must_use]
pub fn suggestion_type(name: &str, search_term: &str) -> SuggestionType {
    let haystack = format!("{name} {search_term}").to_lowercase();

    if contains_any(&haystack, DONATE_MARKERS) {
        SuggestionType::Donate
    } else if contains_any(&haystack, DISPOSE_MARKERS) {
        SuggestionType::Dispose
    } else {
        SuggestionType::Dropoff
    }
}

/// Whether fallback suggestions for `hint` should be donation-style rather
/// than recycling-style.
#[must_use]
pub fn wants_donation_fallback(hint: &str) -> bool {
    contains_any(&hint.to_lowercase(), DONATION_FALLBACK_MARKERS)
}

/// Number of fallback places offered for a hint.
pub const FALLBACK_COUNT: usize = 2;

/// Names for fallback places, best match first.
#[must_use]
pub fn fallback_names(hint: &str) -> [&'static str; FALLBACK_COUNT] {
    let topic = SearchTopic::from_hint(hint);

    if wants_donation_fallback(hint) {
        let primary = match topic {
            SearchTopic::Textile => "Textile Recycling Drop-off",
            SearchTopic::Furniture => "Furniture Bank Donation Center",
            _ => "Goodwill Donation Center",
        };
        [primary, "Community Thrift Store"]
    } else {
        let primary = match topic {
            SearchTopic::Electronics => "Electronics Recycling Hub",
            SearchTopic::Hazardous => "Hazardous Waste Facility",
            SearchTopic::Compost => "Composting Center",
            _ => "Local Recycling Center",
        };
        [primary, "Waste Management Center"]
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn electronics_wins_over_batteries() {
        assert_eq!(
            SearchTopic::from_hint("e-waste battery drop-off"),
            SearchTopic::Electronics
        );
    }

    #[test]
    fn furniture_wins_over_donation() {
        assert_eq!(
            SearchTopic::from_hint("furniture donation"),
            SearchTopic::Furniture
        );
    }

    #[test]
    fn underscores_count_as_spaces() {
        assert_eq!(
            SearchTopic::from_hint("second_hand shop"),
            SearchTopic::Donation
        );
    }

    #[test]
    fn compost_topic_comes_last() {
        assert_eq!(
            SearchTopic::from_hint("composting facility"),
            SearchTopic::Compost
        );
        assert_eq!(SearchTopic::from_hint("organic"), SearchTopic::Compost);
        assert_eq!(
            SearchTopic::from_hint("organic waste recycling"),
            SearchTopic::Recycling
        );
    }

    #[test]
    fn unknown_hint_is_general() {
        assert_eq!(SearchTopic::from_hint("somewhere"), SearchTopic::General);
    }

    #[test]
    fn tags_by_name_or_term() {
        assert_eq!(
            suggestion_type("Goodwill Store", "store"),
            SuggestionType::Donate
        );
        assert_eq!(
            suggestion_type("County Site", "landfill"),
            SuggestionType::Dispose
        );
        assert_eq!(
            suggestion_type("Recycling Point", "recycling"),
            SuggestionType::Dropoff
        );
    }

    #[test]
    fn donation_markers_beat_dispose_markers() {
        assert_eq!(
            suggestion_type("Thrift shop next to the dump", ""),
            SuggestionType::Donate
        );
    }

    #[test]
    fn fallback_style_follows_hint() {
        assert!(wants_donation_fallback("clothing donation"), "clothing");
        assert!(!wants_donation_fallback("battery recycling"), "battery");
        assert_eq!(
            fallback_names("electronics recycling"),
            ["Electronics Recycling Hub", "Waste Management Center"]
        );
        assert_eq!(
            fallback_names("composting facility"),
            ["Composting Center", "Waste Management Center"]
        );
        assert_eq!(
            fallback_names("furniture donation"),
            ["Furniture Bank Donation Center", "Community Thrift Store"]
        );
    }
}
