//! Avoided-emissions estimates.

use crate::geo::round_to;
use crate::model::MainCategory;

/// Default kg of CO₂ avoided per kg of material, by category.
#[must_use]
pub const fn default_rate(category: MainCategory) -> f64 {
    match category {
        MainCategory::Recyclable => 1.02,
        MainCategory::Organic => 0.3,
        MainCategory::Electronic => 15.0,
        MainCategory::Textile => 8.0,
        MainCategory::Furniture | MainCategory::Donation => 25.0,
        MainCategory::Hazardous | MainCategory::General => 0.0,
    }
}

/// CO₂ avoided by handling `mass_kg` at `rate_per_kg`, rounded to two decimals.
///
/// Never negative; a non-finite product counts as zero.
#[must_use]
pub fn co2_saved(rate_per_kg: f64, mass_kg: f64) -> f64 {
    let saved = rate_per_kg * mass_kg;
    if saved.is_finite() && saved > 0.0 {
        round_to(saved, 2)
    } else {
        0.0
    }
}
