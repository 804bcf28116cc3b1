//! Merges place-provider results into a short, ranked suggestion list.
//!
//! Providers are queried in registry order. Their candidates are pooled,
//! filtered by radius, deduplicated (first occurrence wins, so higher-priority
//! providers win ties), sorted by distance, and capped. When too few
//! candidates survive, static fallback suggestions are appended.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};
use tokio::time::timeout;

use crate::config::{AggregationMode, AggregatorSettings};
use crate::geo::{distance_km, round_to};
use crate::keywords::{FALLBACK_COUNT, fallback_names, suggestion_type};
use crate::model::{NEAREST_PREFIX, PlaceCandidate, SuggestionType};
use crate::plugin::{ProviderPlugin, ProviderRegistry};
use crate::ports::PlaceQuery;

/// Provider id used for `nearest_` suggestions.
pub const SYNTHETIC_SOURCE: &str = "synthetic";
/// Provider id used for fallback suggestions.
pub const FALLBACK_SOURCE: &str = "fallback";

// Approximate offsets (degrees) for fallback places, roughly 1-2 km away.
const FALLBACK_OFFSETS: [(f64, f64); FALLBACK_COUNT] = [(0.01, 0.01), (-0.012, 0.018)];

/// Queries place providers and ranks their results.
pub struct LocationAggregator {
    registry: Arc<ProviderRegistry>,
    settings: AggregatorSettings,
}

impl LocationAggregator {
    /// Create an aggregator over the given registry.
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>, settings: AggregatorSettings) -> Self {
        Self { registry, settings }
    }

    /// Suggest up to `max_results` places for `hint` around the given point.
    ///
    /// A `nearest_<type>` hint skips the providers and yields a single
    /// synthetic "Nearest <type>" suggestion at the input coordinates. Any
    /// other hint always yields at least `min_suggestions` entries thanks to
    /// the fallback step.
    pub async fn aggregate(&self, latitude: f64, longitude: f64, hint: &str) -> Vec<PlaceCandidate> {
        if let Some(place_type) = hint.trim().strip_prefix(NEAREST_PREFIX) {
            return vec![nearest_candidate(latitude, longitude, place_type)];
        }

        let query = PlaceQuery::new(latitude, longitude, hint.trim(), self.settings.max_radius_km);

        let pooled = match self.settings.mode {
            AggregationMode::Sequential => self.collect_sequential(&query).await,
            AggregationMode::Concurrent => self.collect_concurrent(&query).await,
        };
        let pooled_len = pooled.len();

        let ranked = self.rank(pooled, latitude, longitude);
        let ranked_len = ranked.len();
        let suggestions = self.fill_with_fallbacks(ranked, latitude, longitude, &query.hint);

        info!(
            "aggregated {pooled_len} candidates for {:?} into {ranked_len} ranked, {} returned",
            query.hint,
            suggestions.len()
        );

        suggestions
    }

    async fn collect_sequential(&self, query: &PlaceQuery) -> Vec<PlaceCandidate> {
        let mut pooled = Vec::new();
        // distinct in-range places, so repeats of one depot do not end the lookup
        let mut in_range = HashSet::new();

        for plugin in self.registry.as_ref() {
            let found = self.call(plugin, query).await;
            in_range.extend(
                found
                    .iter()
                    .filter(|candidate| self.within_radius(candidate, query))
                    .map(dedup_key),
            );
            pooled.extend(found);

            if in_range.len() >= self.settings.min_results {
                debug!(
                    "have {} distinct candidates in range, skipping remaining providers",
                    in_range.len()
                );
                break;
            }
        }

        pooled
    }

    async fn collect_concurrent(&self, query: &PlaceQuery) -> Vec<PlaceCandidate> {
        // join_all keeps input order, so the registry order still decides
        // which duplicate survives
        join_all(self.registry.iter().map(|plugin| self.call(plugin, query)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn call(&self, plugin: &ProviderPlugin, query: &PlaceQuery) -> Vec<PlaceCandidate> {
        let provider = &plugin.meta().id;
        let limit = self.settings.provider_timeout();

        match timeout(limit, plugin.place_port.search(query)).await {
            Ok(found) => {
                debug!("provider {provider} returned {} candidates", found.len());
                found
            }
            Err(_elapsed) => {
                warn!("provider {provider} timed out after {limit:?}");
                Vec::new()
            }
        }
    }

    fn within_radius(&self, candidate: &PlaceCandidate, query: &PlaceQuery) -> bool {
        distance_km(
            query.latitude,
            query.longitude,
            candidate.latitude,
            candidate.longitude,
        ) <= self.settings.max_radius_km
    }

    fn rank(&self, pooled: Vec<PlaceCandidate>, latitude: f64, longitude: f64) -> Vec<PlaceCandidate> {
        let mut seen = HashSet::new();

        let mut ranked: Vec<PlaceCandidate> = pooled
            .into_iter()
            .filter(|candidate| candidate.latitude.is_finite() && candidate.longitude.is_finite())
            .map(|mut candidate| {
                // recomputed so every provider is measured the same way
                candidate.distance_km = round_to(
                    distance_km(latitude, longitude, candidate.latitude, candidate.longitude),
                    2,
                );
                candidate
            })
            .filter(|candidate| candidate.distance_km <= self.settings.max_radius_km)
            .filter(|candidate| seen.insert(dedup_key(candidate)))
            .collect();

        ranked.sort_by(|left, right| left.distance_km.total_cmp(&right.distance_km));
        ranked.truncate(self.settings.max_results);
        ranked
    }

    fn fill_with_fallbacks(
        &self,
        mut ranked: Vec<PlaceCandidate>,
        latitude: f64,
        longitude: f64,
        hint: &str,
    ) -> Vec<PlaceCandidate> {
        let wanted = self.settings.min_suggestions.min(self.settings.max_results);
        if ranked.len() >= wanted {
            return ranked;
        }

        debug!(
            "only {} suggestions for {hint:?}, adding fallbacks",
            ranked.len()
        );

        for (name, offset) in fallback_names(hint).into_iter().zip(FALLBACK_OFFSETS) {
            if ranked.len() >= wanted {
                break;
            }
            ranked.push(fallback_candidate(latitude, longitude, name, offset, hint));
        }

        ranked
    }
}

/// Synthetic suggestion for a `nearest_<type>` hint.
#[must_use]
pub fn nearest_candidate(latitude: f64, longitude: f64, place_type: &str) -> PlaceCandidate {
    let label = place_type.replace('_', " ");
    let label = match label.trim() {
        "" => "disposal",
        trimmed => trimmed,
    };

    PlaceCandidate {
        name: format!("Nearest {label}"),
        address: None,
        latitude,
        longitude,
        distance_km: 0.0,
        suggestion_type: SuggestionType::Dropoff,
        source_provider: SYNTHETIC_SOURCE.to_owned(),
        rating: None,
        external_id: None,
    }
}

fn fallback_candidate(
    latitude: f64,
    longitude: f64,
    name: &str,
    (lat_offset, lon_offset): (f64, f64),
    hint: &str,
) -> PlaceCandidate {
    let place_lat = (latitude + lat_offset).clamp(-90.0, 90.0);
    let mut place_lon = longitude + lon_offset;
    if place_lon > 180.0 {
        place_lon -= 360.0;
    } else if place_lon < -180.0 {
        place_lon += 360.0;
    }

    PlaceCandidate {
        name: name.to_owned(),
        address: None,
        latitude: place_lat,
        longitude: place_lon,
        distance_km: round_to(distance_km(latitude, longitude, place_lat, place_lon), 2),
        suggestion_type: suggestion_type(name, hint),
        source_provider: FALLBACK_SOURCE.to_owned(),
        rating: None,
        external_id: None,
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "coordinates are bounded, so the scaled values fit in i64"
)]
fn dedup_key(candidate: &PlaceCandidate) -> (String, i64, i64) {
    let name: String = candidate
        .name
        .to_lowercase()
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect();
    let lat_cell = (candidate.latitude * 100.0).round() as i64;
    let lon_cell = (candidate.longitude * 100.0).round() as i64;
    (name, lat_cell, lon_cell)
}
