//! Core types and service wiring for the BinBuddy disposal assistant.

/// Merging place-provider results into ranked suggestions.
pub mod aggregate;
/// Avoided-emission rates and estimates.
pub mod co2;
/// TOML configuration with defaults for every setting.
pub mod config;
/// Great-circle distance helpers.
pub mod geo;
/// Keyword tables shared by the aggregator and the place providers.
pub mod keywords;
/// Domain models and identifiers shared by all crates.
pub mod model;
/// Turning untrusted classifier output into a valid classification.
pub mod normalize;
/// Registry for plugging place providers into the aggregator.
pub mod plugin;
/// Traits describing the external collaborators.
pub mod ports;
/// Per-client request limiting.
pub mod ratelimit;
/// High-level service facade used by clients.
pub mod service;

pub use aggregate::LocationAggregator;
pub use config::*;
pub use model::*;
pub use normalize::normalize;
pub use plugin::*;
pub use ports::*;
pub use ratelimit::SlidingWindowLimiter;
pub use service::*;
