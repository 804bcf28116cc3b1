//! Traits describing the external collaborators and shared helper types.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Error as ReqwestError;
use serde_json::Error as JsonError;

use crate::model::{ClientId, PlaceCandidate, RawClassification, StoredRecord};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to external services.
pub enum PortError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Response body was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] JsonError),
    /// A required API key is not configured.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
    /// Upstream answered with a non-success status.
    #[error("Unexpected status: {0}")]
    Status(u16),
    /// Upstream answered with a body we cannot use.
    #[error("Malformed response: {0}")]
    Malformed(String),
    /// The call did not finish in time.
    #[error("Timed out")]
    Timeout,
    /// Internal collaborator error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
/// Parameters for a place search.
pub struct PlaceQuery {
    /// Latitude of the user.
    pub latitude: f64,
    /// Longitude of the user.
    pub longitude: f64,
    /// Free-text hint describing what kind of place to find.
    pub hint: String,
    /// Search radius in kilometres.
    pub radius_km: f64,
}

impl PlaceQuery {
    /// Construct a new place query.
    #[must_use]
    pub fn new<H: Into<String>>(latitude: f64, longitude: f64, hint: H, radius_km: f64) -> Self {
        Self {
            latitude,
            longitude,
            hint: hint.into(),
            radius_km,
        }
    }

    /// Search radius in metres, as most map APIs expect.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "clamped to the u32 range before the cast"
    )]
    pub fn radius_m(&self) -> u32 {
        (self.radius_km * 1000.0)
            .round()
            .clamp(0.0, f64::from(u32::MAX)) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Static description of a place provider.
pub struct ProviderMeta {
    /// Stable identifier, e.g. `overpass`.
    pub id: String,
    /// Human-friendly provider name.
    pub name: String,
}

#[async_trait]
/// Trait for provider-specific place search backends.
pub trait PlacePort: Send + Sync {
    /// Metadata describing this provider.
    fn meta(&self) -> &ProviderMeta;

    /// Search for places matching the query.
    ///
    /// Implementations never fail: network errors, bad responses, and missing
    /// credentials are logged and produce an empty list.
    async fn search(&self, query: &PlaceQuery) -> Vec<PlaceCandidate>;
}

#[async_trait]
/// Trait for vision-language classifiers.
pub trait VisionPort: Send + Sync {
    /// Classify an image, optionally steering the model with an extra prompt.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the classifier cannot be reached or its
    /// answer cannot be decoded into a JSON object.
    async fn classify(
        &self,
        image: &[u8],
        prompt: Option<&str>,
    ) -> Result<RawClassification, PortError>;
}

#[async_trait]
/// Trait for whatever persists finished results.
pub trait RecordSink: Send + Sync {
    /// Persist a record.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the record could not be stored.
    async fn store(&self, record: &StoredRecord) -> Result<(), PortError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of a rate-limit check.
pub enum RateDecision {
    /// The request may proceed.
    Allowed,
    /// The client must wait before trying again.
    Limited {
        /// Time until the oldest request leaves the window.
        retry_after: Duration,
    },
}

/// Trait for rate limiters keyed by client identity.
pub trait RateLimitPort: Send + Sync {
    /// Record an attempt by `client` and decide whether it may proceed.
    fn check(&self, client: &ClientId) -> RateDecision;
}
