//! High-level service facade: image in, disposal suggestions out.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::aggregate::LocationAggregator;
use crate::co2::co2_saved;
use crate::config::{ClassifierFailurePolicy, VisionSettings};
use crate::model::{
    ClassificationRequest, ClientId, Coordinates, DisposalResult, PlaceCandidate,
    RawClassification, StoredRecord,
};
use crate::normalize::normalize;
use crate::ports::{PortError, RateDecision, RateLimitPort, RecordSink, VisionPort};

#[derive(thiserror::Error, Debug)]
/// Errors surfaced to the caller of [`BinBuddyService`].
pub enum ServiceError {
    /// The request itself is unusable and must not be retried as is.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// The vision classifier could not be reached or answered garbage.
    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(#[source] PortError),
    /// The client sent too many requests.
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the next request will be accepted.
        retry_after_secs: u64,
    },
    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Public entry point for classifying items and finding disposal places.
pub struct BinBuddyService {
    vision: Arc<dyn VisionPort>,
    aggregator: Arc<LocationAggregator>,
    sink: Option<Arc<dyn RecordSink>>,
    limiter: Option<Arc<dyn RateLimitPort>>,
    failure_policy: ClassifierFailurePolicy,
    vision_timeout: Duration,
    prompt: Option<String>,
}

impl BinBuddyService {
    /// Create a new service from its collaborators.
    #[must_use]
    pub fn new(
        vision: Arc<dyn VisionPort>,
        aggregator: Arc<LocationAggregator>,
        settings: &VisionSettings,
    ) -> Self {
        Self {
            vision,
            aggregator,
            sink: None,
            limiter: None,
            failure_policy: settings.on_failure,
            vision_timeout: settings.timeout(),
            prompt: None,
        }
    }

    /// Persist every finished result through `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Check clients against `limiter` in [`Self::handle_for_client`].
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimitPort>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Pass an extra prompt to the classifier.
    #[must_use]
    pub fn with_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    /// Classify the image and suggest where to take the item.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for an empty image or invalid
    /// coordinates. With [`ClassifierFailurePolicy::Propagate`], classifier
    /// failures surface as [`ServiceError::ClassifierUnavailable`]; with the
    /// default policy they degrade to a generic classification instead.
    pub async fn handle(
        &self,
        request: &ClassificationRequest,
    ) -> Result<DisposalResult, ServiceError> {
        validate(request)?;

        let raw = match self.classify(&request.image).await {
            Ok(raw) => raw,
            Err(err) => self.on_classifier_failure(err)?,
        };

        let mut classification = normalize(&raw);
        if let Some(mass) = request.user_mass_kg {
            if mass.is_finite() && mass > 0.0 {
                classification.estimated_mass_kg = mass;
            } else {
                debug!("ignoring unusable user mass {mass}");
            }
        }

        let co2_saved_kg = co2_saved(
            classification.co2_rate_kg_per_kg,
            classification.estimated_mass_kg,
        );

        let hint = classification.location_query_hint.to_string();
        let suggestions = self
            .aggregator
            .aggregate(request.latitude, request.longitude, &hint)
            .await;

        info!(
            "classified {} as {} ({} kg, {co2_saved_kg} kg CO2 saved), {} suggestions",
            classification.specific_subtype,
            classification.main_category,
            classification.estimated_mass_kg,
            suggestions.len()
        );

        let result = DisposalResult {
            classification,
            co2_saved_kg,
            suggestions,
        };
        self.persist(request.origin(), &result).await;

        Ok(result)
    }

    /// Same as [`Self::handle`], after checking `client` against the rate limiter.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::RateLimited`] when the client is over its
    /// allowance, otherwise the errors of [`Self::handle`].
    pub async fn handle_for_client(
        &self,
        client: &ClientId,
        request: &ClassificationRequest,
    ) -> Result<DisposalResult, ServiceError> {
        if let Some(limiter) = &self.limiter
            && let RateDecision::Limited { retry_after } = limiter.check(client)
        {
            warn!("client {} is rate limited", client.0);
            return Err(ServiceError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        self.handle(request).await
    }

    /// Look up disposal places for a hint without classifying anything.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRequest`] for invalid coordinates.
    pub async fn nearby(
        &self,
        latitude: f64,
        longitude: f64,
        hint: &str,
    ) -> Result<Vec<PlaceCandidate>, ServiceError> {
        validate_coordinates(Coordinates::new(latitude, longitude))?;
        Ok(self.aggregator.aggregate(latitude, longitude, hint).await)
    }

    async fn classify(&self, image: &[u8]) -> Result<RawClassification, PortError> {
        match timeout(
            self.vision_timeout,
            self.vision.classify(image, self.prompt.as_deref()),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_elapsed) => Err(PortError::Timeout),
        }
    }

    fn on_classifier_failure(&self, err: PortError) -> Result<RawClassification, ServiceError> {
        match self.failure_policy {
            ClassifierFailurePolicy::Degrade => {
                warn!("classifier failed, using a generic classification: {err}");
                let mut map = Map::new();
                map.insert("confidence".to_owned(), Value::from("low"));
                Ok(RawClassification(map))
            }
            ClassifierFailurePolicy::Propagate => match err {
                PortError::Internal(message) => Err(ServiceError::Internal(message)),
                other => Err(ServiceError::ClassifierUnavailable(other)),
            },
        }
    }

    async fn persist(&self, origin: Coordinates, result: &DisposalResult) {
        let Some(sink) = &self.sink else {
            return;
        };

        let record = StoredRecord::pending(origin, result.clone());
        match sink.store(&record).await {
            Ok(()) => debug!("stored record {}", record.id),
            Err(err) => warn!("failed to store record {}: {err}", record.id),
        }
    }
}

fn validate(request: &ClassificationRequest) -> Result<(), ServiceError> {
    if request.image.is_empty() {
        return Err(ServiceError::InvalidRequest("image is empty".to_owned()));
    }
    validate_coordinates(request.origin())
}

fn validate_coordinates(origin: Coordinates) -> Result<(), ServiceError> {
    if origin.is_valid() {
        Ok(())
    } else {
        Err(ServiceError::InvalidRequest(format!(
            "coordinates out of range: {}, {}",
            origin.latitude, origin.longitude
        )))
    }
}
