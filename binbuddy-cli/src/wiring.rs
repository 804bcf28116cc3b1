//! Builds the HTTP client, providers, and service from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use reqwest::Client;

use binbuddy_core::{
    BinBuddyConfig, BinBuddyService, HttpSettings, LocationAggregator, ProviderPlugin,
    ProviderRegistry, SlidingWindowLimiter,
};
use binbuddy_provider_google as google;
use binbuddy_provider_nominatim as nominatim;
use binbuddy_provider_overpass as overpass;
use binbuddy_vision_gemini::GeminiVisionPort;

use crate::store::JsonlSink;

pub(crate) fn http_client(settings: &HttpSettings) -> Result<Client> {
    let client = Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(settings.timeout())
        .build()?;
    Ok(client)
}

/// Plugins for every enabled provider the binary knows about.
pub(crate) fn registry(client: &Client, config: &BinBuddyConfig) -> ProviderRegistry {
    let plugins: Vec<ProviderPlugin> = config
        .enabled_providers()
        .into_iter()
        .filter_map(|settings| match settings.id.as_str() {
            "overpass" => Some(overpass::plugin(client.clone(), settings)),
            "nominatim" => Some(nominatim::plugin(client.clone(), settings)),
            "google" => Some(google::plugin(client.clone(), settings)),
            other => {
                warn!("unknown place provider `{other}` in configuration, skipping");
                None
            }
        })
        .collect();

    ProviderRegistry::new(plugins)
}

/// Options that only apply to the `classify` command.
#[derive(Debug, Default)]
pub(crate) struct ClassifyOptions {
    pub(crate) store: Option<PathBuf>,
    pub(crate) prompt: Option<String>,
}

pub(crate) fn service(config: &BinBuddyConfig, options: ClassifyOptions) -> Result<BinBuddyService> {
    let client = http_client(&config.http)?;
    let registry = registry(&client, config);
    info!(
        "place providers: {}",
        registry
            .providers()
            .into_iter()
            .map(|meta| meta.id)
            .collect::<Vec<_>>()
            .join(", ")
    );

    if config.vision.api_key().is_none() {
        warn!(
            "{} is not set, classification will fail",
            config.vision.api_key_env
        );
    }

    let aggregator = LocationAggregator::new(Arc::new(registry), config.aggregator.clone());
    let vision = GeminiVisionPort::new(client, &config.vision);

    let mut service = BinBuddyService::new(Arc::new(vision), Arc::new(aggregator), &config.vision)
        .with_rate_limiter(Arc::new(SlidingWindowLimiter::new(config.rate_limit)));
    if let Some(path) = options.store {
        service = service.with_sink(Arc::new(JsonlSink::new(path)));
    }
    if let Some(prompt) = options.prompt {
        service = service.with_prompt(prompt);
    }

    Ok(service)
}
