//! Vision classifier using the Gemini `generateContent` endpoint.
//!
//! The image is sent inline as base64 together with a prompt listing the
//! categories and keys the normalizer understands. The model is asked for
//! JSON output, but its text is still parsed leniently since models wrap JSON
//! in code fences or prose often enough.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use binbuddy_core::{
    config::VisionSettings,
    model::{MainCategory, RawClassification},
    ports::{PortError, VisionPort},
};

const DEFAULT_MIME: &str = "image/jpeg";

/// Request body for `models/{model}:generateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'req> {
    contents: [Content<'req>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'req> {
    parts: [Part<'req>; 2],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'req> {
    Text(&'req str),
    InlineData(InlineData<'req>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'req> {
    mime_type: &'req str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f64,
}

/// Response body; only the first candidate's text parts are used.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Vision port backed by Gemini.
pub struct GeminiVisionPort {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    key_env: String,
}

impl GeminiVisionPort {
    /// Create a new vision port bound to the given HTTP client.
    ///
    /// The API key is read from the environment variable named in
    /// `settings`; a missing key only fails once a classification is attempted.
    #[must_use]
    pub fn new(client: Client, settings: &VisionSettings) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}/models/{}:generateContent",
                settings.base_url.trim_end_matches('/'),
                settings.model
            ),
            api_key: settings.api_key(),
            key_env: settings.api_key_env.clone(),
        }
    }
}

#[async_trait]
impl VisionPort for GeminiVisionPort {
    async fn classify(
        &self,
        image: &[u8],
        prompt: Option<&str>,
    ) -> Result<RawClassification, PortError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PortError::MissingCredentials(self.key_env.clone()))?;

        let text = classification_prompt(prompt);
        let body = request_body(&text, image);

        let resp: GenerateResponse = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let answer = response_text(resp)?;
        debug!("gemini answered with {} bytes", answer.len());

        RawClassification::from_model_text(&answer)
    }
}

fn request_body<'req>(prompt: &'req str, image: &[u8]) -> GenerateRequest<'req> {
    GenerateRequest {
        contents: [Content {
            parts: [
                Part::Text(prompt),
                Part::InlineData(InlineData {
                    mime_type: sniff_mime(image),
                    data: STANDARD.encode(image),
                }),
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            temperature: 0.2,
        },
    }
}

fn response_text(resp: GenerateResponse) -> Result<String, PortError> {
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(PortError::Malformed(
            "gemini returned no text candidate".to_owned(),
        ))
    } else {
        Ok(text)
    }
}

/// Guess the image MIME type from its magic bytes.
#[must_use]
pub fn sniff_mime(image: &[u8]) -> &'static str {
    match image {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => DEFAULT_MIME,
    }
}

/// Prompt describing the expected JSON answer.
#[must_use]
pub fn classification_prompt(extra: Option<&str>) -> String {
    let categories = MainCategory::ALL
        .into_iter()
        .map(MainCategory::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = format!(
        "Analyze this image and identify the waste item. Return ONLY a JSON object with these keys:
{{
  \"main_category\": one of {categories},
  \"specific_category\": snake_case item type, e.g. \"plastic_bottles\",
  \"display_name\": short human-friendly name,
  \"estimated_weight_kg\": number,
  \"confidence\": \"low\" | \"medium\" | \"high\",
  \"co2_rate_kg_per_kg\": kg of CO2 avoided per kg when disposed of properly,
  \"color_hex\": \"#RRGGBB\" color for the category,
  \"icon_ref\": \"material/IconName\",
  \"disposal_steps\": [ordered short instructions],
  \"location_query_hint\": \"nearest_<place_type>\" when any bin will do, otherwise a search phrase such as \"electronics recycling\",
  \"is_recyclable\": boolean,
  \"is_donation_worthy\": boolean
}}
Rules:
- Choose the most specific item type that matches
- Weight should be realistic for the item size
- Base confidence on image clarity
- Return valid JSON only"
    );

    if let Some(context) = extra.map(str::trim).filter(|context| !context.is_empty()) {
        prompt.push_str("\nAdditional context from the user: ");
        prompt.push_str(context);
    }

    prompt
}
