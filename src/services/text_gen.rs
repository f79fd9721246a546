use crate::error::{AppError, Result};
use crate::models::Theme;
use crate::services::copy::build_prompt;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 512;
const STRICT_TEMPERATURE: f64 = 0.2;
const STRICT_MAX_OUTPUT_TOKENS: u32 = 1024;
const FINISH_MAX_TOKENS: &str = "MAX_TOKENS";

#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub request_id: String,
    pub theme: Theme,
    pub distance_km: f64,
    pub duration_min: f64,
    pub spot_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedText {
    pub title: Option<String>,
    pub description: String,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// `Ok(None)` when the service answered with nothing usable.
    async fn generate(&self, request: &TextRequest) -> Result<Option<GeneratedText>>;
}

/// Client for a `generateContent`-style text generation REST API.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

struct Completion {
    text: String,
    finish_reason: Option<String>,
}

impl GeminiClient {
    pub fn new(base_url: String, model: String, api_key: Option<String>, timeout: Duration) -> Self {
        GeminiClient {
            client: Client::new(),
            base_url,
            model,
            api_key,
            timeout,
        }
    }

    async fn complete(
        &self,
        api_key: &str,
        prompt: String,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Result<Completion> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_output_tokens,
                "responseMimeType": "application/json",
            }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::TextGeneration(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::TextGeneration(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::TextGeneration(format!("Failed to parse response: {}", e)))?;

        Ok(parsed.into_completion())
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, request: &TextRequest) -> Result<Option<GeneratedText>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::TextGeneration("text generation is not configured".into()))?;

        let prompt = build_prompt(
            request.theme,
            request.distance_km,
            request.duration_min,
            &request.spot_names,
            false,
        );
        let mut completion = self
            .complete(api_key, prompt, DEFAULT_TEMPERATURE, DEFAULT_MAX_OUTPUT_TOKENS)
            .await?;

        let truncated = completion.text.trim().is_empty()
            && completion.finish_reason.as_deref() == Some(FINISH_MAX_TOKENS);
        if truncated {
            tracing::info!(
                request_id = %request.request_id,
                "Text generation truncated, retrying with strict prompt"
            );
            let strict = build_prompt(
                request.theme,
                request.distance_km,
                request.duration_min,
                &request.spot_names,
                true,
            );
            completion = self
                .complete(api_key, strict, STRICT_TEMPERATURE, STRICT_MAX_OUTPUT_TOKENS)
                .await?;
        }

        Ok(parse_generated(&completion.text))
    }
}

#[derive(Debug, Deserialize)]
struct RawGenerated {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Parse the model output; plain text is taken as the description.
pub fn parse_generated(text: &str) -> Option<GeneratedText> {
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(raw) = serde_json::from_str::<RawGenerated>(trimmed) {
        let description = raw.description.filter(|d| !d.trim().is_empty())?;
        return Some(GeneratedText {
            title: raw.title.filter(|t| !t.trim().is_empty()),
            description,
        });
    }

    Some(GeneratedText {
        title: None,
        description: trimmed.to_string(),
    })
}

// generateContent response types

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ContentCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentCandidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_completion(self) -> Completion {
        let Some(first) = self.candidates.into_iter().next() else {
            return Completion {
                text: String::new(),
                finish_reason: None,
            };
        };
        let text = first
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        Completion {
            text,
            finish_reason: first.finish_reason,
        }
    }
}
