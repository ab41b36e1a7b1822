//! Google Gemini `generateContent` client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ReplyGenerator;
use crate::error::GenerationError;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        Some(text)
    }
}

/// Reply generator backed by a Gemini model.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SecretString,
}

impl GeminiGenerator {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ReplyGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(skip(self, prompt), fields(model = %self.model, chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![TextPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Gemini request failed");
            return Err(GenerationError::RequestFailed(format!("HTTP {status}: {raw}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.without_url().to_string()))?;

        if let Some(error) = parsed.error {
            return Err(GenerationError::RequestFailed(error.message));
        }

        let text = parsed.into_text().ok_or(GenerationError::EmptyOutput)?;
        debug!(chars = text.len(), "Gemini reply received");
        Ok(text)
    }
}
