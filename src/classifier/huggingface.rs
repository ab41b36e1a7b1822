//! Hugging Face inference API client for zero-shot classification.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ClassificationResult, LabelScore, ZeroShotClassifier};
use crate::error::ClassifierError;

#[derive(Serialize)]
struct ZeroShotRequest<'a> {
    inputs: &'a str,
    parameters: ZeroShotParameters<'a>,
}

#[derive(Serialize)]
struct ZeroShotParameters<'a> {
    candidate_labels: &'a [&'a str],
    multi_label: bool,
}

/// Payload shapes the inference API answers with.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ZeroShotResponse {
    /// `{"error": ..., "estimated_time": ...}`, sometimes with a 200 status.
    Error {
        error: serde_json::Value,
        #[serde(default)]
        estimated_time: Option<f64>,
    },
    /// Classic pipeline output: `{"sequence", "labels", "scores"}`.
    Ranked { labels: Vec<String>, scores: Vec<f64> },
    /// Router output: `[{"label", "score"}, ...]`.
    Pairs(Vec<LabelScore>),
}

/// Zero-shot classifier backed by a Hugging Face hosted model.
pub struct HuggingFaceClassifier {
    client: reqwest::Client,
    url: String,
    api_key: SecretString,
    timeout: Duration,
}

impl HuggingFaceClassifier {
    /// Create a client for the model at `url` with a per-call `timeout`.
    pub fn new(
        url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::RequestFailed {
                status: None,
                reason: format!("Failed to build HTTP client: {e}"),
                details: None,
            })?;

        Ok(Self {
            client,
            url: url.into(),
            api_key,
            timeout,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> ClassifierError {
        if e.is_timeout() {
            ClassifierError::Timeout {
                timeout: self.timeout,
            }
        } else {
            ClassifierError::RequestFailed {
                status: e.status().map(|s| s.as_u16()),
                reason: e.to_string(),
                details: None,
            }
        }
    }
}

#[async_trait]
impl ZeroShotClassifier for HuggingFaceClassifier {
    fn model_name(&self) -> &str {
        self.url.rsplit("/models/").next().unwrap_or(&self.url)
    }

    #[tracing::instrument(skip(self, text), fields(model = %self.model_name(), chars = text.len()))]
    async fn classify(
        &self,
        text: &str,
        labels: &[&str],
    ) -> Result<ClassificationResult, ClassifierError> {
        let body = ZeroShotRequest {
            inputs: text,
            parameters: ZeroShotParameters {
                candidate_labels: labels,
                multi_label: false,
            },
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let raw = response.text().await.map_err(|e| self.transport_error(e))?;

        if status == StatusCode::SERVICE_UNAVAILABLE {
            let estimated_time = serde_json::from_str::<serde_json::Value>(&raw)
                .ok()
                .and_then(|v| v.get("estimated_time").and_then(serde_json::Value::as_f64));
            warn!(?estimated_time, "Classifier model is loading");
            return Err(ClassifierError::ModelLoading { estimated_time });
        }

        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "Classifier request failed");
            let details = serde_json::from_str(&raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.clone()));
            return Err(ClassifierError::RequestFailed {
                status: Some(status.as_u16()),
                reason: format!("HTTP {status}"),
                details: Some(details),
            });
        }

        let parsed: ZeroShotResponse =
            serde_json::from_str(&raw).map_err(|e| ClassifierError::InvalidResponse {
                reason: e.to_string(),
            })?;

        let ranking = match parsed {
            ZeroShotResponse::Error {
                error,
                estimated_time,
            } => {
                warn!(%error, ?estimated_time, "Classifier returned an embedded error");
                return Err(ClassifierError::RequestFailed {
                    status: Some(status.as_u16()),
                    reason: error.to_string(),
                    details: Some(serde_json::json!({ "error": error })),
                });
            }
            ZeroShotResponse::Ranked { labels, scores } => {
                if labels.len() != scores.len() {
                    return Err(ClassifierError::InvalidResponse {
                        reason: format!("{} labels but {} scores", labels.len(), scores.len()),
                    });
                }
                labels
                    .into_iter()
                    .zip(scores)
                    .map(|(label, score)| LabelScore { label, score })
                    .collect::<Vec<_>>()
            }
            ZeroShotResponse::Pairs(pairs) => pairs,
        };

        if ranking.is_empty() {
            return Err(ClassifierError::InvalidResponse {
                reason: "empty ranking".to_string(),
            });
        }

        debug!(best = %ranking[0].label, score = ranking[0].score, "Classification received");
        Ok(ClassificationResult::new(ranking))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_matches_inference_api() {
        let labels = ["produtivo", "improdutivo"];
        let body = ZeroShotRequest {
            inputs: "segu anex",
            parameters: ZeroShotParameters {
                candidate_labels: &labels,
                multi_label: false,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["inputs"], "segu anex");
        assert_eq!(json["parameters"]["candidate_labels"][1], "improdutivo");
        assert_eq!(json["parameters"]["multi_label"], false);
    }

    #[test]
    fn parses_ranked_payload() {
        let raw = r#"{"sequence":"x","labels":["produtivo","improdutivo"],"scores":[0.91,0.09]}"#;
        match serde_json::from_str::<ZeroShotResponse>(raw).unwrap() {
            ZeroShotResponse::Ranked { labels, scores } => {
                assert_eq!(labels, vec!["produtivo", "improdutivo"]);
                assert_eq!(scores, vec![0.91, 0.09]);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn parses_pair_payload() {
        let raw = r#"[{"label":"improdutivo","score":0.7},{"label":"produtivo","score":0.3}]"#;
        match serde_json::from_str::<ZeroShotResponse>(raw).unwrap() {
            ZeroShotResponse::Pairs(pairs) => assert_eq!(pairs[0].label, "improdutivo"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn parses_error_payload() {
        let raw = r#"{"error":"Model is currently loading","estimated_time":20.5}"#;
        match serde_json::from_str::<ZeroShotResponse>(raw).unwrap() {
            ZeroShotResponse::Error { estimated_time, .. } => {
                assert_eq!(estimated_time, Some(20.5))
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn model_name_is_taken_from_url() {
        let classifier = HuggingFaceClassifier::new(
            "https://api-inference.huggingface.co/models/facebook/bart-large-mnli",
            SecretString::from("hf".to_string()),
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(classifier.model_name(), "facebook/bart-large-mnli");
    }
}
