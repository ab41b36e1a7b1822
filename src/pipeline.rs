//! Request orchestration.
//!
//! A request moves through fixed stages:
//! `Received → Validated → Normalized → Classified → ResponseGenerated → Done`,
//! or ends in `Failed` from any of them. Both remote calls run on the shared
//! [`WorkerPool`]; reply generation starts only once classification is done.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::classifier::{CachedClassifier, HuggingFaceClassifier, ZeroShotClassifier};
use crate::config::ServiceConfig;
use crate::error::{ClassifierError, PipelineError, ValidationError};
use crate::extract::{EmailFile, extract_text};
use crate::normalize::{MAX_TEXT_CHARS, Normalizer};
use crate::reply::{GeminiGenerator, ReplyDrafter, ReplyGenerator};
use crate::worker::WorkerPool;

/// Scores below this are logged as low-confidence. The top label is still used.
const LOW_CONFIDENCE: f64 = 0.6;

/// Where the email text comes from.
#[derive(Debug)]
pub enum EmailInput {
    Text(String),
    File(EmailFile),
}

/// Final result returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub category: String,
    pub confidence: String,
    pub suggested_response: String,
}

/// Pipeline stage, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Normalized,
    Classified,
    ResponseGenerated,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Normalized => "normalized",
            Self::Classified => "classified",
            Self::ResponseGenerated => "response_generated",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Sequences extraction, normalization, classification and reply drafting.
pub struct TriagePipeline {
    normalizer: Normalizer,
    classifier: CachedClassifier,
    drafter: ReplyDrafter,
    pool: Arc<WorkerPool>,
}

impl TriagePipeline {
    /// Build a pipeline whose caches each hold `cache_capacity` entries.
    pub fn new(
        classifier: Arc<dyn ZeroShotClassifier>,
        generator: Arc<dyn ReplyGenerator>,
        pool: Arc<WorkerPool>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            normalizer: Normalizer::portuguese(),
            classifier: CachedClassifier::new(classifier, cache_capacity),
            drafter: ReplyDrafter::new(generator, cache_capacity),
            pool,
        }
    }

    /// Build the pipeline against the remote services named in `config`.
    pub fn from_config(config: &ServiceConfig, pool: Arc<WorkerPool>) -> crate::error::Result<Self> {
        let classifier = HuggingFaceClassifier::new(
            config.classifier_url.clone(),
            config.classifier_api_key.clone(),
            config.classify_timeout,
        )?;
        let generator = GeminiGenerator::new(
            config.generator_base_url.clone(),
            config.generator_model.clone(),
            config.generator_api_key.clone(),
        );

        Ok(
            Self::new(Arc::new(classifier), Arc::new(generator), pool, config.cache_capacity)
                .with_generate_timeout(config.generate_timeout),
        )
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_generate_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.drafter = self.drafter.with_timeout(timeout);
        self
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Run one request to completion.
    pub async fn run(&self, input: EmailInput) -> Result<Verdict, PipelineError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("triage", %request_id);

        async move {
            let mut stage = Stage::Received;
            let result = self.advance(input, &mut stage).await;
            match &result {
                Ok(verdict) => info!(
                    category = %verdict.category,
                    confidence = %verdict.confidence,
                    "Email triaged"
                ),
                Err(e) => {
                    warn!(failed_after = %stage, error = %e, "Triage failed");
                    debug!(from = %stage, to = %Stage::Failed, "Stage transition");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn advance(&self, input: EmailInput, stage: &mut Stage) -> Result<Verdict, PipelineError> {
        let text = match input {
            EmailInput::File(file) => extract_text(file).await?,
            EmailInput::Text(text) => text,
        };

        validate(&text)?;
        transition(stage, Stage::Validated);

        let normalized = self.normalizer.normalize(&text);
        if normalized.is_empty() {
            return Err(ValidationError::NothingToClassify.into());
        }
        transition(stage, Stage::Normalized);

        let classification = self.classifier.classify(&self.pool, &normalized).await?;
        let best = classification
            .best()
            .filter(|best| !best.label.is_empty())
            .ok_or_else(|| ClassifierError::InvalidResponse {
                reason: "no label in ranking".to_string(),
            })?;
        if best.score < LOW_CONFIDENCE {
            debug!(label = %best.label, score = best.score, "Low-confidence classification");
        }
        transition(stage, Stage::Classified);

        let draft = self.drafter.draft(&self.pool, &best.label, &text).await;
        transition(stage, Stage::ResponseGenerated);

        let verdict = Verdict {
            category: capitalize(&best.label),
            confidence: format_confidence(best.score),
            suggested_response: draft.into_text(),
        };
        transition(stage, Stage::Done);
        Ok(verdict)
    }
}

fn transition(stage: &mut Stage, next: Stage) {
    debug!(from = %stage, to = %next, "Stage transition");
    *stage = next;
}

/// Reject text that is blank or longer than [`MAX_TEXT_CHARS`].
pub fn validate(text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let length = text.chars().count();
    if length > MAX_TEXT_CHARS {
        return Err(ValidationError::TooLong {
            length,
            max: MAX_TEXT_CHARS,
        });
    }
    Ok(())
}

/// Upper-case the first character and lower-case the rest.
pub fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}

/// Score in `[0, 1]` as a percentage rounded to two decimals.
///
/// Whole percentages keep one decimal place (`91.0%`); others print only the
/// digits they need (`87.35%`, `87.3%`).
pub fn format_confidence(score: f64) -> String {
    let percent = (score * 100.0 * 100.0).round() / 100.0;
    if percent.fract() == 0.0 {
        format!("{percent:.1}%")
    } else {
        format!("{percent}%")
    }
}
