//! Suggested reply drafting.
//!
//! [`ReplyGenerator`] is the seam to the remote generative model;
//! [`ReplyDrafter`] picks the prompt for a category, memoizes successful
//! drafts and absorbs every failure into [`ReplyDraft::Unavailable`].

pub mod gemini;

pub use gemini::GeminiGenerator;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cache::{BoundedCache, content_hash};
use crate::classifier::PRODUCTIVE_LABEL;
use crate::error::GenerationError;
use crate::normalize::truncate_chars;
use crate::worker::WorkerPool;

/// Characters of the original email embedded in prompts and cache keys.
pub const REPLY_CONTEXT_CHARS: usize = 1_000;

/// Reply shown when no draft could be generated.
pub const FALLBACK_REPLY: &str = "Não foi possível sugerir uma resposta.";

/// A remote text generation model.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Generate text for a single prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Outcome of a drafting attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyDraft {
    Generated(String),
    Unavailable,
}

impl ReplyDraft {
    /// Draft text, or [`FALLBACK_REPLY`] when none was produced.
    pub fn into_text(self) -> String {
        match self {
            Self::Generated(text) => text,
            Self::Unavailable => FALLBACK_REPLY.to_string(),
        }
    }
}

/// Prompt variants, one per category branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// Productive mail: acknowledge receipt and promise processing.
    Acknowledge,
    /// Anything else: short cordial reply for low-priority mail.
    Cordial,
}

impl PromptTemplate {
    pub fn for_category(category: &str) -> Self {
        if category.eq_ignore_ascii_case(PRODUCTIVE_LABEL) {
            Self::Acknowledge
        } else {
            Self::Cordial
        }
    }

    /// Render the prompt around an email excerpt.
    pub fn render(&self, email: &str) -> String {
        match self {
            Self::Acknowledge => format!(
                "Sugira uma resposta curta e profissional para o seguinte email, \
                 acusando o recebimento e informando que a solicitação será processada:\
                 \n\nEmail: \"{email}\"\n\nResposta:"
            ),
            Self::Cordial => format!(
                "Sugira uma resposta curta e cordial para o seguinte email de baixa prioridade:\
                 \n\nEmail: \"{email}\"\n\nResposta:"
            ),
        }
    }
}

/// Memoizing front for a [`ReplyGenerator`] with fallback semantics.
pub struct ReplyDrafter {
    inner: Arc<dyn ReplyGenerator>,
    cache: BoundedCache<String>,
    timeout: Option<Duration>,
}

impl ReplyDrafter {
    pub fn new(inner: Arc<dyn ReplyGenerator>, capacity: usize) -> Self {
        Self {
            inner,
            cache: BoundedCache::new("reply", capacity),
            timeout: None,
        }
    }

    /// Bound each generation call. Without this a slow model blocks its
    /// worker slot until it answers.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Draft a reply for `original_text` classified as `category`.
    ///
    /// Never fails: any error is logged and reported as
    /// [`ReplyDraft::Unavailable`], which is not cached.
    pub async fn draft(&self, pool: &WorkerPool, category: &str, original_text: &str) -> ReplyDraft {
        let excerpt = truncate_chars(original_text, REPLY_CONTEXT_CHARS);
        let key = content_hash(&[category, excerpt]);

        let result = self
            .cache
            .get_or_try_insert_with(&key, || async {
                let template = PromptTemplate::for_category(category);
                let prompt = template.render(excerpt);
                let inner = Arc::clone(&self.inner);
                let timeout = self.timeout;

                info!(model = inner.model_name(), ?template, "Requesting reply draft");
                let text = pool
                    .run(async move { generate_with_timeout(inner.as_ref(), &prompt, timeout).await })
                    .await
                    .map_err(|e| GenerationError::RequestFailed(e.to_string()))??;

                let text = text.trim();
                if text.is_empty() {
                    return Err(GenerationError::EmptyOutput);
                }
                debug!(chars = text.len(), "Reply draft stored");
                Ok(text.to_string())
            })
            .await;

        match result {
            Ok(text) => ReplyDraft::Generated(text),
            Err(e) => {
                warn!(error = %e, "Reply generation failed, using fallback");
                ReplyDraft::Unavailable
            }
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

async fn generate_with_timeout(
    generator: &dyn ReplyGenerator,
    prompt: &str,
    timeout: Option<Duration>,
) -> Result<String, GenerationError> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, generator.generate(prompt))
            .await
            .map_err(|_| GenerationError::Timeout { timeout })?,
        None => generator.generate(prompt).await,
    }
}
