//! Zero-shot email classification.
//!
//! [`ZeroShotClassifier`] is the seam to the remote service;
//! [`CachedClassifier`] adds content-hash memoization and runs misses on the
//! worker pool.

pub mod huggingface;

pub use huggingface::HuggingFaceClassifier;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{BoundedCache, content_hash};
use crate::error::{ClassifierError, PipelineError};
use crate::worker::WorkerPool;

/// Label for mail that needs action.
pub const PRODUCTIVE_LABEL: &str = "produtivo";

/// Label for mail that needs no action.
pub const UNPRODUCTIVE_LABEL: &str = "improdutivo";

/// Candidate labels sent with every classification request.
pub const CANDIDATE_LABELS: [&str; 2] = [PRODUCTIVE_LABEL, UNPRODUCTIVE_LABEL];

/// One label and its score as reported by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// Labels ranked by the remote classifier, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub ranking: Vec<LabelScore>,
}

impl ClassificationResult {
    pub fn new(ranking: Vec<LabelScore>) -> Self {
        Self { ranking }
    }

    /// The remote service's top-ranked label. Not re-sorted locally.
    pub fn best(&self) -> Option<&LabelScore> {
        self.ranking.first()
    }
}

/// A remote zero-shot text classifier.
#[async_trait]
pub trait ZeroShotClassifier: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Rank `labels` for `text`, best first.
    async fn classify(
        &self,
        text: &str,
        labels: &[&str],
    ) -> Result<ClassificationResult, ClassifierError>;
}

/// Memoizing front for a [`ZeroShotClassifier`].
pub struct CachedClassifier {
    inner: Arc<dyn ZeroShotClassifier>,
    cache: BoundedCache<ClassificationResult>,
}

impl CachedClassifier {
    pub fn new(inner: Arc<dyn ZeroShotClassifier>, capacity: usize) -> Self {
        Self {
            inner,
            cache: BoundedCache::new("classification", capacity),
        }
    }

    /// Classify normalized text against [`CANDIDATE_LABELS`].
    ///
    /// A cache hit returns without touching the pool or the remote service.
    /// Only successful results are stored.
    pub async fn classify(
        &self,
        pool: &WorkerPool,
        normalized: &str,
    ) -> Result<ClassificationResult, PipelineError> {
        let key = content_hash(&[normalized]);

        self.cache
            .get_or_try_insert_with(&key, || async {
                let inner = Arc::clone(&self.inner);
                let text = normalized.to_string();

                info!(model = inner.model_name(), "Requesting classification");
                let result = pool
                    .run(async move { inner.classify(&text, &CANDIDATE_LABELS).await })
                    .await??;

                debug!(labels = result.ranking.len(), "Classification stored");
                Ok::<_, PipelineError>(result)
            })
            .await
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}
