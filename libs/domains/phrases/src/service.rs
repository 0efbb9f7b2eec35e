use observability::PhraseMetrics;
use std::sync::Arc;
use std::time::Instant;

use crate::embedding::Embedder;
use crate::error::{PhraseError, PhraseResult};
use crate::models::effective_limit;
use crate::repository::EmbeddingRepository;

/// Query path: embed a phrase and look up its nearest catalog items.
pub struct RecommendationService<R: EmbeddingRepository> {
    repository: Arc<R>,
    embedder: Arc<dyn Embedder>,
    dim: usize,
}

impl<R: EmbeddingRepository> Clone for RecommendationService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            embedder: Arc::clone(&self.embedder),
            dim: self.dim,
        }
    }
}

impl<R: EmbeddingRepository> RecommendationService<R> {
    pub fn new(repository: Arc<R>, embedder: Arc<dyn Embedder>, dim: usize) -> Self {
        Self {
            repository,
            embedder,
            dim,
        }
    }

    /// Items closest to `phrase`, at most `limit` (10 when `limit <= 0`).
    pub async fn recommend(&self, phrase: &str, limit: i64) -> PhraseResult<Vec<String>> {
        let started = Instant::now();
        let result = self.search(phrase, limit).await;

        match &result {
            Ok(items) => PhraseMetrics::record_query("ok", items.len(), started.elapsed()),
            Err(e) => PhraseMetrics::record_query(e.code().as_str(), 0, started.elapsed()),
        }

        result
    }

    async fn search(&self, phrase: &str, limit: i64) -> PhraseResult<Vec<String>> {
        if phrase.trim().is_empty() {
            return Err(PhraseError::Validation(
                "phrase must not be empty".to_string(),
            ));
        }
        let limit = effective_limit(limit);

        let vector = self.embedder.embed(phrase).await.map_err(|e| match e {
            PhraseError::ArtifactMissing(what) => PhraseError::ArtifactMissing(what),
            other => PhraseError::Embedding(other.to_string()),
        })?;

        if vector.len() != self.dim {
            return Err(PhraseError::Embedding(
                PhraseError::DimensionMismatch {
                    expected: self.dim,
                    actual: vector.len(),
                }
                .to_string(),
            ));
        }

        self.repository
            .nearest(&vector, limit)
            .await
            .map_err(|e| match e {
                PhraseError::StoreQuery(_) => e,
                other => PhraseError::StoreQuery(other.to_string()),
            })
    }

    /// Number of indexed catalog items
    pub async fn catalog_size(&self) -> PhraseResult<u64> {
        self.repository.count().await
    }

    /// Whether a trained model is available for queries
    pub fn model_ready(&self) -> bool {
        self.embedder.model_ready()
    }
}
