use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::PhraseResult;
use crate::models::EmbeddingRecord;

/// One write transaction that replaces the indexed catalog.
///
/// Nothing is visible to readers until [`commit`](Self::commit) succeeds.
/// Dropping the transaction without committing discards every change.
#[async_trait]
pub trait ReindexTransaction: Send {
    /// Delete every record
    async fn clear(&mut self) -> PhraseResult<()>;

    /// Insert or replace the record for `item`, refreshing its timestamp
    async fn upsert(&mut self, item: &str, vector: &[f32]) -> PhraseResult<()>;

    async fn commit(self: Box<Self>) -> PhraseResult<()>;
}

/// Repository trait for the vector store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingRepository: Send + Sync {
    /// Open a reindex transaction
    async fn begin_reindex(&self) -> PhraseResult<Box<dyn ReindexTransaction>>;

    /// Items closest to `vector` by cosine distance, ties broken by item key
    async fn nearest(&self, vector: &[f32], limit: u32) -> PhraseResult<Vec<String>>;

    /// Number of committed records
    async fn count(&self) -> PhraseResult<u64>;

    /// All committed records ordered by item key
    async fn list(&self) -> PhraseResult<Vec<EmbeddingRecord>>;
}

/// Cosine distance in `[0, 2]`; a zero vector is treated as orthogonal to everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

type Records = Arc<RwLock<HashMap<String, EmbeddingRecord>>>;

/// In-memory implementation of EmbeddingRepository (for development/testing)
///
/// A reindex stages its writes and swaps them in under the write lock at
/// commit, so readers see either the old or the new catalog.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEmbeddingRepository {
    records: Records,
}

impl InMemoryEmbeddingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingRepository for InMemoryEmbeddingRepository {
    async fn begin_reindex(&self) -> PhraseResult<Box<dyn ReindexTransaction>> {
        let staged = self.records.read().await.clone();
        Ok(Box::new(InMemoryReindex {
            target: Arc::clone(&self.records),
            staged,
        }))
    }

    async fn nearest(&self, vector: &[f32], limit: u32) -> PhraseResult<Vec<String>> {
        let records = self.records.read().await;

        let mut scored: Vec<(f32, &str)> = records
            .values()
            .map(|r| (cosine_distance(vector, &r.vector), r.item.as_str()))
            .collect();
        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(b.1))
        });

        Ok(scored
            .into_iter()
            .take(limit as usize)
            .map(|(_, item)| item.to_string())
            .collect())
    }

    async fn count(&self) -> PhraseResult<u64> {
        Ok(self.records.read().await.len() as u64)
    }

    async fn list(&self) -> PhraseResult<Vec<EmbeddingRecord>> {
        let mut records: Vec<EmbeddingRecord> =
            self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.item.cmp(&b.item));
        Ok(records)
    }
}

struct InMemoryReindex {
    target: Records,
    staged: HashMap<String, EmbeddingRecord>,
}

#[async_trait]
impl ReindexTransaction for InMemoryReindex {
    async fn clear(&mut self) -> PhraseResult<()> {
        self.staged.clear();
        Ok(())
    }

    async fn upsert(&mut self, item: &str, vector: &[f32]) -> PhraseResult<()> {
        self.staged.insert(
            item.to_string(),
            EmbeddingRecord {
                item: item.to_string(),
                vector: vector.to_vec(),
                updated: Utc::now(),
            },
        );
        Ok(())
    }

    async fn commit(self: Box<Self>) -> PhraseResult<()> {
        let InMemoryReindex { target, staged } = *self;
        *target.write().await = staged;
        Ok(())
    }
}
