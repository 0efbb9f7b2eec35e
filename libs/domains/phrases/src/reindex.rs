//! Rebuild of the vector store from the trainer's item dump.

use observability::PhraseMetrics;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::config::StarSpaceConfig;
use crate::embedding::Embedder;
use crate::error::{PhraseError, PhraseResult};
use crate::models::ReindexReport;
use crate::repository::EmbeddingRepository;

/// Item keys from the first column of a tab-separated dump.
///
/// Quotes are not special, rows may have any width, and rows whose first
/// field is empty are ignored.
pub fn read_item_keys(path: &Path) -> PhraseResult<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .quoting(false)
        .flexible(true)
        .has_headers(false)
        .from_path(path)?;

    let mut items = Vec::new();
    for record in reader.byte_records() {
        let record = record?;
        if let Some(field) = record.get(0).filter(|field| !field.is_empty()) {
            items.push(String::from_utf8_lossy(field).into_owned());
        }
    }

    Ok(items)
}

fn ensure_artifact(path: &Path, what: &str) -> PhraseResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PhraseError::ArtifactMissing(format!(
            "{} {}",
            what,
            path.display()
        )))
    }
}

/// Embeds every catalog item and swaps the result into the store in one
/// transaction.
pub struct Reindexer {
    embedder: Arc<dyn Embedder>,
    repository: Arc<dyn EmbeddingRepository>,
    model_path: PathBuf,
    tsv_path: PathBuf,
    dim: usize,
}

impl Reindexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        repository: Arc<dyn EmbeddingRepository>,
        config: &StarSpaceConfig,
    ) -> Self {
        Self {
            embedder,
            repository,
            model_path: config.model_path.clone(),
            tsv_path: config.tsv_path.clone(),
            dim: config.dim,
        }
    }

    /// Replace the store content with fresh embeddings of the item dump.
    ///
    /// Rows that fail to embed or have the wrong dimension are reported in
    /// [`ReindexReport::skipped`]. A failing transaction leaves the store at
    /// its previous content.
    #[instrument(skip(self), fields(dump = %self.tsv_path.display()))]
    pub async fn reindex(&self) -> PhraseResult<ReindexReport> {
        let started = Instant::now();
        let result = self.run().await;

        match &result {
            Ok(report) => {
                PhraseMetrics::record_reindex_completed(
                    report.indexed,
                    report.skipped.len(),
                    started.elapsed(),
                );
                info!(
                    total_rows = report.total_rows,
                    indexed = report.indexed,
                    skipped = report.skipped.len(),
                    "Reindex committed"
                );
            }
            Err(e) => {
                PhraseMetrics::record_reindex_failed(started.elapsed());
                error!(error = %e, "Reindex aborted, store left unchanged");
            }
        }

        result
    }

    async fn run(&self) -> PhraseResult<ReindexReport> {
        ensure_artifact(&self.model_path, "model")?;
        ensure_artifact(&self.tsv_path, "item dump")?;

        let dump = self.tsv_path.clone();
        let items = tokio::task::spawn_blocking(move || read_item_keys(&dump)).await??;

        let mut report = ReindexReport {
            total_rows: items.len(),
            ..Default::default()
        };
        let embedded = self.embed_items(items, &mut report).await;

        let mut tx = self.repository.begin_reindex().await?;
        tx.clear().await?;
        for (item, vector) in &embedded {
            tx.upsert(item, vector).await?;
        }
        tx.commit().await?;

        report.indexed = embedded.len();
        Ok(report)
    }

    async fn embed_items(
        &self,
        items: Vec<String>,
        report: &mut ReindexReport,
    ) -> Vec<(String, Vec<f32>)> {
        let mut seen = HashSet::with_capacity(items.len());
        let mut embedded = Vec::with_capacity(items.len());

        for item in items {
            if !seen.insert(item.clone()) {
                report.skip(item, "duplicate item key");
                continue;
            }

            match self.embedder.embed(&item).await {
                Ok(vector) if vector.len() == self.dim => embedded.push((item, vector)),
                Ok(vector) => {
                    let reason = PhraseError::DimensionMismatch {
                        expected: self.dim,
                        actual: vector.len(),
                    };
                    warn!(item = %item, "Skipping item: {}", reason);
                    report.skip(item, reason.to_string());
                }
                Err(e) => {
                    warn!(item = %item, error = %e, "Skipping item: embedding failed");
                    report.skip(item, e.to_string());
                }
            }
        }

        embedded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedder;
    use crate::models::EmbeddingRecord;
    use crate::repository::{InMemoryEmbeddingRepository, ReindexTransaction};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    const DIM: usize = 3;

    struct Artifacts {
        dir: TempDir,
    }

    impl Artifacts {
        fn new(dump: &str) -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("model"), "model").unwrap();
            fs::write(dir.path().join("model.tsv"), dump).unwrap();
            Self { dir }
        }

        fn config(&self) -> StarSpaceConfig {
            StarSpaceConfig::new("starspace", "embed_doc", self.dir.path()).with_dim(DIM)
        }
    }

    /// Embeds `x<n>` items to a unit vector on axis n and fails on `broken`.
    fn axis_embedder() -> MockEmbedder {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().returning(|phrase| match phrase {
            "broken" => Err(PhraseError::SubprocessExit {
                program: "embed_doc".into(),
                status: "exit status: 3".into(),
                output: "bad input".into(),
            }),
            "short" => Ok(vec![1.0]),
            other => {
                let axis: usize = other.trim_start_matches('x').parse().unwrap_or(0);
                let mut v = vec![0.0; DIM];
                v[axis % DIM] = 1.0;
                Ok(v)
            }
        });
        embedder.expect_model_ready().return_const(true);
        embedder
    }

    fn reindexer(
        artifacts: &Artifacts,
        repository: Arc<dyn EmbeddingRepository>,
    ) -> Reindexer {
        Reindexer::new(Arc::new(axis_embedder()), repository, &artifacts.config())
    }

    fn items(records: &[EmbeddingRecord]) -> Vec<&str> {
        records.iter().map(|r| r.item.as_str()).collect()
    }

    #[test]
    fn test_read_item_keys_tolerates_ragged_rows() {
        let artifacts = Artifacts::new("x0\t0.1\t0.2\n\t0.3\nx1\n\"quoted\"\tz\n\nx2\ta\tb\tc\td\n");
        let keys = read_item_keys(&artifacts.config().tsv_path).unwrap();
        assert_eq!(keys, vec!["x0", "x1", "\"quoted\"", "x2"]);
    }

    #[tokio::test]
    async fn test_one_failing_item_is_skipped() {
        let artifacts = Artifacts::new("x0\nbroken\nx1\n");
        let repo = Arc::new(InMemoryEmbeddingRepository::new());

        let report = reindexer(&artifacts, repo.clone()).reindex().await.unwrap();

        assert_eq!(report.total_rows, 3);
        assert_eq!(report.indexed, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].item, "broken");
        assert!(report.skipped[0].reason.contains("bad input"));
        assert_eq!(items(&repo.list().await.unwrap()), vec!["x0", "x1"]);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_skipped() {
        let artifacts = Artifacts::new("x0\nshort\n");
        let repo = Arc::new(InMemoryEmbeddingRepository::new());

        let report = reindexer(&artifacts, repo.clone()).reindex().await.unwrap();

        assert_eq!(report.indexed, 1);
        assert_eq!(report.skipped[0].item, "short");
        assert_eq!(report.skipped[0].reason, "Vector has 1 dimensions, expected 3");
    }

    #[tokio::test]
    async fn test_duplicate_rows_indexed_once() {
        let artifacts = Artifacts::new("x0\nx1\nx0\n");
        let repo = Arc::new(InMemoryEmbeddingRepository::new());

        let report = reindexer(&artifacts, repo.clone()).reindex().await.unwrap();

        assert_eq!(report.indexed, 2);
        assert_eq!(report.skipped[0].reason, "duplicate item key");
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reindex_replaces_previous_catalog() {
        let repo = Arc::new(InMemoryEmbeddingRepository::new());
        reindexer(&Artifacts::new("x0\nx1\n"), repo.clone())
            .reindex()
            .await
            .unwrap();

        reindexer(&Artifacts::new("x2\n"), repo.clone())
            .reindex()
            .await
            .unwrap();

        assert_eq!(items(&repo.list().await.unwrap()), vec!["x2"]);
    }

    #[tokio::test]
    async fn test_reindex_twice_is_stable() {
        let artifacts = Artifacts::new("x0\nx1\nx2\n");
        let repo = Arc::new(InMemoryEmbeddingRepository::new());
        let reindexer = reindexer(&artifacts, repo.clone());

        reindexer.reindex().await.unwrap();
        let first = repo.list().await.unwrap();
        reindexer.reindex().await.unwrap();
        let second = repo.list().await.unwrap();

        assert_eq!(items(&first), items(&second));
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.vector, b.vector);
            assert!(b.updated >= a.updated);
        }
    }

    #[tokio::test]
    async fn test_missing_dump_is_artifact_missing() {
        let artifacts = Artifacts::new("x0\n");
        fs::remove_file(artifacts.config().tsv_path).unwrap();
        let repo = Arc::new(InMemoryEmbeddingRepository::new());

        let err = reindexer(&artifacts, repo).reindex().await.unwrap_err();

        assert!(matches!(err, PhraseError::ArtifactMissing(ref what) if what.starts_with("item dump")));
    }

    #[tokio::test]
    async fn test_missing_model_checked_before_embedding() {
        let artifacts = Artifacts::new("x0\n");
        fs::remove_file(artifacts.config().model_path).unwrap();
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().never();

        let err = Reindexer::new(
            Arc::new(embedder),
            Arc::new(InMemoryEmbeddingRepository::new()),
            &artifacts.config(),
        )
        .reindex()
        .await
        .unwrap_err();

        assert!(matches!(err, PhraseError::ArtifactMissing(_)));
    }

    #[derive(Clone, Copy)]
    enum FailAt {
        Upsert(&'static str),
        Commit,
    }

    /// Store whose reindex transactions fail at a chosen step.
    struct FailingRepository {
        inner: InMemoryEmbeddingRepository,
        fail_at: FailAt,
    }

    struct FailingTransaction {
        inner: Box<dyn ReindexTransaction>,
        fail_at: FailAt,
    }

    #[async_trait]
    impl ReindexTransaction for FailingTransaction {
        async fn clear(&mut self) -> PhraseResult<()> {
            self.inner.clear().await
        }

        async fn upsert(&mut self, item: &str, vector: &[f32]) -> PhraseResult<()> {
            match self.fail_at {
                FailAt::Upsert(failing) if failing == item => Err(PhraseError::Transaction(
                    format!("upsert {}: invalid input syntax for type vector", item),
                )),
                _ => self.inner.upsert(item, vector).await,
            }
        }

        async fn commit(self: Box<Self>) -> PhraseResult<()> {
            match self.fail_at {
                FailAt::Commit => Err(PhraseError::Transaction("commit: connection reset".into())),
                FailAt::Upsert(_) => self.inner.commit().await,
            }
        }
    }

    #[async_trait]
    impl EmbeddingRepository for FailingRepository {
        async fn begin_reindex(&self) -> PhraseResult<Box<dyn ReindexTransaction>> {
            Ok(Box::new(FailingTransaction {
                inner: self.inner.begin_reindex().await?,
                fail_at: self.fail_at,
            }))
        }

        async fn nearest(&self, vector: &[f32], limit: u32) -> PhraseResult<Vec<String>> {
            self.inner.nearest(vector, limit).await
        }

        async fn count(&self) -> PhraseResult<u64> {
            self.inner.count().await
        }

        async fn list(&self) -> PhraseResult<Vec<EmbeddingRecord>> {
            self.inner.list().await
        }
    }

    async fn seeded_store() -> InMemoryEmbeddingRepository {
        let store = InMemoryEmbeddingRepository::new();
        reindexer(&Artifacts::new("x0\nx1\n"), Arc::new(store.clone()))
            .reindex()
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_store_unchanged() {
        let store = seeded_store().await;
        let before = store.list().await.unwrap();

        let failing = Arc::new(FailingRepository {
            inner: store.clone(),
            fail_at: FailAt::Commit,
        });
        let err = reindexer(&Artifacts::new("x2\n"), failing)
            .reindex()
            .await
            .unwrap_err();

        assert!(matches!(err, PhraseError::Transaction(_)));
        assert_eq!(store.list().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_failed_upsert_aborts_whole_reindex() {
        let store = seeded_store().await;
        let before = store.list().await.unwrap();

        let failing = Arc::new(FailingRepository {
            inner: store.clone(),
            fail_at: FailAt::Upsert("x1"),
        });
        let err = reindexer(&Artifacts::new("x2\nx1\nx0\n"), failing)
            .reindex()
            .await
            .unwrap_err();

        assert!(matches!(err, PhraseError::Transaction(ref msg) if msg.starts_with("upsert x1")));
        assert_eq!(store.list().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_begin_failure_is_reported() {
        let artifacts = Artifacts::new("x0\n");
        let mut repo = crate::repository::MockEmbeddingRepository::new();
        repo.expect_begin_reindex()
            .returning(|| Err(PhraseError::Transaction("begin: pool timed out".into())));

        let err = reindexer(&artifacts, Arc::new(repo))
            .reindex()
            .await
            .unwrap_err();

        assert!(matches!(err, PhraseError::Transaction(ref msg) if msg.starts_with("begin")));
    }
}
