use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Result count used when a query has no usable limit.
pub const DEFAULT_LIMIT: u32 = 10;

/// Stored embedding of one catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct EmbeddingRecord {
    pub item: String,
    pub vector: Vec<f32>,
    pub updated: DateTime<Utc>,
}

/// Query string of `GET /api/recommended`.
///
/// `limit` stays a string so that `limit=abc` falls back to the default
/// instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecommendQuery {
    /// Free-text phrase to find neighbours for
    #[param(example = "wireless headphones")]
    pub phrase: Option<String>,
    /// Maximum number of items; missing, non-numeric, zero or negative means 10
    #[param(example = "5")]
    pub limit: Option<String>,
}

impl RecommendQuery {
    /// Parsed limit, `0` when absent or not an integer.
    pub fn requested_limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(0)
    }
}

/// Limit actually applied to a nearest-neighbour search.
pub fn effective_limit(requested: i64) -> u32 {
    if requested > 0 {
        u32::try_from(requested).unwrap_or(u32::MAX)
    } else {
        DEFAULT_LIMIT
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Recommendation {
    #[schema(example = "sku-1234")]
    pub item: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecommendationsResponse {
    pub success: bool,
    /// Items ordered by ascending cosine distance
    pub records: Vec<Recommendation>,
}

impl RecommendationsResponse {
    pub fn new(items: Vec<String>) -> Self {
        Self {
            success: true,
            records: items
                .into_iter()
                .map(|item| Recommendation { item })
                .collect(),
        }
    }
}

/// Body of `202 Accepted` for a training upload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrainAccepted {
    #[schema(example = "Body saved successfully")]
    pub message: String,
    /// Where the corpus was persisted for the job
    #[schema(example = "/tmp/corpus-0b9f6d2e-6f9b-4c36-9d43-5bd0b1f0d7c1.txt")]
    pub file: String,
    pub job_id: Uuid,
}

/// Item-dump row left out of a reindex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SkippedRow {
    pub item: String,
    pub reason: String,
}

/// Outcome of a committed reindex.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReindexReport {
    /// Rows with a non-empty item key in the dump
    pub total_rows: usize,
    /// Records written in the committed transaction
    pub indexed: usize,
    pub skipped: Vec<SkippedRow>,
}

impl ReindexReport {
    pub fn skip(&mut self, item: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedRow {
            item: item.into(),
            reason: reason.into(),
        });
    }
}

/// Lifecycle of a training job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for the pipeline lock
    Pending,
    Training,
    Reindexing,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Training => "training",
            JobState::Reindexing => "reindexing",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobStatus {
    pub id: Uuid,
    pub state: JobState,
    pub corpus_path: String,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure reason once the job is `failed`
    pub error: Option<String>,
    /// Reindex outcome once the job is `done`
    pub report: Option<ReindexReport>,
}

impl JobStatus {
    pub fn pending(id: Uuid, corpus_path: String) -> Self {
        Self {
            id,
            state: JobState::Pending,
            corpus_path,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            report: None,
        }
    }
}
