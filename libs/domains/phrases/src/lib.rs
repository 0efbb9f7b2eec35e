//! Phrases Domain
//!
//! Phrase-to-item recommendations backed by a StarSpace model and a
//! pgvector store.
//!
//! # Architecture
//!
//! ```text
//!   POST /api/train                      GET /api/recommended
//!          │                                      │
//! ┌────────▼─────────┐                  ┌─────────▼──────────┐
//! │PipelineController│                  │RecommendationService│
//! └───┬──────────┬───┘                  └───┬────────────┬───┘
//!     │          │                          │            │
//! ┌───▼───┐ ┌────▼─────┐              ┌─────▼────┐ ┌─────▼─────────────┐
//! │Trainer│ │Reindexer │──────────────► Embedder │ │EmbeddingRepository│
//! └───┬───┘ └────┬─────┘              └─────┬────┘ │     (trait)       │
//!     │          │                          │      └─────┬──────┬──────┘
//!  starspace     └──── item dump ──┐     embed_doc       │      │
//!     │                            │        │        Postgres  InMemory
//!     └── model + model.tsv ───────┴────────┘        (pgvector)
//! ```
//!
//! Training jobs run one at a time in the background. A reindex embeds
//! every item of the dump and replaces the store content in a single
//! transaction, so queries see either the previous or the new catalog.
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_phrases::{
//!     handlers, InMemoryEmbeddingRepository, PipelineConfig, PipelineController,
//!     RecommendationService, Reindexer, StarSpaceConfig, StarSpaceEmbedder, StarSpaceTrainer,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let starspace = StarSpaceConfig::new("/opt/starspace/starspace", "/opt/starspace/embed_doc", "/data");
//! let embedder = Arc::new(StarSpaceEmbedder::new(&starspace));
//! let repository = Arc::new(InMemoryEmbeddingRepository::new());
//!
//! let service = RecommendationService::new(repository.clone(), embedder.clone(), starspace.dim);
//! let reindexer = Arc::new(Reindexer::new(embedder, repository, &starspace));
//! let pipeline = PipelineController::new(
//!     Arc::new(StarSpaceTrainer::new(starspace)),
//!     reindexer,
//!     PipelineConfig::new(std::env::temp_dir()),
//! );
//!
//! let router = handlers::router(service, pipeline);
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod postgres;
pub mod process;
pub mod reindex;
pub mod repository;
pub mod service;
pub mod trainer;

// Re-export commonly used types
pub use config::{PipelineConfig, StarSpaceConfig};
pub use embedding::{Embedder, StarSpaceEmbedder};
pub use error::{PhraseError, PhraseResult};
pub use handlers::{ApiDoc, PhrasesState};
pub use models::{
    EmbeddingRecord, JobState, JobStatus, RecommendQuery, Recommendation,
    RecommendationsResponse, ReindexReport, SkippedRow, TrainAccepted,
};
pub use pipeline::PipelineController;
pub use postgres::PgEmbeddingRepository;
pub use reindex::Reindexer;
pub use repository::{EmbeddingRepository, InMemoryEmbeddingRepository, ReindexTransaction};
pub use service::RecommendationService;
pub use trainer::{StarSpaceTrainer, Trainer};
