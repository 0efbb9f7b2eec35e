//! Shared state of the readiness endpoint.

use database::postgres::DatabaseConnection;
use domain_phrases::{PgEmbeddingRepository, RecommendationService};

#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub db: DatabaseConnection,
    /// Query service, consulted for model presence
    pub service: RecommendationService<PgEmbeddingRepository>,
}
