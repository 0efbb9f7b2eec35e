use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_helpers::errors::responses::{
    BadRequestResponse, ConflictResponse, InternalServerErrorResponse, NotFoundResponse,
    PayloadTooLargeResponse, ServiceUnavailableResponse,
};
use std::sync::Arc;
use utoipa::OpenApi;
use uuid::Uuid;

use crate::error::{PhraseError, PhraseResult};
use crate::models::{
    JobState, JobStatus, Recommendation, RecommendQuery, RecommendationsResponse, ReindexReport,
    SkippedRow, TrainAccepted,
};
use crate::pipeline::PipelineController;
use crate::repository::EmbeddingRepository;
use crate::service::RecommendationService;

pub const TAG: &str = "phrases";

/// OpenAPI documentation for the phrases API
#[derive(OpenApi)]
#[openapi(
    paths(recommended, recommended_legacy, train, list_jobs, get_job),
    components(
        schemas(
            Recommendation,
            RecommendationsResponse,
            TrainAccepted,
            JobState,
            JobStatus,
            ReindexReport,
            SkippedRow
        ),
        responses(
            BadRequestResponse,
            NotFoundResponse,
            ConflictResponse,
            PayloadTooLargeResponse,
            ServiceUnavailableResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = TAG, description = "Phrase recommendations and model training")
    )
)]
pub struct ApiDoc;

/// Shared state of the phrases routes
pub struct PhrasesState<R: EmbeddingRepository> {
    pub service: Arc<RecommendationService<R>>,
    pub pipeline: PipelineController,
}

impl<R: EmbeddingRepository> Clone for PhrasesState<R> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            pipeline: self.pipeline.clone(),
        }
    }
}

/// Create the phrases router; nest it under `/api`.
pub fn router<R: EmbeddingRepository + 'static>(
    service: RecommendationService<R>,
    pipeline: PipelineController,
) -> Router {
    let state = PhrasesState {
        service: Arc::new(service),
        pipeline,
    };

    Router::new()
        .route("/recommended", get(recommended::<R>))
        .route("/recomended", get(recommended_legacy::<R>))
        .route(
            "/train",
            post(train::<R>).layer(DefaultBodyLimit::disable()),
        )
        .route("/jobs", get(list_jobs::<R>))
        .route("/jobs/{id}", get(get_job::<R>))
        .with_state(state)
}

/// Recommend catalog items for a phrase
#[utoipa::path(
    get,
    path = "/api/recommended",
    tag = TAG,
    params(RecommendQuery),
    responses(
        (status = 200, description = "Nearest items, closest first", body = RecommendationsResponse),
        (status = 400, response = BadRequestResponse),
        (status = 500, response = InternalServerErrorResponse),
        (status = 503, response = ServiceUnavailableResponse)
    )
)]
async fn recommended<R: EmbeddingRepository>(
    State(state): State<PhrasesState<R>>,
    Query(query): Query<RecommendQuery>,
) -> PhraseResult<Json<RecommendationsResponse>> {
    let phrase = query.phrase.as_deref().unwrap_or_default();
    let items = state
        .service
        .recommend(phrase, query.requested_limit())
        .await?;

    Ok(Json(RecommendationsResponse::new(items)))
}

/// Misspelled alias of `/api/recommended` kept for existing clients
#[utoipa::path(
    get,
    path = "/api/recomended",
    tag = TAG,
    params(RecommendQuery),
    responses(
        (status = 200, description = "Nearest items, closest first", body = RecommendationsResponse),
        (status = 400, response = BadRequestResponse),
        (status = 500, response = InternalServerErrorResponse),
        (status = 503, response = ServiceUnavailableResponse)
    )
)]
async fn recommended_legacy<R: EmbeddingRepository>(
    state: State<PhrasesState<R>>,
    query: Query<RecommendQuery>,
) -> PhraseResult<Json<RecommendationsResponse>> {
    recommended(state, query).await
}

/// Upload a training corpus and queue a training job
///
/// The raw request body is the corpus. Training and reindexing run in the
/// background; poll `/api/jobs/{id}` for the outcome.
#[utoipa::path(
    post,
    path = "/api/train",
    tag = TAG,
    request_body(content = String, content_type = "text/plain", description = "Training corpus"),
    responses(
        (status = 202, description = "Corpus saved and job queued", body = TrainAccepted),
        (status = 409, response = ConflictResponse),
        (status = 413, response = PayloadTooLargeResponse),
        (status = 500, response = InternalServerErrorResponse),
        (status = 503, response = ServiceUnavailableResponse)
    )
)]
async fn train<R: EmbeddingRepository>(
    State(state): State<PhrasesState<R>>,
    body: Body,
) -> PhraseResult<impl IntoResponse> {
    let accepted = state.pipeline.submit(body.into_data_stream()).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// List recent training jobs, newest first
#[utoipa::path(
    get,
    path = "/api/jobs",
    tag = TAG,
    responses(
        (status = 200, description = "Known jobs", body = Vec<JobStatus>)
    )
)]
async fn list_jobs<R: EmbeddingRepository>(
    State(state): State<PhrasesState<R>>,
) -> Json<Vec<JobStatus>> {
    Json(state.pipeline.jobs().await)
}

/// Get a training job by ID
#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    tag = TAG,
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job found", body = JobStatus),
        (status = 400, response = BadRequestResponse),
        (status = 404, response = NotFoundResponse)
    )
)]
async fn get_job<R: EmbeddingRepository>(
    State(state): State<PhrasesState<R>>,
    Path(id): Path<String>,
) -> PhraseResult<Json<JobStatus>> {
    let id = Uuid::parse_str(&id)
        .map_err(|_| PhraseError::Validation(format!("Invalid job id: {}", id)))?;
    Ok(Json(state.pipeline.job(id).await?))
}
