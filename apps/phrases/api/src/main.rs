use axum::{middleware, routing::get};
use axum_helpers::server::{
    CleanupCoordinator, close_postgres, create_production_app, create_router, health_router,
};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_phrases::{
    ApiDoc, PgEmbeddingRepository, PipelineController, RecommendationService, Reindexer,
    StarSpaceEmbedder, StarSpaceTrainer, handlers,
};
use migration::Migrator;
use observability::{init_metrics, metrics_handler, metrics_middleware};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod config;
mod ready;
mod state;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output (before any fallible operations)
    install_color_eyre();

    // Load configuration from environment variables
    let config = Config::from_env()?;

    // Initialize tracing with ErrorLayer for span trace capture
    init_tracing(&config.environment);

    init_metrics().map_err(|e| eyre::eyre!("Failed to install metrics recorder: {}", e))?;

    let db = database::postgres::connect_with_retry(config.database.clone(), None)
        .await
        .map_err(|e| eyre::eyre!("PostgreSQL connection failed: {}", e))?;

    database::postgres::run_migrations::<Migrator>(&db, config.app.name)
        .await
        .map_err(|e| eyre::eyre!("Migrations failed: {}", e))?;
    database::postgres::check_extension(&db, "vector")
        .await
        .map_err(|e| eyre::eyre!("pgvector is not available: {}", e))?;

    let starspace = config.starspace.clone();
    if !starspace.model_exists() {
        info!(
            model = %starspace.model_path.display(),
            "No trained model yet, queries return 503 until the first training run"
        );
    }

    let embedder = Arc::new(StarSpaceEmbedder::new(&starspace));
    let repository = Arc::new(PgEmbeddingRepository::new(db.clone()));
    let service = RecommendationService::new(repository.clone(), embedder.clone(), starspace.dim);
    let reindexer = Arc::new(Reindexer::new(embedder, repository, &starspace));
    let pipeline = PipelineController::new(
        Arc::new(StarSpaceTrainer::new(starspace)),
        reindexer,
        config.pipeline.clone(),
    );

    let state = AppState {
        db: db.clone(),
        service: service.clone(),
    };

    let api_routes = handlers::router(service, pipeline.clone());

    // create_router adds docs/middleware and nests the API under /api
    let router = create_router::<ApiDoc>(api_routes, &config.server)?;

    // - /health: liveness check with app name/version
    // - /ready: database ping, model presence reported
    // - /metrics: Prometheus exposition
    let app = router
        .merge(health_router(config.app))
        .merge(ready::ready_router(state))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(metrics_middleware));

    info!("Starting {} with graceful shutdown (30s timeout)", config.app.name);

    create_production_app(app, &config.server, Duration::from_secs(30), async move {
        info!("Shutting down: stopping training pipeline and closing connections");

        let mut cleanup = CleanupCoordinator::new();
        cleanup.add_task("pipeline", async move { pipeline.shutdown().await });
        cleanup.add_task("postgres", async move { close_postgres(db, "main").await });
        cleanup.run().await;
    })
    .await
    .map_err(|e| eyre::eyre!("Server error: {}", e))?;

    info!("{} shutdown complete", config.app.name);
    Ok(())
}
