//! Readiness check with real database and model checks.

use crate::state::AppState;
use axum::{
    Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_helpers::server::{HealthCheckFuture, run_health_checks};
use serde_json::json;

/// Router with `GET /ready`; merge it into the stateless app router.
pub fn ready_router(state: AppState) -> Router {
    Router::new()
        .route("/ready", get(ready_handler))
        .with_state(state)
}

/// Ready once the database answers.
///
/// Model presence and the indexed catalog size are reported but never fail
/// readiness: a fresh deployment has no model until its first training
/// upload succeeds.
pub async fn ready_handler(State(state): State<AppState>) -> Response {
    let checks: Vec<(&str, HealthCheckFuture<'_>)> = vec![(
        "database",
        Box::pin(async {
            database::postgres::check_health(&state.db)
                .await
                .map_err(|e| format!("Database ping failed: {}", e))
        }),
    )];

    let model = if state.service.model_ready() {
        "present"
    } else {
        "missing"
    };

    let (status, mut body) = match run_health_checks(checks).await {
        Ok(ready) => ready,
        Err(not_ready) => not_ready,
    };
    body.0["model"] = json!(model);
    body.0["catalog_items"] = match state.service.catalog_size().await {
        Ok(count) => json!(count),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to count indexed items");
            json!(null)
        }
    };

    (status, body).into_response()
}
