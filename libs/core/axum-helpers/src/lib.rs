//! # Axum Helpers
//!
//! Shared HTTP plumbing for the service binaries.
//!
//! - **[`server`]**: router assembly with OpenAPI docs, health/readiness,
//!   graceful shutdown and cleanup
//! - **[`errors`]**: [`AppError`] and the JSON [`ErrorResponse`] body with
//!   stable [`ErrorCode`]s
//!
//! ```ignore
//! use axum_helpers::server::{create_production_app, create_router, health_router};
//! use core_config::{app_info, server::ServerConfig};
//!
//! let config = ServerConfig::default();
//! let router = create_router::<ApiDoc>(api_routes, &config)?
//!     .merge(health_router(app_info!()));
//! create_production_app(router, &config, Duration::from_secs(30), async {}).await?;
//! ```

pub mod errors;
pub mod server;

pub use server::{
    CleanupCoordinator, HealthCheckFuture, HealthResponse, create_production_app, create_router, health_router, run_health_checks, shutdown_signal,
};

pub use errors::{AppError, ErrorCode, ErrorResponse};
