//! Database plumbing for the phrase recommendation service.
//!
//! PostgreSQL (with the `vector` extension) is the only backend. The crate
//! owns pool configuration, connection retries, migrations and health
//! probes; queries live with the repositories that issue them.
//!
//! # Features
//!
//! - `postgres` (default) - SeaORM connection and migration helpers
//! - `config` (default) - `core_config::FromEnv` for [`postgres::PostgresConfig`]
//!
//! ```ignore
//! use core_config::FromEnv;
//! use database::postgres::{self, PostgresConfig};
//!
//! let config = PostgresConfig::from_env()?;
//! let db = postgres::connect_with_retry(config, None).await?;
//! postgres::run_migrations::<migration::Migrator>(&db, "phrases_api").await?;
//! ```

pub mod common;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use common::{DatabaseError, DatabaseResult};
