use core_config::{AppInfo, FromEnv, app_info, server::ServerConfig};
use database::postgres::PostgresConfig;
use domain_phrases::{PipelineConfig, StarSpaceConfig};

pub use core_config::Environment;

/// Application configuration composed from the shared config components
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub database: PostgresConfig,
    pub server: ServerConfig,
    pub environment: Environment,
    pub starspace: StarSpaceConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let database = PostgresConfig::from_env()?; // Required - will fail if not set
        let server = ServerConfig::from_env()?; // Uses defaults: HOST=0.0.0.0, PORT=8000
        let starspace = StarSpaceConfig::from_env()?;
        let pipeline = PipelineConfig::from_env()?;

        eyre::ensure!(
            starspace.dim == migration::EMBEDDING_DIM,
            "EMBEDDING_DIM={} does not match the embeddings column (vector({}))",
            starspace.dim,
            migration::EMBEDDING_DIM
        );

        Ok(Self {
            app: app_info!(),
            database,
            server,
            environment,
            starspace,
            pipeline,
        })
    }
}
