//! Deployment settings for the StarSpace tools and the training pipeline.

use core_config::{ConfigError, FromEnv, env_or_default, env_parse, env_parse_optional};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_STARSPACE_PATH: &str = "/opt/starspace";
const DEFAULT_DATA_PATH: &str = "/data";
const DEFAULT_DIM: &str = "50";
const DEFAULT_EPOCHS: &str = "25";
const DEFAULT_TRAIN_MODE: &str = "5";
const DEFAULT_TRAIN_TIMEOUT_SECS: &str = "21600";
const DEFAULT_EMBED_TIMEOUT_SECS: &str = "30";
const DEFAULT_MAX_CORPUS_BYTES: &str = "1073741824";
const DEFAULT_MAX_PENDING_JOBS: &str = "4";
const DEFAULT_JOB_HISTORY_LIMIT: &str = "100";

/// Locations and fixed hyperparameters of the StarSpace installation.
#[derive(Clone, Debug)]
pub struct StarSpaceConfig {
    pub train_bin: PathBuf,
    pub embed_bin: PathBuf,
    pub model_path: PathBuf,
    /// Item dump written by the trainer next to the model
    pub tsv_path: PathBuf,
    pub dim: usize,
    pub epochs: u32,
    pub train_mode: u32,
    pub train_timeout: Duration,
    pub embed_timeout: Duration,
}

impl StarSpaceConfig {
    /// Binaries at the given paths, artifacts under `data_dir`, default hyperparameters.
    pub fn new(
        train_bin: impl Into<PathBuf>,
        embed_bin: impl Into<PathBuf>,
        data_dir: impl AsRef<Path>,
    ) -> Self {
        let model_path = data_dir.as_ref().join("model");
        let tsv_path = tsv_path_for(&model_path);
        Self {
            train_bin: train_bin.into(),
            embed_bin: embed_bin.into(),
            model_path,
            tsv_path,
            dim: 50,
            epochs: 25,
            train_mode: 5,
            train_timeout: Duration::from_secs(21_600),
            embed_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    pub fn with_train_timeout(mut self, timeout: Duration) -> Self {
        self.train_timeout = timeout;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    /// Whether a trained model is present on disk.
    pub fn model_exists(&self) -> bool {
        self.model_path.is_file()
    }
}

fn tsv_path_for(model_path: &Path) -> PathBuf {
    let mut path = model_path.as_os_str().to_owned();
    path.push(".tsv");
    PathBuf::from(path)
}

impl FromEnv for StarSpaceConfig {
    /// - STARSPACE_PATH: install directory, defaults to /opt/starspace
    /// - STARSPACE_TRAIN_BIN / STARSPACE_EMBED_BIN: default to `starspace` / `embed_doc` in it
    /// - DATA_PATH: artifact directory, defaults to /data
    /// - MODEL_PATH / MODEL_TSV_PATH: default to `$DATA_PATH/model` and `<model>.tsv`
    /// - EMBEDDING_DIM, TRAIN_EPOCHS, TRAIN_MODE, TRAIN_TIMEOUT_SECS, EMBED_TIMEOUT_SECS
    fn from_env() -> Result<Self, ConfigError> {
        let install = PathBuf::from(env_or_default("STARSPACE_PATH", DEFAULT_STARSPACE_PATH));
        let data = PathBuf::from(env_or_default("DATA_PATH", DEFAULT_DATA_PATH));

        let train_bin = env_parse_optional::<PathBuf>("STARSPACE_TRAIN_BIN")?
            .unwrap_or_else(|| install.join("starspace"));
        let embed_bin = env_parse_optional::<PathBuf>("STARSPACE_EMBED_BIN")?
            .unwrap_or_else(|| install.join("embed_doc"));
        let model_path =
            env_parse_optional::<PathBuf>("MODEL_PATH")?.unwrap_or_else(|| data.join("model"));
        let tsv_path = env_parse_optional::<PathBuf>("MODEL_TSV_PATH")?
            .unwrap_or_else(|| tsv_path_for(&model_path));

        let dim: usize = env_parse("EMBEDDING_DIM", DEFAULT_DIM)?;
        if dim == 0 {
            return Err(ConfigError::ParseError {
                key: "EMBEDDING_DIM".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            train_bin,
            embed_bin,
            model_path,
            tsv_path,
            dim,
            epochs: env_parse("TRAIN_EPOCHS", DEFAULT_EPOCHS)?,
            train_mode: env_parse("TRAIN_MODE", DEFAULT_TRAIN_MODE)?,
            train_timeout: Duration::from_secs(env_parse(
                "TRAIN_TIMEOUT_SECS",
                DEFAULT_TRAIN_TIMEOUT_SECS,
            )?),
            embed_timeout: Duration::from_secs(env_parse(
                "EMBED_TIMEOUT_SECS",
                DEFAULT_EMBED_TIMEOUT_SECS,
            )?),
        })
    }
}

/// Corpus intake and job bookkeeping limits.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub corpus_dir: PathBuf,
    pub max_corpus_bytes: u64,
    /// Queued plus running jobs accepted before uploads get 409
    pub max_pending_jobs: usize,
    /// Finished jobs kept for `GET /api/jobs`
    pub job_history_limit: usize,
}

impl PipelineConfig {
    pub fn new(corpus_dir: impl Into<PathBuf>) -> Self {
        Self {
            corpus_dir: corpus_dir.into(),
            max_corpus_bytes: 1 << 30,
            max_pending_jobs: 4,
            job_history_limit: 100,
        }
    }

    pub fn with_max_corpus_bytes(mut self, bytes: u64) -> Self {
        self.max_corpus_bytes = bytes;
        self
    }

    pub fn with_max_pending_jobs(mut self, jobs: usize) -> Self {
        self.max_pending_jobs = jobs;
        self
    }

    pub fn with_job_history_limit(mut self, jobs: usize) -> Self {
        self.job_history_limit = jobs;
        self
    }
}

impl FromEnv for PipelineConfig {
    /// - CORPUS_DIR: defaults to the system temp directory
    /// - MAX_CORPUS_BYTES: defaults to 1 GiB
    /// - MAX_PENDING_JOBS: defaults to 4, must be at least 1
    /// - JOB_HISTORY_LIMIT: defaults to 100
    fn from_env() -> Result<Self, ConfigError> {
        let corpus_dir =
            env_parse_optional::<PathBuf>("CORPUS_DIR")?.unwrap_or_else(std::env::temp_dir);

        let max_pending_jobs: usize = env_parse("MAX_PENDING_JOBS", DEFAULT_MAX_PENDING_JOBS)?;
        if max_pending_jobs == 0 {
            return Err(ConfigError::ParseError {
                key: "MAX_PENDING_JOBS".to_string(),
                details: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            corpus_dir,
            max_corpus_bytes: env_parse("MAX_CORPUS_BYTES", DEFAULT_MAX_CORPUS_BYTES)?,
            max_pending_jobs,
            job_history_limit: env_parse("JOB_HISTORY_LIMIT", DEFAULT_JOB_HISTORY_LIMIT)?,
        })
    }
}
