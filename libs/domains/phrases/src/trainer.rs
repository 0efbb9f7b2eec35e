use async_trait::async_trait;
use observability::PhraseMetrics;
use std::ffi::OsString;
use std::path::Path;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::config::StarSpaceConfig;
use crate::error::{PhraseError, PhraseResult};
use crate::process::{program_name, run_streaming};

/// Produces the model artifact and item dump from a corpus.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Trainer: Send + Sync {
    /// Train on `corpus`; a `true` on `cancel` aborts the run.
    async fn train(&self, corpus: &Path, cancel: watch::Receiver<bool>) -> PhraseResult<()>;
}

/// Runs `starspace train` with the deployment's fixed hyperparameters.
#[derive(Debug, Clone)]
pub struct StarSpaceTrainer {
    config: StarSpaceConfig,
}

impl StarSpaceTrainer {
    pub fn new(config: StarSpaceConfig) -> Self {
        Self { config }
    }

    /// `train -trainFile <corpus> -model <model> -label '' -trainMode <m> -epoch <e> -dim <n>`
    pub fn args(&self, corpus: &Path) -> Vec<OsString> {
        vec![
            "train".into(),
            "-trainFile".into(),
            corpus.into(),
            "-model".into(),
            self.config.model_path.as_os_str().to_owned(),
            "-label".into(),
            "''".into(),
            "-trainMode".into(),
            self.config.train_mode.to_string().into(),
            "-epoch".into(),
            self.config.epochs.to_string().into(),
            "-dim".into(),
            self.config.dim.to_string().into(),
        ]
    }
}

#[async_trait]
impl Trainer for StarSpaceTrainer {
    #[instrument(skip(self, cancel), fields(corpus = %corpus.display()))]
    async fn train(&self, corpus: &Path, cancel: watch::Receiver<bool>) -> PhraseResult<()> {
        let started = Instant::now();
        info!(model = %self.config.model_path.display(), "Training started");

        let result = run_streaming(
            &self.config.train_bin,
            &self.args(corpus),
            self.config.train_timeout,
            cancel,
        )
        .await
        .and_then(|exit| {
            if exit.status.success() {
                Ok(())
            } else {
                Err(PhraseError::SubprocessExit {
                    program: program_name(&self.config.train_bin),
                    status: exit.status.to_string(),
                    output: exit.stderr_tail,
                })
            }
        });

        match &result {
            Ok(()) => {
                PhraseMetrics::record_training("ok", started.elapsed());
                info!(
                    duration_secs = started.elapsed().as_secs(),
                    "Training finished"
                );
            }
            Err(e) => PhraseMetrics::record_training(e.code().as_str(), started.elapsed()),
        }

        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use test_utils::FakeStarSpace;

    fn trainer(fake: &FakeStarSpace, timeout: Duration) -> StarSpaceTrainer {
        StarSpaceTrainer::new(
            StarSpaceConfig::new(fake.trainer_path(), fake.embedder_path(), fake.data_dir())
                .with_dim(fake.dim())
                .with_train_timeout(timeout),
        )
    }

    fn corpus(fake: &FakeStarSpace, content: &str) -> std::path::PathBuf {
        let path = fake.path().join("corpus.txt");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_args_follow_trainer_contract() {
        let config = StarSpaceConfig::new("/opt/starspace/starspace", "/opt/starspace/embed_doc", "/data");
        let args: Vec<String> = StarSpaceTrainer::new(config)
            .args(Path::new("/tmp/corpus-1.txt"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            vec![
                "train",
                "-trainFile",
                "/tmp/corpus-1.txt",
                "-model",
                "/data/model",
                "-label",
                "''",
                "-trainMode",
                "5",
                "-epoch",
                "25",
                "-dim",
                "50"
            ]
        );
    }

    #[tokio::test]
    async fn test_train_writes_artifacts() {
        let fake = FakeStarSpace::new(2).with_item("lamp", &[1.0, 0.0]);
        let corpus = corpus(&fake, "lamp desk chair\n");
        let (_tx, rx) = watch::channel(false);

        trainer(&fake, Duration::from_secs(10))
            .train(&corpus, rx)
            .await
            .unwrap();

        assert!(fake.model_path().is_file());
        assert!(fake.tsv_path().is_file());
        assert!(fake.train_args().contains(&"-trainFile".to_string()));
    }

    #[tokio::test]
    async fn test_train_failure_is_subprocess_exit() {
        let fake = FakeStarSpace::new(2);
        let corpus = corpus(&fake, "FAIL_TRAIN\n");
        let (_tx, rx) = watch::channel(false);

        let err = trainer(&fake, Duration::from_secs(10))
            .train(&corpus, rx)
            .await
            .unwrap_err();

        match err {
            PhraseError::SubprocessExit { program, output, .. } => {
                assert_eq!(program, "starspace");
                assert_eq!(output, "fatal: corpus rejected");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!fake.model_path().exists());
    }

    #[tokio::test]
    async fn test_train_timeout() {
        let fake = FakeStarSpace::new(2);
        let corpus = corpus(&fake, "SLOW_TRAIN\n");
        let (_tx, rx) = watch::channel(false);

        let err = trainer(&fake, Duration::from_millis(300))
            .train(&corpus, rx)
            .await
            .unwrap_err();

        assert!(matches!(err, PhraseError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let fake = FakeStarSpace::new(2);
        let corpus = corpus(&fake, "lamp\n");
        let config = StarSpaceConfig::new("/nonexistent/starspace", fake.embedder_path(), fake.data_dir());
        let (_tx, rx) = watch::channel(false);

        let err = StarSpaceTrainer::new(config)
            .train(&corpus, rx)
            .await
            .unwrap_err();

        assert!(matches!(err, PhraseError::Spawn { .. }));
    }
}
