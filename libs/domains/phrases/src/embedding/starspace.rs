use async_trait::async_trait;
use observability::PhraseMetrics;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::debug;

use super::Embedder;
use super::parse::parse_embedder_output;
use crate::config::StarSpaceConfig;
use crate::error::{PhraseError, PhraseResult};
use crate::process::{program_name, run_with_input};

/// Embedder backed by the StarSpace `embed_doc` tool.
///
/// Each call spawns `embed_doc <model>`, writes the phrase as one stdin line
/// and reads the vector from the last non-empty stdout line.
#[derive(Debug, Clone)]
pub struct StarSpaceEmbedder {
    bin: PathBuf,
    model_path: PathBuf,
    timeout: Duration,
}

impl StarSpaceEmbedder {
    pub fn new(config: &StarSpaceConfig) -> Self {
        Self {
            bin: config.embed_bin.clone(),
            model_path: config.model_path.clone(),
            timeout: config.embed_timeout,
        }
    }

    async fn run(&self, phrase: &str) -> PhraseResult<Vec<f32>> {
        let args = [OsString::from(&self.model_path)];
        let input = stdin_line(phrase);
        let output = run_with_input(&self.bin, &args, input.as_bytes(), self.timeout).await?;

        if !output.status.success() {
            return Err(PhraseError::SubprocessExit {
                program: program_name(&self.bin),
                status: output.status.to_string(),
                output: output.combined(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed = parse_embedder_output(&stdout)
            .ok_or_else(|| PhraseError::Embedding("embedder printed no vector".to_string()))?;

        if parsed.dropped > 0 {
            debug!(
                dropped = parsed.dropped,
                kept = parsed.values.len(),
                "Dropped unparsable tokens from embedder output"
            );
            PhraseMetrics::record_dropped_tokens(parsed.dropped);
        }

        Ok(parsed.values)
    }
}

/// The tool reads one line, so embedded line breaks become spaces.
fn stdin_line(phrase: &str) -> String {
    let mut line = phrase.replace(['\r', '\n'], " ");
    line.push('\n');
    line
}

#[async_trait]
impl Embedder for StarSpaceEmbedder {
    async fn embed(&self, phrase: &str) -> PhraseResult<Vec<f32>> {
        if !self.model_ready() {
            return Err(PhraseError::ArtifactMissing(format!(
                "model {}",
                self.model_path.display()
            )));
        }

        let started = Instant::now();
        let result = self.run(phrase).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code().as_str(),
        };
        PhraseMetrics::record_embed(outcome, started.elapsed());

        result
    }

    fn model_ready(&self) -> bool {
        self.model_path.is_file()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use test_utils::FakeStarSpace;

    fn embedder_with_timeout(fake: &FakeStarSpace, timeout: Duration) -> StarSpaceEmbedder {
        StarSpaceEmbedder::new(
            &StarSpaceConfig::new(fake.trainer_path(), fake.embedder_path(), fake.data_dir())
                .with_embed_timeout(timeout),
        )
    }

    fn embedder(fake: &FakeStarSpace) -> StarSpaceEmbedder {
        embedder_with_timeout(fake, Duration::from_secs(10))
    }

    #[test]
    fn test_stdin_line_collapses_newlines() {
        assert_eq!(stdin_line("red\nshoes\r\n"), "red shoes  \n");
        assert_eq!(stdin_line("lamp"), "lamp\n");
    }

    #[tokio::test]
    async fn test_embed_reads_last_line() {
        let fake = FakeStarSpace::new(3).with_phrase("desk lamp", &[0.25, -1.0, 0.5]);
        fake.install_model();

        let vector = embedder(&fake).embed("desk lamp").await.unwrap();

        assert_eq!(vector, vec![0.25, -1.0, 0.5]);
    }

    #[tokio::test]
    async fn test_trailing_stderr_does_not_replace_vector() {
        let fake = FakeStarSpace::new(2).with_phrase("STDERR_AFTER lamp", &[0.75, -0.5]);
        fake.install_model();

        let vector = embedder(&fake).embed("STDERR_AFTER lamp").await.unwrap();

        assert_eq!(vector, vec![0.75, -0.5]);
    }

    #[tokio::test]
    async fn test_embed_drops_garbage_tokens() {
        let fake = FakeStarSpace::new(2).with_raw_output("noisy", "0.5,notanumber,1.25");
        fake.install_model();

        let vector = embedder(&fake).embed("noisy").await.unwrap();

        assert_eq!(vector, vec![0.5, 1.25]);
    }

    #[tokio::test]
    async fn test_embed_without_model_is_artifact_missing() {
        let fake = FakeStarSpace::new(3);
        let embedder = embedder(&fake);

        assert!(!embedder.model_ready());
        let err = embedder.embed("lamp").await.unwrap_err();
        assert!(matches!(err, PhraseError::ArtifactMissing(_)));
        assert!(fake.received_phrases().is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_keeps_diagnostics() {
        let fake = FakeStarSpace::new(3);
        fake.install_model();

        let err = embedder(&fake).embed("FAIL_EMBED please").await.unwrap_err();

        match err {
            PhraseError::SubprocessExit { status, output, .. } => {
                assert!(status.contains('3'));
                assert!(output.contains("Start to load a trained starspace model."));
                assert!(output.contains("embed failure for input"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_embed_timeout() {
        let fake = FakeStarSpace::new(3);
        fake.install_model();

        let err = embedder_with_timeout(&fake, Duration::from_millis(300))
            .embed("SLOW_EMBED")
            .await
            .unwrap_err();

        assert!(matches!(err, PhraseError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_shell_metacharacters_reach_embedder_verbatim() {
        let fake = FakeStarSpace::new(3);
        fake.install_model();
        let phrase = r#"lamp"; rm -rf / $(whoami) `id` | cat && echo '\n'"#;

        embedder(&fake).embed(phrase).await.unwrap();

        assert_eq!(fake.received_phrases(), vec![phrase.to_string()]);
    }

    #[tokio::test]
    async fn test_multiline_phrase_sent_as_one_line() {
        let fake = FakeStarSpace::new(3);
        fake.install_model();

        embedder(&fake).embed("blue\nsofa").await.unwrap();

        assert_eq!(fake.received_phrases(), vec!["blue sofa".to_string()]);
    }
}
