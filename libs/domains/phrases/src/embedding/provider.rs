use async_trait::async_trait;

use crate::error::PhraseResult;

/// Maps a phrase to a vector with the trained model.
///
/// Implementations never check the vector length; callers compare it with
/// the configured dimension.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single phrase
    async fn embed(&self, phrase: &str) -> PhraseResult<Vec<f32>>;

    /// Whether the model artifact the embedder reads is present
    fn model_ready(&self) -> bool;
}
